// weiser-core/src/infrastructure/drivers/mod.rs

pub mod bigquery;
pub mod databricks;
pub mod duckdb;
pub mod mysql;
pub mod postgres;
pub mod snowflake;

use std::sync::Arc;

use crate::error::WeiserError;
use crate::infrastructure::config::{Datasource, DbType};
use crate::ports::SourceDriver;

/// Factory dispatch on the declared `type` tag.
pub struct DriverFactory;

impl DriverFactory {
    pub fn create(source: &Datasource) -> Result<Arc<dyn SourceDriver>, WeiserError> {
        match source.db_type {
            DbType::Postgresql | DbType::Cube => {
                Ok(Arc::new(postgres::PostgresDriver::new(source)?))
            }
            DbType::Mysql => Ok(Arc::new(mysql::MySqlDriver::new(source)?)),
            DbType::Snowflake => Ok(Arc::new(snowflake::SnowflakeDriver::new(source)?)),
            DbType::Databricks => Ok(Arc::new(databricks::DatabricksDriver::new(source)?)),
            DbType::Bigquery => Ok(Arc::new(bigquery::BigQueryDriver::new(source)?)),
            DbType::Duckdb => Ok(Arc::new(duckdb::DuckDbDriver::new(source)?)),
        }
    }
}
