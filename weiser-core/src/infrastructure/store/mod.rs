// weiser-core/src/infrastructure/store/mod.rs

pub mod duckdb;
pub mod migrations;
pub mod postgres;

use std::sync::Arc;

use crate::error::WeiserError;
use crate::infrastructure::config::{ConnectionConfig, MetricStoreBackend};
use crate::ports::MetricStore;

/// Factory dispatch on the declared `db_type` tag.
pub async fn create_store(config: &ConnectionConfig) -> Result<Arc<dyn MetricStore>, WeiserError> {
    match config.db_type {
        MetricStoreBackend::Duckdb => Ok(Arc::new(duckdb::DuckDbMetricStore::new(config)?)),
        MetricStoreBackend::Postgresql => {
            Ok(Arc::new(postgres::PostgresMetricStore::connect(config).await?))
        }
    }
}
