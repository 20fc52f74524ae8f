// weiser-core/src/infrastructure/drivers/duckdb.rs

// Embedded analytic engine path. Used primarily by the metric store, and
// as a regular source for local files and the test suite.

use async_trait::async_trait;
use chrono::DateTime;
use duckdb::types::ValueRef;
use duckdb::{Config, Connection};
use rust_decimal::prelude::ToPrimitive;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::domain::sql::SqlDialect;
use crate::error::WeiserError;
use crate::infrastructure::config::Datasource;
use crate::infrastructure::error::InfrastructureError;
use crate::ports::{Row, Scalar, SourceDriver};

pub struct DuckDbDriver {
    name: String,
    conn: Arc<Mutex<Connection>>,
    timeout: Duration,
}

impl DuckDbDriver {
    pub fn new(source: &Datasource) -> Result<Self, InfrastructureError> {
        let path = source.db_name.as_deref().unwrap_or(":memory:");
        let conn = open_connection(path)?;
        Ok(Self {
            name: source.name.clone(),
            conn: Arc::new(Mutex::new(conn)),
            timeout: source.query_timeout(),
        })
    }
}

pub(crate) fn open_connection(path: &str) -> Result<Connection, InfrastructureError> {
    let config = Config::default();
    let conn = if path == ":memory:" {
        Connection::open_in_memory_with_flags(config)?
    } else {
        Connection::open_with_flags(path, config)?
    };
    Ok(conn)
}

pub(crate) fn lock_err() -> InfrastructureError {
    InfrastructureError::Io(std::io::Error::other("DuckDB Mutex Poisoned"))
}

/// Normalize one DuckDB cell to the driver-common scalar set.
pub(crate) fn normalize_value(value: ValueRef<'_>) -> Scalar {
    match value {
        ValueRef::Null => Scalar::Null,
        ValueRef::Boolean(v) => Scalar::Bool(v),
        ValueRef::TinyInt(v) => Scalar::Int(v as i64),
        ValueRef::SmallInt(v) => Scalar::Int(v as i64),
        ValueRef::Int(v) => Scalar::Int(v as i64),
        ValueRef::BigInt(v) => Scalar::Int(v),
        ValueRef::HugeInt(v) => Scalar::Int(v as i64),
        ValueRef::UTinyInt(v) => Scalar::Int(v as i64),
        ValueRef::USmallInt(v) => Scalar::Int(v as i64),
        ValueRef::UInt(v) => Scalar::Int(v as i64),
        ValueRef::UBigInt(v) => Scalar::Int(v as i64),
        ValueRef::Float(v) => Scalar::Float(v as f64),
        ValueRef::Double(v) => Scalar::Float(v),
        ValueRef::Decimal(v) => rust_decimal::Decimal::try_from(v)
            .ok()
            .and_then(|d| d.to_f64())
            .map(Scalar::Float)
            .unwrap_or(Scalar::Null),
        ValueRef::Text(bytes) => Scalar::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Timestamp(unit, raw) => {
            let micros = match unit {
                duckdb::types::TimeUnit::Second => raw.saturating_mul(1_000_000),
                duckdb::types::TimeUnit::Millisecond => raw.saturating_mul(1_000),
                duckdb::types::TimeUnit::Microsecond => raw,
                duckdb::types::TimeUnit::Nanosecond => raw / 1_000,
            };
            DateTime::from_timestamp_micros(micros)
                .map(|ts| Scalar::Timestamp(ts.naive_utc()))
                .unwrap_or(Scalar::Null)
        }
        ValueRef::Date32(days) => DateTime::from_timestamp(i64::from(days) * 86_400, 0)
            .map(|ts| Scalar::Timestamp(ts.naive_utc()))
            .unwrap_or(Scalar::Null),
        // Blobs, intervals, nested types: nothing a check measurement
        // can do with them.
        _ => Scalar::Null,
    }
}

pub(crate) fn query_rows(conn: &Connection, sql: &str) -> Result<Vec<Row>, InfrastructureError> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;
    let column_count = rows.as_ref().map(|s| s.column_count()).unwrap_or(0);
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut normalized = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            normalized.push(normalize_value(row.get_ref(idx)?));
        }
        out.push(normalized);
    }
    Ok(out)
}

#[async_trait]
impl SourceDriver for DuckDbDriver {
    async fn execute(&self, sql: &str) -> Result<Vec<Row>, WeiserError> {
        let conn = self.conn.lock().map_err(|_| lock_err())?;
        query_rows(&conn, sql).map_err(|e| {
            WeiserError::Infrastructure(InfrastructureError::Query {
                target: self.name.clone(),
                reason: e.to_string(),
                sql: sql.to_string(),
            })
        })
    }

    async fn probe(&self) -> Result<(), WeiserError> {
        self.execute("SELECT 1").await.map(|_| ())
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::DuckDb
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn query_timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::infrastructure::config::DbType;

    fn memory_source() -> Datasource {
        Datasource {
            name: "default".into(),
            db_type: DbType::Duckdb,
            uri: None,
            host: None,
            port: None,
            db_name: None,
            user: None,
            password: None,
            account: None,
            warehouse: None,
            role: None,
            schema_name: None,
            http_path: None,
            access_token: None,
            catalog: None,
            project_id: None,
            dataset_id: None,
            credentials_path: None,
            location: None,
            max_connections: None,
            query_timeout_secs: None,
        }
    }

    #[tokio::test]
    async fn test_execute_normalizes_rows() -> anyhow::Result<()> {
        let driver = DuckDbDriver::new(&memory_source())?;
        driver
            .execute("CREATE TABLE t (a INTEGER, b DOUBLE, c VARCHAR, d BOOLEAN)")
            .await?;
        driver
            .execute("INSERT INTO t VALUES (1, 2.5, 'x', TRUE), (NULL, NULL, NULL, NULL)")
            .await?;
        let rows = driver.execute("SELECT * FROM t ORDER BY a").await?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], Scalar::Int(1));
        assert_eq!(rows[0][1], Scalar::Float(2.5));
        assert_eq!(rows[0][2], Scalar::Text("x".into()));
        assert_eq!(rows[0][3], Scalar::Bool(true));
        assert!(rows[1].iter().all(Scalar::is_null));
        Ok(())
    }

    #[tokio::test]
    async fn test_query_error_carries_sql() -> anyhow::Result<()> {
        let driver = DuckDbDriver::new(&memory_source())?;
        let err = driver.execute("SELECT * FROM missing_table").await;
        let message = format!("{}", err.expect_err("must fail"));
        assert!(message.contains("missing_table"));
        Ok(())
    }
}
