// weiser-core/src/infrastructure/drivers/mysql.rs

use async_trait::async_trait;
use chrono::NaiveDate;
use mysql_async::prelude::Queryable;
use mysql_async::{Opts, OptsBuilder, Pool, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::domain::sql::SqlDialect;
use crate::error::WeiserError;
use crate::infrastructure::config::Datasource;
use crate::infrastructure::error::InfrastructureError;
use crate::ports::{Row, Scalar, SourceDriver};

pub struct MySqlDriver {
    name: String,
    pool: Pool,
    limit: Arc<Semaphore>,
    timeout: Duration,
}

impl MySqlDriver {
    pub fn new(source: &Datasource) -> Result<Self, InfrastructureError> {
        let opts: Opts = match &source.uri {
            Some(uri) => Opts::from_url(uri).map_err(|e| {
                InfrastructureError::Config(format!(
                    "datasource '{}' has an invalid MySQL uri: {e}",
                    source.name
                ))
            })?,
            None => {
                let host = source.host.clone().ok_or_else(|| {
                    InfrastructureError::Config(format!(
                        "datasource '{}' needs a `uri` or a `host`",
                        source.name
                    ))
                })?;
                OptsBuilder::default()
                    .ip_or_hostname(host)
                    .tcp_port(source.port.unwrap_or(3306))
                    .user(source.user.clone())
                    .pass(source.password.clone())
                    .db_name(source.db_name.clone())
                    .into()
            }
        };

        Ok(Self {
            name: source.name.clone(),
            pool: Pool::new(opts),
            limit: Arc::new(Semaphore::new(source.pool_size())),
            timeout: source.query_timeout(),
        })
    }
}

fn normalize_value(value: &Value) -> Scalar {
    match value {
        Value::NULL => Scalar::Null,
        Value::Int(v) => Scalar::Int(*v),
        Value::UInt(v) => Scalar::Int(*v as i64),
        Value::Float(v) => Scalar::Float(*v as f64),
        Value::Double(v) => Scalar::Float(*v),
        Value::Bytes(bytes) => Scalar::Text(String::from_utf8_lossy(bytes).into_owned()),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            NaiveDate::from_ymd_opt(i32::from(*year), u32::from(*month), u32::from(*day))
                .and_then(|d| {
                    d.and_hms_micro_opt(
                        u32::from(*hour),
                        u32::from(*minute),
                        u32::from(*second),
                        *micros,
                    )
                })
                .map(Scalar::Timestamp)
                .unwrap_or(Scalar::Null)
        }
        // Durations have no place in a check measurement.
        Value::Time(..) => Scalar::Null,
    }
}

#[async_trait]
impl SourceDriver for MySqlDriver {
    async fn execute(&self, sql: &str) -> Result<Vec<Row>, WeiserError> {
        let _permit = self
            .limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| WeiserError::InternalError("connection pool closed".into()))?;

        let mut conn = self.pool.get_conn().await.map_err(|e| {
            WeiserError::Infrastructure(InfrastructureError::Connection {
                target: self.name.clone(),
                reason: e.to_string(),
            })
        })?;

        let rows: Vec<mysql_async::Row> = conn.query(sql).await.map_err(|e| {
            WeiserError::Infrastructure(InfrastructureError::Query {
                target: self.name.clone(),
                reason: e.to_string(),
                sql: sql.to_string(),
            })
        })?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut normalized = Vec::with_capacity(row.len());
            for idx in 0..row.len() {
                normalized.push(row.as_ref(idx).map(normalize_value).unwrap_or(Scalar::Null));
            }
            out.push(normalized);
        }
        Ok(out)
    }

    async fn probe(&self) -> Result<(), WeiserError> {
        self.execute("SELECT 1").await.map(|_| ())
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::MySql
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn query_timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_values() {
        assert_eq!(normalize_value(&Value::Int(4)), Scalar::Int(4));
        assert_eq!(normalize_value(&Value::Double(2.5)), Scalar::Float(2.5));
        assert_eq!(
            normalize_value(&Value::Bytes(b"abc".to_vec())),
            Scalar::Text("abc".into())
        );
        assert_eq!(normalize_value(&Value::NULL), Scalar::Null);
        match normalize_value(&Value::Date(2026, 8, 2, 10, 30, 0, 0)) {
            Scalar::Timestamp(ts) => {
                assert_eq!(ts.format("%Y-%m-%d %H:%M:%S").to_string(), "2026-08-02 10:30:00");
            }
            other => panic!("expected timestamp, got {other:?}"),
        }
    }
}
