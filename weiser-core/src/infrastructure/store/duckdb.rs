// weiser-core/src/infrastructure/store/duckdb.rs

// Embedded metric store: a file-backed DuckDB database, optionally
// mirrored to S3 as parquet via httpfs. Owns its schema through the
// custom migration ledger in `migrations.rs`.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use duckdb::Connection;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::domain::record::MetricRecord;
use crate::error::WeiserError;
use crate::infrastructure::config::{ConnectionConfig, S3UrlStyle};
use crate::infrastructure::drivers::duckdb::{lock_err, open_connection, query_rows};
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::store::migrations;
use crate::ports::{HistoryPoint, MetricStore, Scalar, StoreSummary};

const DEFAULT_DB_PATH: &str = "./metricstore.db";

pub struct DuckDbMetricStore {
    conn: Arc<Mutex<Connection>>,
    config: ConnectionConfig,
}

fn lit_str(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn lit_opt_f64(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "NULL".into())
}

fn lit_opt_ts(value: Option<NaiveDateTime>) -> String {
    value
        .map(|ts| format!("TIMESTAMP '{}'", ts.format("%Y-%m-%d %H:%M:%S%.6f")))
        .unwrap_or_else(|| "NULL".into())
}

fn lit_f64_list(values: &[f64]) -> String {
    if values.is_empty() {
        return "NULL".into();
    }
    let items = values
        .iter()
        .map(f64::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{items}]")
}

fn lit_str_list(values: &[String]) -> String {
    if values.is_empty() {
        return "NULL".into();
    }
    let items = values
        .iter()
        .map(|v| lit_str(v))
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{items}]")
}

impl DuckDbMetricStore {
    pub fn new(config: &ConnectionConfig) -> Result<Self, InfrastructureError> {
        let path = config.db_name.as_deref().unwrap_or(DEFAULT_DB_PATH);
        let conn = open_connection(path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config: config.clone(),
        })
    }

    /// Operator-invoked downgrade; never called automatically.
    pub fn migrate_down(&self, target_version: &str) -> Result<usize, WeiserError> {
        let conn = self.conn.lock().map_err(|_| lock_err())?;
        Ok(migrations::migrate_down(&conn, target_version)?)
    }

    fn configure_s3(&self, conn: &Connection) {
        let setup = || -> Result<(), InfrastructureError> {
            conn.execute_batch("INSTALL httpfs; LOAD httpfs;")?;
            match self.config.s3_url_style {
                Some(S3UrlStyle::Path) => {
                    conn.execute_batch("SET s3_url_style = 'path';")?;
                }
                _ => {
                    if let Some(region) = &self.config.s3_region {
                        conn.execute_batch(&format!("SET s3_region = {};", lit_str(region)))?;
                    }
                }
            }
            if let Some(endpoint) = &self.config.s3_endpoint {
                conn.execute_batch(&format!("SET s3_endpoint = {};", lit_str(endpoint)))?;
            }
            if let (Some(key), Some(secret)) = (
                &self.config.s3_access_key,
                &self.config.s3_secret_access_key,
            ) {
                conn.execute_batch(&format!("SET s3_access_key_id = {};", lit_str(key)))?;
                conn.execute_batch(&format!(
                    "SET s3_secret_access_key = {};",
                    lit_str(secret)
                ))?;
            }
            Ok(())
        };
        if let Err(e) = setup() {
            warn!(error = %e, "S3 configuration failed; mirror disabled for this run");
        }
    }

    fn import_s3(&self, conn: &Connection) {
        let Some(bucket) = &self.config.s3_bucket else {
            return;
        };
        // Only rows newer than what is already local; first run imports all.
        let newer_than = query_rows(conn, "SELECT MAX(run_time) FROM metrics")
            .ok()
            .and_then(|rows| rows.first().and_then(|r| r.first().and_then(Scalar::as_timestamp)));
        let predicate = newer_than
            .map(|ts| format!("run_time > TIMESTAMP '{}'", ts.format("%Y-%m-%d %H:%M:%S%.6f")))
            .unwrap_or_else(|| "1=1".into());
        let import = format!(
            "INSERT INTO metrics SELECT * FROM 's3://{bucket}/metrics/*.parquet' WHERE {predicate}"
        );
        if let Err(e) = conn.execute_batch(&import) {
            // Expected on a fresh bucket with no parquet files yet.
            warn!(error = %e, "S3 import skipped");
        } else {
            info!("Imported mirrored metrics from S3");
        }
    }
}

#[async_trait]
impl MetricStore for DuckDbMetricStore {
    async fn initialize(&self) -> Result<(), WeiserError> {
        let conn = self.conn.lock().map_err(|_| lock_err())?;
        if self.config.has_s3_mirror() {
            self.configure_s3(&conn);
        }
        let applied = migrations::apply_pending(&conn)?;
        if applied > 0 {
            info!(applied, "Metric store schema migrated");
        }
        if self.config.has_s3_mirror() {
            self.import_s3(&conn);
        }
        Ok(())
    }

    async fn write(&self, record: &MetricRecord) -> Result<(), WeiserError> {
        let sql = format!(
            "INSERT INTO metrics (actual_value, check_id, run_id, name, datasource, dataset, \
             type, condition, threshold, threshold_list, success, fail, run_time, dimensions, \
             time_bucket) VALUES ({}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {})",
            lit_opt_f64(record.actual_value),
            lit_str(&record.check_id),
            lit_str(&record.run_id),
            lit_str(&record.name),
            lit_str(&record.datasource),
            lit_str(&record.dataset),
            lit_str(record.check_type.as_str()),
            lit_str(record.condition.as_str()),
            lit_opt_f64(record.threshold),
            lit_f64_list(&record.threshold_list),
            record.success,
            record.fail,
            lit_opt_ts(Some(record.run_time)),
            lit_str_list(&record.dimensions),
            lit_opt_ts(record.time_bucket),
        );
        let conn = self.conn.lock().map_err(|_| lock_err())?;
        conn.execute_batch(&sql)
            .map_err(|e| InfrastructureError::Query {
                target: "metricstore".into(),
                reason: e.to_string(),
                sql,
            })?;
        Ok(())
    }

    async fn history(
        &self,
        check_id: Option<&str>,
        predicate: Option<&str>,
    ) -> Result<Vec<HistoryPoint>, WeiserError> {
        let mut clauses = vec!["actual_value IS NOT NULL".to_string()];
        if let Some(id) = check_id {
            clauses.push(format!("check_id = {}", lit_str(id)));
        }
        if let Some(pred) = predicate {
            clauses.push(format!("({pred})"));
        }
        if check_id.is_none() && predicate.is_none() {
            return Err(WeiserError::InternalError(
                "history requires a check_id or a predicate".into(),
            ));
        }
        let sql = format!(
            "SELECT run_time, actual_value FROM metrics WHERE {} ORDER BY run_time ASC",
            clauses.join(" AND ")
        );

        let conn = self.conn.lock().map_err(|_| lock_err())?;
        let rows = query_rows(&conn, &sql).map_err(|e| InfrastructureError::Query {
            target: "metricstore".into(),
            reason: e.to_string(),
            sql: sql.clone(),
        })?;

        let mut points = Vec::with_capacity(rows.len());
        for row in rows {
            let run_time = row.first().and_then(Scalar::as_timestamp);
            let value = row.get(1).and_then(Scalar::as_f64);
            if let (Some(run_time), Some(value)) = (run_time, value) {
                points.push(HistoryPoint { run_time, value });
            }
        }
        Ok(points)
    }

    async fn run_summary(&self, run_id: &str) -> Result<StoreSummary, WeiserError> {
        let sql = format!(
            "SELECT COUNT(*), SUM(CASE WHEN success THEN 1 ELSE 0 END), \
             SUM(CASE WHEN fail THEN 1 ELSE 0 END) FROM metrics WHERE run_id = {}",
            lit_str(run_id)
        );
        let conn = self.conn.lock().map_err(|_| lock_err())?;
        let rows = query_rows(&conn, &sql)?;
        let row = rows.first();
        let get = |idx: usize| {
            row.and_then(|r| r.get(idx))
                .and_then(Scalar::as_f64)
                .unwrap_or(0.0) as u64
        };
        Ok(StoreSummary {
            total: get(0),
            passed: get(1),
            failed: get(2),
        })
    }

    async fn flush(&self, run_id: &str) -> Result<(), WeiserError> {
        let Some(bucket) = &self.config.s3_bucket else {
            return Ok(());
        };
        if !self.config.has_s3_mirror() {
            return Ok(());
        }
        let sql = format!(
            "COPY (SELECT * FROM metrics WHERE run_id = {}) TO 's3://{bucket}/metrics/{run_id}.parquet' (FORMAT 'parquet')",
            lit_str(run_id)
        );
        let conn = self.conn.lock().map_err(|_| lock_err())?;
        if let Err(e) = conn.execute_batch(&sql) {
            warn!(error = %e, "S3 export failed; metrics remain local");
        } else {
            info!(bucket, run_id, "Mirrored run results to S3");
        }
        Ok(())
    }
}
