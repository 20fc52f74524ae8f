// weiser-core/src/infrastructure/store/postgres.rs

// Relational metric store. Schema is managed by refinery from the
// versioned scripts in `migrations/postgres/`; refinery keeps its own
// server-side version table.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls};
use tracing::{info, warn};

use crate::domain::record::MetricRecord;
use crate::error::WeiserError;
use crate::infrastructure::config::ConnectionConfig;
use crate::infrastructure::error::{DatabaseError, InfrastructureError};
use crate::ports::{HistoryPoint, MetricStore, StoreSummary};

mod embedded {
    refinery::embed_migrations!("migrations/postgres");
}

pub struct PostgresMetricStore {
    client: Mutex<Client>,
}

impl PostgresMetricStore {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, WeiserError> {
        let conn_str = match &config.uri {
            Some(uri) => uri.clone(),
            None => {
                let host = config.host.clone().ok_or_else(|| {
                    InfrastructureError::Config(
                        "metricstore connection needs a `uri` or a `host`".into(),
                    )
                })?;
                let mut parts = vec![format!("host={host}")];
                if let Some(port) = config.port {
                    parts.push(format!("port={port}"));
                }
                if let Some(user) = &config.user {
                    parts.push(format!("user={user}"));
                }
                if let Some(password) = &config.password {
                    parts.push(format!("password={password}"));
                }
                if let Some(db) = &config.db_name {
                    parts.push(format!("dbname={db}"));
                }
                parts.join(" ")
            }
        };

        let (client, connection) =
            tokio_postgres::connect(&conn_str, NoTls)
                .await
                .map_err(|e| InfrastructureError::Connection {
                    target: "metricstore".into(),
                    reason: e.to_string(),
                })?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "Metric-store connection task ended");
            }
        });

        Ok(Self {
            client: Mutex::new(client),
        })
    }
}

#[async_trait]
impl MetricStore for PostgresMetricStore {
    async fn initialize(&self) -> Result<(), WeiserError> {
        let mut client = self.client.lock().await;
        let report = embedded::migrations::runner()
            .run_async(&mut *client)
            .await
            .map_err(|e| {
                InfrastructureError::Database(DatabaseError::Migration(e.to_string()))
            })?;
        let applied = report.applied_migrations().len();
        if applied > 0 {
            info!(applied, "Metric store schema migrated");
        }
        Ok(())
    }

    async fn write(&self, record: &MetricRecord) -> Result<(), WeiserError> {
        const INSERT: &str = "INSERT INTO metrics (actual_value, check_id, run_id, name, \
             datasource, dataset, type, condition, threshold, threshold_list, success, fail, \
             run_time, dimensions, time_bucket) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)";
        let threshold_list = if record.threshold_list.is_empty() {
            None
        } else {
            Some(record.threshold_list.clone())
        };
        let dimensions = if record.dimensions.is_empty() {
            None
        } else {
            Some(record.dimensions.clone())
        };

        let client = self.client.lock().await;
        client
            .execute(
                INSERT,
                &[
                    &record.actual_value,
                    &record.check_id,
                    &record.run_id,
                    &record.name,
                    &record.datasource,
                    &record.dataset,
                    &record.check_type.as_str(),
                    &record.condition.as_str(),
                    &record.threshold,
                    &threshold_list,
                    &record.success,
                    &record.fail,
                    &record.run_time,
                    &dimensions,
                    &record.time_bucket,
                ],
            )
            .await
            .map_err(|e| InfrastructureError::Query {
                target: "metricstore".into(),
                reason: e.to_string(),
                sql: INSERT.to_string(),
            })?;
        Ok(())
    }

    async fn history(
        &self,
        check_id: Option<&str>,
        predicate: Option<&str>,
    ) -> Result<Vec<HistoryPoint>, WeiserError> {
        if check_id.is_none() && predicate.is_none() {
            return Err(WeiserError::InternalError(
                "history requires a check_id or a predicate".into(),
            ));
        }
        let mut clauses = vec!["actual_value IS NOT NULL".to_string()];
        if check_id.is_some() {
            clauses.push("check_id = $1".to_string());
        }
        if let Some(pred) = predicate {
            clauses.push(format!("({pred})"));
        }
        let sql = format!(
            "SELECT run_time, actual_value FROM metrics WHERE {} ORDER BY run_time ASC",
            clauses.join(" AND ")
        );

        let client = self.client.lock().await;
        let result = match check_id {
            Some(id) => client.query(&sql, &[&id]).await,
            None => client.query(&sql, &[]).await,
        };
        let rows = result.map_err(|e| InfrastructureError::Query {
            target: "metricstore".into(),
            reason: e.to_string(),
            sql: sql.clone(),
        })?;

        let mut points = Vec::with_capacity(rows.len());
        for row in rows {
            let run_time: chrono::NaiveDateTime = row.try_get(0).map_err(|e| {
                WeiserError::InternalError(format!("metric store returned a bad run_time: {e}"))
            })?;
            let value: f64 = row.try_get(1).map_err(|e| {
                WeiserError::InternalError(format!("metric store returned a bad value: {e}"))
            })?;
            points.push(HistoryPoint { run_time, value });
        }
        Ok(points)
    }

    async fn run_summary(&self, run_id: &str) -> Result<StoreSummary, WeiserError> {
        const SQL: &str = "SELECT COUNT(*), \
             COALESCE(SUM(CASE WHEN success THEN 1 ELSE 0 END), 0), \
             COALESCE(SUM(CASE WHEN fail THEN 1 ELSE 0 END), 0) \
             FROM metrics WHERE run_id = $1";
        let client = self.client.lock().await;
        let row = client
            .query_one(SQL, &[&run_id])
            .await
            .map_err(InfrastructureError::from)?;
        let total: i64 = row.try_get(0).unwrap_or(0);
        let passed: i64 = row.try_get(1).unwrap_or(0);
        let failed: i64 = row.try_get(2).unwrap_or(0);
        Ok(StoreSummary {
            total: total.max(0) as u64,
            passed: passed.max(0) as u64,
            failed: failed.max(0) as u64,
        })
    }

    async fn flush(&self, _run_id: &str) -> Result<(), WeiserError> {
        // No mirror on the relational backend.
        Ok(())
    }
}
