// weiser-core/src/infrastructure/drivers/databricks.rs

// Databricks SQL Statement Execution API (`/api/2.0/sql/statements`).
// The warehouse id is taken from the tail of the configured `http_path`
// (e.g. `/sql/1.0/warehouses/abc123`).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::domain::sql::SqlDialect;
use crate::error::WeiserError;
use crate::infrastructure::config::Datasource;
use crate::infrastructure::error::InfrastructureError;
use crate::ports::{Row, Scalar, SourceDriver};

pub struct DatabricksDriver {
    name: String,
    http: reqwest::Client,
    base_url: String,
    token: String,
    warehouse_id: String,
    catalog: Option<String>,
    schema: Option<String>,
    limit: Arc<Semaphore>,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct StatementResponse {
    #[serde(default)]
    statement_id: Option<String>,
    #[serde(default)]
    status: Option<StatementStatus>,
    #[serde(default)]
    manifest: Option<Manifest>,
    #[serde(default)]
    result: Option<ResultData>,
}

#[derive(Debug, Deserialize)]
struct StatementStatus {
    #[serde(default)]
    state: String,
    #[serde(default)]
    error: Option<StatementError>,
}

#[derive(Debug, Deserialize)]
struct StatementError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    schema: Option<ManifestSchema>,
}

#[derive(Debug, Deserialize)]
struct ManifestSchema {
    #[serde(default)]
    columns: Vec<ManifestColumn>,
}

#[derive(Debug, Deserialize)]
struct ManifestColumn {
    #[serde(default)]
    type_name: String,
}

#[derive(Debug, Deserialize)]
struct ResultData {
    #[serde(default)]
    data_array: Vec<Vec<serde_json::Value>>,
}

impl DatabricksDriver {
    pub fn new(source: &Datasource) -> Result<Self, InfrastructureError> {
        let host = source.host.clone().ok_or_else(|| {
            InfrastructureError::Config(format!(
                "datasource '{}' needs a `host` for Databricks",
                source.name
            ))
        })?;
        let http_path = source.http_path.clone().ok_or_else(|| {
            InfrastructureError::Config(format!(
                "datasource '{}' needs an `http_path` for Databricks",
                source.name
            ))
        })?;
        let warehouse_id = http_path
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or_default()
            .to_string();
        let token = source.access_token.clone().ok_or_else(|| {
            InfrastructureError::Connection {
                target: source.name.clone(),
                reason: "no access token configured; token acquisition is external".into(),
            }
        })?;

        Ok(Self {
            name: source.name.clone(),
            http: reqwest::Client::new(),
            base_url: format!("https://{}", host.trim_end_matches('/')),
            token,
            warehouse_id,
            catalog: source.catalog.clone(),
            schema: source.schema_name.clone(),
            limit: Arc::new(Semaphore::new(source.pool_size())),
            timeout: source.query_timeout(),
        })
    }

    fn query_error(&self, sql: &str, reason: String) -> WeiserError {
        WeiserError::Infrastructure(InfrastructureError::Query {
            target: self.name.clone(),
            reason,
            sql: sql.to_string(),
        })
    }

    async fn submit(&self, sql: &str) -> Result<StatementResponse, WeiserError> {
        let mut body = json!({
            "statement": sql,
            "warehouse_id": self.warehouse_id,
            "wait_timeout": "30s",
            "on_wait_timeout": "CONTINUE",
            "disposition": "INLINE",
            "format": "JSON_ARRAY",
        });
        if let Some(catalog) = &self.catalog {
            body["catalog"] = json!(catalog);
        }
        if let Some(schema) = &self.schema {
            body["schema"] = json!(schema);
        }

        let response = self
            .http
            .post(format!("{}/api/2.0/sql/statements", self.base_url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                WeiserError::Infrastructure(InfrastructureError::Connection {
                    target: self.name.clone(),
                    reason: e.to_string(),
                })
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(self.query_error(sql, format!("HTTP {status}: {text}")));
        }
        let mut parsed: StatementResponse = response
            .json()
            .await
            .map_err(|e| self.query_error(sql, format!("unreadable response: {e}")))?;

        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            let state = parsed
                .status
                .as_ref()
                .map(|s| s.state.clone())
                .unwrap_or_default();
            match state.as_str() {
                "SUCCEEDED" => return Ok(parsed),
                "PENDING" | "RUNNING" => {
                    if tokio::time::Instant::now() > deadline {
                        return Err(self.query_error(sql, "statement polling timed out".into()));
                    }
                    let id = parsed.statement_id.clone().ok_or_else(|| {
                        self.query_error(sql, "pending statement without an id".into())
                    })?;
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    debug!(source = %self.name, id, "Polling Databricks statement");
                    let response = self
                        .http
                        .get(format!("{}/api/2.0/sql/statements/{id}", self.base_url))
                        .bearer_auth(&self.token)
                        .send()
                        .await
                        .map_err(|e| self.query_error(sql, e.to_string()))?;
                    parsed = response
                        .json()
                        .await
                        .map_err(|e| self.query_error(sql, format!("unreadable response: {e}")))?;
                }
                _ => {
                    let reason = parsed
                        .status
                        .and_then(|s| s.error)
                        .map(|e| e.message)
                        .unwrap_or_else(|| format!("statement state '{state}'"));
                    return Err(self.query_error(sql, reason));
                }
            }
        }
    }
}

fn normalize_cell(type_name: &str, cell: &serde_json::Value) -> Scalar {
    let raw = match cell {
        serde_json::Value::Null => return Scalar::Null,
        serde_json::Value::String(s) => s.as_str(),
        other => return Scalar::Text(other.to_string()),
    };
    match type_name {
        "BYTE" | "SHORT" | "INT" | "LONG" => raw
            .parse::<i64>()
            .map(Scalar::Int)
            .unwrap_or_else(|_| Scalar::Text(raw.to_string())),
        "FLOAT" | "DOUBLE" | "DECIMAL" => raw
            .parse::<f64>()
            .map(Scalar::Float)
            .unwrap_or_else(|_| Scalar::Text(raw.to_string())),
        "BOOLEAN" => Scalar::Bool(raw == "true"),
        "TIMESTAMP" | "DATE" => raw
            .parse::<chrono::NaiveDateTime>()
            .ok()
            .or_else(|| {
                raw.parse::<chrono::NaiveDate>()
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
            .map(Scalar::Timestamp)
            .unwrap_or_else(|| Scalar::Text(raw.to_string())),
        _ => Scalar::Text(raw.to_string()),
    }
}

#[async_trait]
impl SourceDriver for DatabricksDriver {
    async fn execute(&self, sql: &str) -> Result<Vec<Row>, WeiserError> {
        let _permit = self
            .limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| WeiserError::InternalError("connection pool closed".into()))?;

        let response = self.submit(sql).await?;
        let columns = response
            .manifest
            .and_then(|m| m.schema)
            .map(|s| s.columns)
            .unwrap_or_default();
        let data = response.result.map(|r| r.data_array).unwrap_or_default();

        let rows = data
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(idx, cell)| {
                        let type_name = columns
                            .get(idx)
                            .map(|c| c.type_name.as_str())
                            .unwrap_or("STRING");
                        normalize_cell(type_name, cell)
                    })
                    .collect()
            })
            .collect();
        Ok(rows)
    }

    async fn probe(&self) -> Result<(), WeiserError> {
        self.execute("SELECT 1").await.map(|_| ())
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::Databricks
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
    fn test_normalize_cells() {
        assert_eq!(normalize_cell("LONG", &serde_json::json!("4")), Scalar::Int(4));
        assert_eq!(
            normalize_cell("DOUBLE", &serde_json::json!("1006.5")),
            Scalar::Float(1006.5)
        );
        assert_eq!(
            normalize_cell("BOOLEAN", &serde_json::json!("false")),
            Scalar::Bool(false)
        );
        assert_eq!(
            normalize_cell("STRING", &serde_json::Value::Null),
            Scalar::Null
        );
    }
}
