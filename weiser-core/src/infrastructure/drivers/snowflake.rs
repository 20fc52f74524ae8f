// weiser-core/src/infrastructure/drivers/snowflake.rs

// Snowflake SQL API v2 (`/api/v2/statements`). Token acquisition stays
// outside the core: this driver consumes a ready OAuth token from the
// datasource record (`access_token`, falling back to `password`).

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

pub struct SnowflakeDriver {
    name: String,
    http: reqwest::Client,
    base_url: String,
    token: String,
    warehouse: Option<String>,
    role: Option<String>,
    database: Option<String>,
    schema: Option<String>,
    limit: Arc<Semaphore>,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    #[serde(default)]
    statement_handle: Option<String>,
    #[serde(default)]
    result_set_meta_data: Option<ResultSetMetaData>,
    #[serde(default)]
    data: Option<Vec<Vec<serde_json::Value>>>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSetMetaData {
    #[serde(default)]
    row_type: Vec<ColumnType>,
}

#[derive(Debug, Deserialize)]
struct ColumnType {
    #[serde(rename = "type")]
    type_tag: String,
    #[serde(default)]
    scale: Option<i64>,
}

impl SnowflakeDriver {
    pub fn new(source: &Datasource) -> Result<Self, InfrastructureError> {
        let account = source.account.clone().ok_or_else(|| {
            InfrastructureError::Config(format!(
                "datasource '{}' needs an `account` for Snowflake",
                source.name
            ))
        })?;
        let token = source
            .access_token
            .clone()
            .or_else(|| source.password.clone())
            .ok_or_else(|| InfrastructureError::Connection {
                target: source.name.clone(),
                reason: "no access token configured; token acquisition is external".into(),
            })?;

        Ok(Self {
            name: source.name.clone(),
            http: reqwest::Client::new(),
            base_url: format!("https://{account}.snowflakecomputing.com"),
            token,
            warehouse: source.warehouse.clone(),
            role: source.role.clone(),
            database: source.db_name.clone(),
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
            "timeout": self.timeout.as_secs(),
        });
        if let Some(warehouse) = &self.warehouse {
            body["warehouse"] = json!(warehouse);
        }
        if let Some(role) = &self.role {
            body["role"] = json!(role);
        }
        if let Some(database) = &self.database {
            body["database"] = json!(database);
        }
        if let Some(schema) = &self.schema {
            body["schema"] = json!(schema);
        }

        let response = self
            .http
            .post(format!("{}/api/v2/statements", self.base_url))
            .bearer_auth(&self.token)
            .header("X-Snowflake-Authorization-Token-Type", "OAUTH")
            .header("Accept", "application/json")
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
        let parsed: StatementResponse = response
            .json()
            .await
            .map_err(|e| self.query_error(sql, format!("unreadable response: {e}")))?;

        if status.as_u16() == 202 {
            // Asynchronous execution: poll the statement handle.
            let handle = parsed.statement_handle.clone().ok_or_else(|| {
                self.query_error(sql, "202 response without a statement handle".into())
            })?;
            return self.poll(sql, &handle).await;
        }
        if !status.is_success() {
            let reason = parsed.message.unwrap_or_else(|| format!("HTTP {status}"));
            return Err(self.query_error(sql, reason));
        }
        Ok(parsed)
    }

    async fn poll(&self, sql: &str, handle: &str) -> Result<StatementResponse, WeiserError> {
        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            tokio::time::sleep(Duration::from_millis(500)).await;
            if tokio::time::Instant::now() > deadline {
                return Err(self.query_error(sql, "statement polling timed out".into()));
            }
            debug!(source = %self.name, handle, "Polling Snowflake statement");
            let response = self
                .http
                .get(format!("{}/api/v2/statements/{handle}", self.base_url))
                .bearer_auth(&self.token)
                .header("X-Snowflake-Authorization-Token-Type", "OAUTH")
                .send()
                .await
                .map_err(|e| self.query_error(sql, e.to_string()))?;

            let status = response.status();
            if status.as_u16() == 202 {
                continue;
            }
            let parsed: StatementResponse = response
                .json()
                .await
                .map_err(|e| self.query_error(sql, format!("unreadable response: {e}")))?;
            if !status.is_success() {
                let reason = parsed.message.unwrap_or_else(|| format!("HTTP {status}"));
                return Err(self.query_error(sql, reason));
            }
            return Ok(parsed);
        }
    }
}

// All Snowflake SQL API values arrive as JSON strings (or null); the
// column type tag drives the conversion.
fn normalize_cell(column: &ColumnType, cell: &serde_json::Value) -> Scalar {
    let raw = match cell {
        serde_json::Value::Null => return Scalar::Null,
        serde_json::Value::String(s) => s.as_str(),
        other => return Scalar::Text(other.to_string()),
    };
    match column.type_tag.as_str() {
        "fixed" => {
            if column.scale.unwrap_or(0) == 0 {
                raw.parse::<i64>()
                    .map(Scalar::Int)
                    .or_else(|_| raw.parse::<f64>().map(Scalar::Float))
                    .unwrap_or_else(|_| Scalar::Text(raw.to_string()))
            } else {
                raw.parse::<f64>()
                    .map(Scalar::Float)
                    .unwrap_or_else(|_| Scalar::Text(raw.to_string()))
            }
        }
        "real" => raw
            .parse::<f64>()
            .map(Scalar::Float)
            .unwrap_or_else(|_| Scalar::Text(raw.to_string())),
        "boolean" => Scalar::Bool(raw == "true"),
        "timestamp_ltz" | "timestamp_ntz" | "timestamp_tz" | "date" => raw
            .parse::<f64>()
            .ok()
            .and_then(|epoch| {
                let secs = epoch.trunc() as i64;
                let nanos = (epoch.fract() * 1e9) as u32;
                chrono::DateTime::from_timestamp(secs, nanos)
            })
            .map(|ts| Scalar::Timestamp(ts.naive_utc()))
            .unwrap_or_else(|| Scalar::Text(raw.to_string())),
        _ => Scalar::Text(raw.to_string()),
    }
}

#[async_trait]
impl SourceDriver for SnowflakeDriver {
    async fn execute(&self, sql: &str) -> Result<Vec<Row>, WeiserError> {
        let _permit = self
            .limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| WeiserError::InternalError("connection pool closed".into()))?;

        let response = self.submit(sql).await?;
        let columns = response
            .result_set_meta_data
            .map(|m| m.row_type)
            .unwrap_or_default();
        let data = response.data.unwrap_or_default();

        let rows = data
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(idx, cell)| match columns.get(idx) {
                        Some(column) => normalize_cell(column, cell),
                        None => Scalar::Null,
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
        SqlDialect::Snowflake
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

    fn column(type_tag: &str, scale: Option<i64>) -> ColumnType {
        ColumnType {
            type_tag: type_tag.into(),
            scale,
        }
    }

    #[test]
    fn test_normalize_fixed_and_real() {
        assert_eq!(
            normalize_cell(&column("fixed", Some(0)), &serde_json::json!("4")),
            Scalar::Int(4)
        );
        assert_eq!(
            normalize_cell(&column("fixed", Some(2)), &serde_json::json!("1006.00")),
            Scalar::Float(1006.0)
        );
        assert_eq!(
            normalize_cell(&column("real", None), &serde_json::json!("2.5")),
            Scalar::Float(2.5)
        );
    }

    #[test]
    fn test_normalize_boolean_and_null() {
        assert_eq!(
            normalize_cell(&column("boolean", None), &serde_json::json!("true")),
            Scalar::Bool(true)
        );
        assert_eq!(
            normalize_cell(&column("fixed", Some(0)), &serde_json::Value::Null),
            Scalar::Null
        );
    }
}
