// weiser-core/src/infrastructure/drivers/bigquery.rs

// BigQuery REST path (`jobs.query` / `jobs.getQueryResults`). The
// `credentials_path` field is carried for the out-of-core credential
// acquirer; the driver itself consumes a ready bearer token.

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

const API_BASE: &str = "https://bigquery.googleapis.com/bigquery/v2";

pub struct BigQueryDriver {
    name: String,
    http: reqwest::Client,
    token: String,
    project_id: String,
    dataset_id: Option<String>,
    location: Option<String>,
    limit: Arc<Semaphore>,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    #[serde(default)]
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
    #[serde(default)]
    job_reference: Option<JobReference>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<TableField>,
}

#[derive(Debug, Deserialize)]
struct TableField {
    #[serde(rename = "type", default)]
    type_tag: String,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    #[serde(default)]
    v: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    #[serde(default)]
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

impl BigQueryDriver {
    pub fn new(source: &Datasource) -> Result<Self, InfrastructureError> {
        let project_id = source.project_id.clone().ok_or_else(|| {
            InfrastructureError::Config(format!(
                "datasource '{}' needs a `project_id` for BigQuery",
                source.name
            ))
        })?;
        let token = source.access_token.clone().ok_or_else(|| {
            InfrastructureError::Connection {
                target: source.name.clone(),
                reason: "no access token configured; token acquisition is external".into(),
            }
        })?;

        Ok(Self {
            name: source.name.clone(),
            http: reqwest::Client::new(),
            token,
            project_id,
            dataset_id: source.dataset_id.clone(),
            location: source.location.clone(),
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

    async fn submit(&self, sql: &str) -> Result<QueryResponse, WeiserError> {
        let mut body = json!({
            "query": sql,
            "useLegacySql": false,
            "timeoutMs": self.timeout.as_millis().min(30_000) as u64,
        });
        if let Some(dataset) = &self.dataset_id {
            body["defaultDataset"] = json!({
                "projectId": self.project_id,
                "datasetId": dataset,
            });
        }
        if let Some(location) = &self.location {
            body["location"] = json!(location);
        }

        let response = self
            .http
            .post(format!("{API_BASE}/projects/{}/queries", self.project_id))
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
        let mut parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| self.query_error(sql, format!("unreadable response: {e}")))?;
        if let Some(error) = &parsed.error {
            return Err(self.query_error(sql, error.message.clone()));
        }

        let deadline = tokio::time::Instant::now() + self.timeout;
        while !parsed.job_complete {
            if tokio::time::Instant::now() > deadline {
                return Err(self.query_error(sql, "job polling timed out".into()));
            }
            let job = parsed
                .job_reference
                .as_ref()
                .ok_or_else(|| self.query_error(sql, "incomplete job without a reference".into()))?;
            let mut url = format!(
                "{API_BASE}/projects/{}/queries/{}",
                self.project_id, job.job_id
            );
            if let Some(location) = &job.location {
                url.push_str(&format!("?location={location}"));
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
            debug!(source = %self.name, job_id = %job.job_id, "Polling BigQuery job");
            let response = self
                .http
                .get(url)
                .bearer_auth(&self.token)
                .send()
                .await
                .map_err(|e| self.query_error(sql, e.to_string()))?;
            parsed = response
                .json()
                .await
                .map_err(|e| self.query_error(sql, format!("unreadable response: {e}")))?;
            if let Some(error) = &parsed.error {
                return Err(self.query_error(sql, error.message.clone()));
            }
        }
        Ok(parsed)
    }
}

fn normalize_cell(type_tag: &str, cell: &serde_json::Value) -> Scalar {
    let raw = match cell {
        serde_json::Value::Null => return Scalar::Null,
        serde_json::Value::String(s) => s.as_str(),
        other => return Scalar::Text(other.to_string()),
    };
    match type_tag {
        "INTEGER" | "INT64" => raw
            .parse::<i64>()
            .map(Scalar::Int)
            .unwrap_or_else(|_| Scalar::Text(raw.to_string())),
        "FLOAT" | "FLOAT64" | "NUMERIC" | "BIGNUMERIC" => raw
            .parse::<f64>()
            .map(Scalar::Float)
            .unwrap_or_else(|_| Scalar::Text(raw.to_string())),
        "BOOLEAN" | "BOOL" => Scalar::Bool(raw == "true"),
        // Timestamps arrive as epoch seconds with fraction.
        "TIMESTAMP" => raw
            .parse::<f64>()
            .ok()
            .and_then(|epoch| {
                let secs = epoch.trunc() as i64;
                let nanos = (epoch.fract() * 1e9) as u32;
                chrono::DateTime::from_timestamp(secs, nanos)
            })
            .map(|ts| Scalar::Timestamp(ts.naive_utc()))
            .unwrap_or_else(|| Scalar::Text(raw.to_string())),
        "DATETIME" => raw
            .parse::<chrono::NaiveDateTime>()
            .map(Scalar::Timestamp)
            .unwrap_or_else(|_| Scalar::Text(raw.to_string())),
        "DATE" => raw
            .parse::<chrono::NaiveDate>()
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(Scalar::Timestamp)
            .unwrap_or_else(|| Scalar::Text(raw.to_string())),
        _ => Scalar::Text(raw.to_string()),
    }
}

#[async_trait]
impl SourceDriver for BigQueryDriver {
    async fn execute(&self, sql: &str) -> Result<Vec<Row>, WeiserError> {
        let _permit = self
            .limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| WeiserError::InternalError("connection pool closed".into()))?;

        let response = self.submit(sql).await?;
        let fields = response.schema.map(|s| s.fields).unwrap_or_default();
        let rows = response
            .rows
            .iter()
            .map(|row| {
                row.f
                    .iter()
                    .enumerate()
                    .map(|(idx, cell)| {
                        let type_tag = fields
                            .get(idx)
                            .map(|f| f.type_tag.as_str())
                            .unwrap_or("STRING");
                        normalize_cell(type_tag, &cell.v)
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
        SqlDialect::BigQuery
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn query_timeout(&self) -> Duration {
        self.timeout
    }
}
