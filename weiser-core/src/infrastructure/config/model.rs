// weiser-core/src/infrastructure/config/model.rs

use serde::{Deserialize, Serialize};

use crate::domain::check::CheckDescriptor;
use crate::domain::sql::SqlDialect;
use crate::error::WeiserError;
use crate::infrastructure::error::InfrastructureError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    Postgresql,
    Mysql,
    Cube,
    Snowflake,
    Databricks,
    Bigquery,
    Duckdb,
}

impl DbType {
    pub fn dialect(&self) -> SqlDialect {
        match self {
            // Cube's SQL API speaks the PostgreSQL wire protocol and dialect.
            DbType::Postgresql | DbType::Cube => SqlDialect::Postgres,
            DbType::Mysql => SqlDialect::MySql,
            DbType::Snowflake => SqlDialect::Snowflake,
            DbType::Databricks => SqlDialect::Databricks,
            DbType::Bigquery => SqlDialect::BigQuery,
            DbType::Duckdb => SqlDialect::DuckDb,
        }
    }
}

/// One declared data source. Either the individual fields or a full `uri`
/// suffice; type-specific fields apply to the matching driver only.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Datasource {
    pub name: String,
    #[serde(rename = "type")]
    pub db_type: DbType,

    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub db_name: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,

    // Snowflake
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub warehouse: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub schema_name: Option<String>,

    // Databricks
    #[serde(default)]
    pub http_path: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub catalog: Option<String>,

    // BigQuery
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub dataset_id: Option<String>,
    #[serde(default)]
    pub credentials_path: Option<String>,
    #[serde(default)]
    pub location: Option<String>,

    // Tuning
    #[serde(default)]
    pub max_connections: Option<usize>,
    #[serde(default)]
    pub query_timeout_secs: Option<u64>,
}

impl Datasource {
    pub fn dialect(&self) -> SqlDialect {
        self.db_type.dialect()
    }

    pub fn pool_size(&self) -> usize {
        self.max_connections.unwrap_or(4).max(1)
    }

    pub fn query_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.query_timeout_secs.unwrap_or(300))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    Metricstore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricStoreBackend {
    #[default]
    Duckdb,
    Postgresql,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum S3UrlStyle {
    Path,
    Vhost,
}

impl S3UrlStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            S3UrlStyle::Path => "path",
            S3UrlStyle::Vhost => "vhost",
        }
    }
}

/// Metric-store connection record. The embedded backend may carry S3
/// mirror settings; the relational backend uses the common fields.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: ConnectionKind,
    #[serde(default)]
    pub db_type: MetricStoreBackend,

    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub db_name: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub s3_access_key: Option<String>,
    #[serde(default)]
    pub s3_secret_access_key: Option<String>,
    #[serde(default)]
    pub s3_endpoint: Option<String>,
    #[serde(default)]
    pub s3_region: Option<String>,
    #[serde(default)]
    pub s3_bucket: Option<String>,
    #[serde(default)]
    pub s3_url_style: Option<S3UrlStyle>,
}

impl ConnectionConfig {
    pub fn has_s3_mirror(&self) -> bool {
        self.s3_bucket.is_some()
            && self.s3_access_key.is_some()
            && self.s3_secret_access_key.is_some()
    }
}

fn default_version() -> u32 {
    1
}

/// The root configuration document, after template expansion and
/// `includes` merging.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BaseConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub datasources: Vec<Datasource>,
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
    #[serde(default)]
    pub checks: Vec<CheckDescriptor>,
    #[serde(default)]
    pub includes: Vec<String>,
    /// Consumed by an out-of-core notifier; carried through untouched.
    #[serde(default)]
    pub slack_url: Option<String>,
}

impl BaseConfig {
    /// Merge an included document into this one: list sections append,
    /// scalar sections keep the first non-default value seen.
    pub fn merge(&mut self, other: BaseConfig) {
        self.datasources.extend(other.datasources);
        self.connections.extend(other.connections);
        self.checks.extend(other.checks);
        if self.slack_url.is_none() {
            self.slack_url = other.slack_url;
        }
    }

    pub fn metric_store(&self) -> Option<&ConnectionConfig> {
        self.connections
            .iter()
            .find(|c| c.kind == ConnectionKind::Metricstore)
    }

    /// Load-time validation: everything caught here aborts before any
    /// query runs.
    pub fn validate(&self) -> Result<(), WeiserError> {
        if self.version != 1 {
            return Err(InfrastructureError::Config(format!(
                "unsupported config version {} (expected 1)",
                self.version
            ))
            .into());
        }
        if self.metric_store().is_none() {
            return Err(InfrastructureError::Config(
                "no connection of type `metricstore` declared".into(),
            )
            .into());
        }

        let source_names: Vec<&str> = self.datasources.iter().map(|d| d.name.as_str()).collect();
        for check in &self.checks {
            check.validate().map_err(WeiserError::Domain)?;
            // Anomaly checks read the metric store; every other type needs
            // its datasource declared.
            if check.check_type != crate::domain::check::CheckType::Anomaly
                && !source_names.contains(&check.datasource.as_str())
            {
                return Err(crate::domain::error::DomainError::UnknownDatasource {
                    check: check.name.clone(),
                    datasource: check.datasource.clone(),
                }
                .into());
            }
        }
        Ok(())
    }
}
