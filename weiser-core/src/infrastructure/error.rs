// weiser-core/src/infrastructure/error.rs

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum DatabaseError {
    #[error("DuckDB Engine Error: {0}")]
    #[diagnostic(
        code(weiser::infra::database::duckdb),
        help("An error occurred inside the embedded SQL engine.")
    )]
    DuckDb(#[from] duckdb::Error),

    #[error("PostgreSQL Error: {0}")]
    #[diagnostic(code(weiser::infra::database::postgres))]
    Postgres(#[from] tokio_postgres::Error),

    #[error("MySQL Error: {0}")]
    #[diagnostic(code(weiser::infra::database::mysql))]
    MySql(#[from] mysql_async::Error),

    #[error("HTTP driver error: {0}")]
    #[diagnostic(code(weiser::infra::database::http))]
    Http(#[from] reqwest::Error),

    #[error("Migration Error: {0}")]
    #[diagnostic(code(weiser::infra::database::migration))]
    Migration(String),
}

#[derive(Error, Debug, Diagnostic)]
pub enum InfrastructureError {
    // --- DATABASE (Abstracted) ---
    #[error(transparent)]
    #[diagnostic(transparent)]
    Database(#[from] DatabaseError),

    // --- CONNECTIONS ---
    #[error("Connection to '{target}' failed: {reason}")]
    #[diagnostic(
        code(weiser::infra::connection),
        help("Check host, credentials and network reachability for this source.")
    )]
    Connection { target: String, reason: String },

    // --- QUERIES (carries the offending SQL for diagnosis) ---
    #[error("Query against '{target}' failed: {reason}\n  sql: {sql}")]
    #[diagnostic(code(weiser::infra::query))]
    Query {
        target: String,
        reason: String,
        sql: String,
    },

    // --- FILESYSTEM (IO) ---
    #[error("File System Error: {0}")]
    #[diagnostic(
        code(weiser::infra::io),
        help("Check file permissions or path validity.")
    )]
    Io(#[from] std::io::Error),

    // --- CONFIG / YAML ---
    #[error("YAML Parsing Error: {0}")]
    #[diagnostic(
        code(weiser::infra::yaml),
        help("Check your YAML syntax (indentation, types).")
    )]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration Error: {0}")]
    #[diagnostic(code(weiser::infra::config))]
    Config(String),

    #[error("Configuration file not found at '{0}'")]
    #[diagnostic(code(weiser::infra::config_missing))]
    ConfigNotFound(String),

    // --- TEMPLATING ---
    #[error("Template Rendering Error: {0}")]
    #[diagnostic(
        code(weiser::infra::template),
        help("Every {{{{ NAME }}}} placeholder must resolve from the .env file or the environment.")
    )]
    Template(#[from] minijinja::Error),
}

// Manual implementations for shortcuts (e.g. `?` operator on driver calls)
impl From<duckdb::Error> for InfrastructureError {
    fn from(err: duckdb::Error) -> Self {
        InfrastructureError::Database(DatabaseError::DuckDb(err))
    }
}

impl From<tokio_postgres::Error> for InfrastructureError {
    fn from(err: tokio_postgres::Error) -> Self {
        InfrastructureError::Database(DatabaseError::Postgres(err))
    }
}

impl From<mysql_async::Error> for InfrastructureError {
    fn from(err: mysql_async::Error) -> Self {
        InfrastructureError::Database(DatabaseError::MySql(err))
    }
}

impl From<reqwest::Error> for InfrastructureError {
    fn from(err: reqwest::Error) -> Self {
        InfrastructureError::Database(DatabaseError::Http(err))
    }
}
