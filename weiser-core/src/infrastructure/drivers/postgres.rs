// weiser-core/src/infrastructure/drivers/postgres.rs

// PostgreSQL wire driver, also used for Cube semantic-layer endpoints
// (same protocol, same dialect). Connections are created lazily, parked
// in an idle list and bounded by a semaphore sized from
// `max_connections`.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_postgres::types::Type;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, warn};

use crate::domain::sql::SqlDialect;
use crate::error::WeiserError;
use crate::infrastructure::config::Datasource;
use crate::infrastructure::error::InfrastructureError;
use crate::ports::{Row, Scalar, SourceDriver};

pub struct PostgresDriver {
    name: String,
    conn_str: String,
    dialect: SqlDialect,
    limit: Arc<Semaphore>,
    idle: Arc<Mutex<Vec<Client>>>,
    timeout: Duration,
}

impl PostgresDriver {
    pub fn new(source: &Datasource) -> Result<Self, InfrastructureError> {
        let conn_str = match &source.uri {
            Some(uri) => uri.clone(),
            None => {
                let host = source.host.clone().ok_or_else(|| {
                    InfrastructureError::Config(format!(
                        "datasource '{}' needs a `uri` or a `host`",
                        source.name
                    ))
                })?;
                let mut parts = vec![format!("host={host}")];
                if let Some(port) = source.port {
                    parts.push(format!("port={port}"));
                }
                if let Some(user) = &source.user {
                    parts.push(format!("user={user}"));
                }
                if let Some(password) = &source.password {
                    parts.push(format!("password={password}"));
                }
                if let Some(db) = &source.db_name {
                    parts.push(format!("dbname={db}"));
                }
                parts.join(" ")
            }
        };

        Ok(Self {
            name: source.name.clone(),
            conn_str,
            dialect: source.dialect(),
            limit: Arc::new(Semaphore::new(source.pool_size())),
            idle: Arc::new(Mutex::new(Vec::new())),
            timeout: source.query_timeout(),
        })
    }

    async fn acquire(&self) -> Result<(OwnedSemaphorePermit, Client), WeiserError> {
        let permit = self
            .limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| WeiserError::InternalError("connection pool closed".into()))?;

        // Reuse an idle connection when one is still alive.
        let parked = self
            .idle
            .lock()
            .map_err(|_| WeiserError::InternalError("pool mutex poisoned".into()))?
            .pop();
        if let Some(client) = parked {
            if !client.is_closed() {
                return Ok((permit, client));
            }
            debug!(source = %self.name, "Dropping closed pooled connection");
        }

        let (client, connection) = tokio_postgres::connect(&self.conn_str, NoTls)
            .await
            .map_err(|e| {
                WeiserError::Infrastructure(InfrastructureError::Connection {
                    target: self.name.clone(),
                    reason: e.to_string(),
                })
            })?;
        let source = self.name.clone();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(source = %source, error = %e, "PostgreSQL connection task ended");
            }
        });
        Ok((permit, client))
    }

    fn park(&self, client: Client) {
        if client.is_closed() {
            return;
        }
        if let Ok(mut idle) = self.idle.lock() {
            idle.push(client);
        }
    }
}

fn normalize_row(row: &tokio_postgres::Row) -> Result<Row, tokio_postgres::Error> {
    let mut out = Vec::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let ty = column.type_();
        let scalar = if *ty == Type::INT2 {
            row.try_get::<_, Option<i16>>(idx)?
                .map(|v| Scalar::Int(v as i64))
        } else if *ty == Type::INT4 {
            row.try_get::<_, Option<i32>>(idx)?
                .map(|v| Scalar::Int(v as i64))
        } else if *ty == Type::INT8 || *ty == Type::OID {
            row.try_get::<_, Option<i64>>(idx)?.map(Scalar::Int)
        } else if *ty == Type::FLOAT4 {
            row.try_get::<_, Option<f32>>(idx)?
                .map(|v| Scalar::Float(v as f64))
        } else if *ty == Type::FLOAT8 {
            row.try_get::<_, Option<f64>>(idx)?.map(Scalar::Float)
        } else if *ty == Type::NUMERIC {
            use rust_decimal::prelude::ToPrimitive;
            row.try_get::<_, Option<rust_decimal::Decimal>>(idx)?
                .and_then(|v| v.to_f64())
                .map(Scalar::Float)
        } else if *ty == Type::BOOL {
            row.try_get::<_, Option<bool>>(idx)?.map(Scalar::Bool)
        } else if *ty == Type::TIMESTAMP {
            row.try_get::<_, Option<chrono::NaiveDateTime>>(idx)?
                .map(Scalar::Timestamp)
        } else if *ty == Type::TIMESTAMPTZ {
            row.try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)?
                .map(|v| Scalar::Timestamp(v.naive_utc()))
        } else if *ty == Type::DATE {
            row.try_get::<_, Option<chrono::NaiveDate>>(idx)?
                .and_then(|v| v.and_hms_opt(0, 0, 0))
                .map(Scalar::Timestamp)
        } else {
            // Text-ish and anything else the wire can render as text.
            row.try_get::<_, Option<String>>(idx).ok().flatten().map(Scalar::Text)
        };
        out.push(scalar.unwrap_or(Scalar::Null));
    }
    Ok(out)
}

#[async_trait]
impl SourceDriver for PostgresDriver {
    async fn execute(&self, sql: &str) -> Result<Vec<Row>, WeiserError> {
        let (permit, client) = self.acquire().await?;
        let result = client.query(sql, &[]).await;
        let rows = match result {
            Ok(rows) => rows,
            Err(e) => {
                drop(permit);
                return Err(WeiserError::Infrastructure(InfrastructureError::Query {
                    target: self.name.clone(),
                    reason: e.to_string(),
                    sql: sql.to_string(),
                }));
            }
        };

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(normalize_row(row).map_err(|e| {
                WeiserError::Infrastructure(InfrastructureError::Query {
                    target: self.name.clone(),
                    reason: format!("result decoding failed: {e}"),
                    sql: sql.to_string(),
                })
            })?);
        }
        self.park(client);
        drop(permit);
        Ok(out)
    }

    async fn probe(&self) -> Result<(), WeiserError> {
        self.execute("SELECT 1").await.map(|_| ())
    }

    fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn query_timeout(&self) -> Duration {
        self.timeout
    }
}
