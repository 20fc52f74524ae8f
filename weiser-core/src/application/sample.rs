// weiser-core/src/application/sample.rs

use tracing::debug;

use crate::application::runner::RunContext;
use crate::domain::check::{expander, LeafTarget};
use crate::domain::sql::SqlDialect;
use crate::error::WeiserError;
use crate::infrastructure::error::InfrastructureError;
use crate::ports::Row;

/// Rows produced by one leaf of a sampled check.
#[derive(Debug)]
pub struct SampledLeaf {
    pub leaf: String,
    pub sql: String,
    pub rows: Vec<Row>,
    /// Most recent value recorded for this leaf's checkId, when any run
    /// has been persisted before.
    pub last_recorded: Option<f64>,
}

/// Execute a single named check against its source and return the raw
/// rows, without evaluating conditions or writing records.
pub async fn sample_check(ctx: &RunContext, name: &str) -> Result<Vec<SampledLeaf>, WeiserError> {
    let check = ctx
        .config
        .checks
        .iter()
        .find(|c| c.name == name)
        .ok_or_else(|| {
            InfrastructureError::Config(format!("no check named '{name}' in the configuration"))
        })?;

    let driver = ctx.drivers.get(&check.datasource);
    let dialect = driver.map(|d| d.dialect()).unwrap_or(SqlDialect::DuckDb);

    let mut sampled = Vec::new();
    for leaf in expander::expand(check, dialect)? {
        match leaf.target {
            LeafTarget::Source { sql, .. } => {
                let driver = driver.ok_or_else(|| InfrastructureError::Connection {
                    target: check.datasource.clone(),
                    reason: ctx
                        .failed_sources
                        .get(&check.datasource)
                        .cloned()
                        .unwrap_or_else(|| "datasource unavailable".into()),
                })?;
                debug!(leaf = %leaf.name, sql, "Sampling leaf");
                let rows = driver.execute(&sql).await?;
                let last_recorded = ctx.store.last_value(&leaf.check_id).await?;
                sampled.push(SampledLeaf {
                    leaf: leaf.name,
                    sql,
                    rows,
                    last_recorded,
                });
            }
            LeafTarget::Store {
                target_check_id,
                predicate,
            } => {
                let points = ctx
                    .store
                    .history(target_check_id.as_deref(), predicate.as_deref())
                    .await?;
                let rows = points
                    .into_iter()
                    .map(|p| {
                        vec![
                            crate::ports::Scalar::Timestamp(p.run_time),
                            crate::ports::Scalar::Float(p.value),
                        ]
                    })
                    .collect();
                sampled.push(SampledLeaf {
                    leaf: leaf.name,
                    sql: "-- metric store history".into(),
                    rows,
                    last_recorded: None,
                });
            }
        }
    }
    Ok(sampled)
}
