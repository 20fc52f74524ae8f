// weiser-core/src/application/runner.rs

// The orchestrator: expand every declared check, execute the leaves on a
// bounded worker pool, evaluate conditions, and append one record per
// observation to the metric store. Per-leaf failures are isolated and
// recorded; only configuration and store-level failures abort.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use tracing::{debug, error, info, warn};

use crate::domain::anomaly::{self, Assessment};
use crate::domain::check::{condition, expander, LeafCheck, LeafTarget};
use crate::domain::record::MetricRecord;
use crate::domain::sql::{ResultShape, SqlDialect};
use crate::error::WeiserError;
use crate::infrastructure::config::BaseConfig;
use crate::infrastructure::drivers::DriverFactory;
use crate::infrastructure::store::create_store;
use crate::ports::{MetricStore, Row, Scalar, SourceDriver};

/// Leaves from independent checks run concurrently; this caps the global
/// fan-out (per-source bounds live in the driver pools).
const GLOBAL_FANOUT: usize = 8;

/// Cooperative cancellation: no new leaves are dispatched once raised;
/// already-completed results are still flushed to the store.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct RunContext {
    pub run_id: String,
    pub config: BaseConfig,
    pub drivers: HashMap<String, Arc<dyn SourceDriver>>,
    /// Sources whose pool init or probe failed; their leaves are recorded
    /// as failures while other sources proceed.
    pub failed_sources: HashMap<String, String>,
    pub store: Arc<dyn MetricStore>,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub run_id: String,
    pub records: u64,
    pub passed: u64,
    pub failed: u64,
    pub errors: Vec<String>,
}

impl RunSummary {
    pub fn all_green(&self) -> bool {
        self.failed == 0 && self.errors.is_empty()
    }
}

/// Validate the configuration, connect the store (abort on failure —
/// nothing could be persisted), build and probe one driver per source.
pub async fn pre_run(config: BaseConfig) -> Result<RunContext, WeiserError> {
    config.validate()?;

    let store_config = config.metric_store().ok_or_else(|| {
        WeiserError::InternalError("validated config lost its metricstore connection".into())
    })?;
    let store = create_store(store_config).await?;
    store.initialize().await?;
    debug!("Metric store initialized");

    let mut drivers: HashMap<String, Arc<dyn SourceDriver>> = HashMap::new();
    let mut failed_sources = HashMap::new();
    for source in &config.datasources {
        match DriverFactory::create(source) {
            Ok(driver) => match driver.probe().await {
                Ok(()) => {
                    info!(source = %source.name, "Connected to datasource");
                    drivers.insert(source.name.clone(), driver);
                }
                Err(e) => {
                    error!(source = %source.name, error = %e, "Datasource probe failed");
                    failed_sources.insert(source.name.clone(), e.to_string());
                }
            },
            Err(e) => {
                error!(source = %source.name, error = %e, "Driver construction failed");
                failed_sources.insert(source.name.clone(), e.to_string());
            }
        }
    }

    Ok(RunContext {
        run_id: uuid::Uuid::new_v4().to_string(),
        config,
        drivers,
        failed_sources,
        store,
    })
}

/// Execute every declared check. Returns only after all leaves have been
/// recorded (or skipped by cancellation).
pub async fn run_checks(
    ctx: &RunContext,
    cancel: &CancelFlag,
    verbose: bool,
) -> Result<RunSummary, WeiserError> {
    let mut summary = RunSummary {
        run_id: ctx.run_id.clone(),
        ..Default::default()
    };

    // Expansion, in declaration order. Compile failures are isolated per
    // check: recorded as a failed leaf, the rest of the plan proceeds.
    let mut units: Vec<LeafCheck> = Vec::new();
    for check in &ctx.config.checks {
        let dialect = ctx
            .drivers
            .get(&check.datasource)
            .map(|d| d.dialect())
            .unwrap_or(SqlDialect::DuckDb);
        match expander::expand(check, dialect) {
            Ok(leaves) => units.extend(leaves),
            Err(e) => {
                error!(check = %check.name, error = %e, "Check failed to compile");
                summary.errors.push(format!("{}: {e}", check.name));
                let leaf = compile_failure_leaf(check);
                let record = build_record(&leaf, &ctx.run_id, None, false, &[], None);
                let mut report = LeafReport::empty();
                write_record(ctx.store.as_ref(), record, &mut report, verbose).await;
                summary.records += report.records;
                summary.failed += report.failed;
                if let Some(e) = report.error {
                    summary.errors.push(e);
                }
            }
        }
    }
    info!(leaves = units.len(), run_id = %ctx.run_id, "Execution plan expanded");

    // Bounded parallel execution; dispatch order is stable, completion
    // order is not.
    let reports: Vec<LeafReport> = futures::stream::iter(
        units
            .into_iter()
            .map(|leaf| run_leaf(ctx, leaf, cancel, verbose)),
    )
    .buffer_unordered(GLOBAL_FANOUT)
    .collect()
    .await;

    for report in reports {
        summary.records += report.records;
        summary.passed += report.passed;
        summary.failed += report.failed;
        if let Some(e) = report.error {
            summary.errors.push(e);
        }
    }

    info!(
        run_id = %summary.run_id,
        records = summary.records,
        passed = summary.passed,
        failed = summary.failed,
        errors = summary.errors.len(),
        "Run finished"
    );
    Ok(summary)
}

struct LeafReport {
    records: u64,
    passed: u64,
    failed: u64,
    error: Option<String>,
}

impl LeafReport {
    fn empty() -> Self {
        Self {
            records: 0,
            passed: 0,
            failed: 0,
            error: None,
        }
    }
}

fn compile_failure_leaf(check: &crate::domain::check::CheckDescriptor) -> LeafCheck {
    let entry = check.dataset.entries().first().map(|s| s.to_string()).unwrap_or_default();
    let dataset = expander::DatasetRef::classify(&entry);
    LeafCheck {
        check_id: crate::domain::check::check_id(
            &check.datasource,
            &check.name,
            &dataset.fingerprint_identifier(),
        ),
        name: check.name.clone(),
        datasource: check.datasource.clone(),
        dataset: dataset.canonical_text().to_string(),
        check_type: check.check_type,
        condition: check.condition,
        threshold: check.threshold.clone(),
        target: LeafTarget::Store {
            target_check_id: None,
            predicate: None,
        },
    }
}

async fn run_leaf(
    ctx: &RunContext,
    leaf: LeafCheck,
    cancel: &CancelFlag,
    verbose: bool,
) -> LeafReport {
    if cancel.is_cancelled() {
        debug!(leaf = %leaf.name, "Skipped by cancellation");
        return LeafReport::empty();
    }

    let mut report = LeafReport::empty();
    match &leaf.target {
        LeafTarget::Source { sql, shape } => {
            run_source_leaf(ctx, &leaf, sql, shape, &mut report, verbose).await;
        }
        LeafTarget::Store {
            target_check_id,
            predicate,
        } => {
            run_anomaly_leaf(
                ctx,
                &leaf,
                target_check_id.as_deref(),
                predicate.as_deref(),
                &mut report,
                verbose,
            )
            .await;
        }
    }
    report
}

async fn run_source_leaf(
    ctx: &RunContext,
    leaf: &LeafCheck,
    sql: &str,
    shape: &ResultShape,
    report: &mut LeafReport,
    verbose: bool,
) {
    let driver = match ctx.drivers.get(&leaf.datasource) {
        Some(driver) => driver.clone(),
        None => {
            let reason = ctx
                .failed_sources
                .get(&leaf.datasource)
                .cloned()
                .unwrap_or_else(|| "datasource unavailable".into());
            report.error = Some(format!("{}: {reason}", leaf.name));
            let record = build_record(leaf, &ctx.run_id, None, false, &[], None);
            write_record(ctx.store.as_ref(), record, report, verbose).await;
            return;
        }
    };

    debug!(leaf = %leaf.name, sql, "Executing leaf");
    let result = tokio::time::timeout(driver.query_timeout(), driver.execute(sql)).await;
    let rows = match result {
        Ok(Ok(rows)) => rows,
        Ok(Err(e)) => {
            error!(leaf = %leaf.name, error = %e, "Leaf query failed");
            report.error = Some(format!("{}: {e}", leaf.name));
            let record = build_record(leaf, &ctx.run_id, None, false, &[], None);
            write_record(ctx.store.as_ref(), record, report, verbose).await;
            return;
        }
        Err(_) => {
            error!(leaf = %leaf.name, "Leaf query timed out");
            report.error = Some(format!("{}: query timed out", leaf.name));
            let record = build_record(leaf, &ctx.run_id, None, false, &[], None);
            write_record(ctx.store.as_ref(), record, report, verbose).await;
            return;
        }
    };

    match shape {
        ResultShape::Scalar => {
            let observed = rows.first().and_then(|row| row.last()).cloned();
            let mut value = observed.as_ref().and_then(Scalar::as_f64);
            // Empty-table NULL reads as 0 for the completeness types.
            if value.is_none() && leaf.check_type.is_completeness() {
                value = Some(0.0);
            }
            let success = value
                .map(|v| condition::passes(leaf.condition, &leaf.threshold, v))
                .unwrap_or(false);
            let record = build_record(leaf, &ctx.run_id, value, success, &[], None);
            write_record(ctx.store.as_ref(), record, report, verbose).await;
        }
        ResultShape::Grouped {
            dimensions,
            time_alias,
        } => {
            for row in &rows {
                let (name_suffix, dimension_values, time_bucket, value) =
                    split_grouped_row(row, dimensions, time_alias.as_deref());
                let success = value
                    .map(|v| condition::passes(leaf.condition, &leaf.threshold, v))
                    .unwrap_or(false);
                let mut record =
                    build_record(leaf, &ctx.run_id, value, success, &dimension_values, time_bucket);
                record.name = format!("{}{name_suffix}", leaf.name);
                write_record(ctx.store.as_ref(), record, report, verbose).await;
            }
        }
    }
}

/// Split one grouped result row into `(name suffix, dimension values,
/// time bucket, measured value)`. Layout: dimensions, optional bucket,
/// measurement last.
fn split_grouped_row(
    row: &Row,
    dimensions: &[String],
    time_alias: Option<&str>,
) -> (String, Vec<String>, Option<chrono::NaiveDateTime>, Option<f64>) {
    let mut suffix = String::new();
    let mut values = Vec::with_capacity(dimensions.len());
    for (idx, dim) in dimensions.iter().enumerate() {
        let label = row.get(idx).map(Scalar::to_label).unwrap_or_default();
        suffix.push_str(&format!("_{dim}_{label}"));
        values.push(label);
    }
    let mut time_bucket = None;
    if let Some(alias) = time_alias {
        let cell = row.get(dimensions.len());
        time_bucket = cell.and_then(Scalar::as_timestamp);
        let label = cell.map(Scalar::to_label).unwrap_or_default();
        suffix.push_str(&format!("_{alias}_{label}"));
    }
    let value = row.last().and_then(Scalar::as_f64);
    (suffix, values, time_bucket, value)
}

async fn run_anomaly_leaf(
    ctx: &RunContext,
    leaf: &LeafCheck,
    target_check_id: Option<&str>,
    predicate: Option<&str>,
    report: &mut LeafReport,
    verbose: bool,
) {
    let history = match ctx.store.history(target_check_id, predicate).await {
        Ok(points) => points,
        Err(e) => {
            error!(leaf = %leaf.name, error = %e, "History fetch failed");
            report.error = Some(format!("{}: {e}", leaf.name));
            let record = build_record(leaf, &ctx.run_id, None, false, &[], None);
            write_record(ctx.store.as_ref(), record, report, verbose).await;
            return;
        }
    };

    let series: Vec<f64> = history.iter().map(|p| p.value).collect();
    let (value, success) = match anomaly::assess(&series) {
        Assessment::InsufficientHistory { observations } => {
            // Not an anomaly: recorded as a success with z = 0.
            warn!(
                leaf = %leaf.name,
                observations,
                required = anomaly::MIN_HISTORY,
                "Insufficient history for anomaly analysis"
            );
            (Some(0.0), true)
        }
        Assessment::Scored { z_score, observations } => {
            debug!(leaf = %leaf.name, z_score, observations, "Anomaly score computed");
            (
                Some(z_score),
                condition::passes(leaf.condition, &leaf.threshold, z_score),
            )
        }
    };
    let record = build_record(leaf, &ctx.run_id, value, success, &[], None);
    write_record(ctx.store.as_ref(), record, report, verbose).await;
}

fn build_record(
    leaf: &LeafCheck,
    run_id: &str,
    actual_value: Option<f64>,
    success: bool,
    dimensions: &[String],
    time_bucket: Option<chrono::NaiveDateTime>,
) -> MetricRecord {
    MetricRecord {
        check_id: leaf.check_id.clone(),
        run_id: run_id.to_string(),
        name: leaf.name.clone(),
        datasource: leaf.datasource.clone(),
        dataset: leaf.dataset.clone(),
        check_type: leaf.check_type,
        condition: leaf.condition,
        threshold: leaf.threshold.scalar(),
        threshold_list: leaf
            .threshold
            .pair()
            .map(|(lo, hi)| vec![lo, hi])
            .unwrap_or_default(),
        actual_value,
        success,
        fail: !success,
        run_time: Utc::now().naive_utc(),
        dimensions: dimensions.to_vec(),
        time_bucket,
    }
}

async fn write_record(
    store: &dyn MetricStore,
    record: MetricRecord,
    report: &mut LeafReport,
    verbose: bool,
) {
    if verbose {
        match serde_json::to_string(&record) {
            Ok(json) => info!(record = %json, "Recorded evaluation"),
            Err(_) => info!(name = %record.name, "Recorded evaluation"),
        }
    }
    match store.write(&record).await {
        Ok(()) => {
            report.records += 1;
            if record.success {
                report.passed += 1;
            } else {
                report.failed += 1;
            }
        }
        Err(e) => {
            error!(name = %record.name, error = %e, "Metric-store write failed");
            report.error = Some(format!("{}: store write failed: {e}", record.name));
        }
    }
}
