// weiser-core/tests/engine_scenarios.rs
//
// End-to-end runs over a file-backed DuckDB source and metric store.
// Each scenario seeds real tables, runs the full pipeline and asserts
// on what actually landed in the metrics table.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use chrono::{Duration, Utc};
use duckdb::Connection;
use std::path::Path;

use weiser_core::application::{pre_run, run_checks, CancelFlag, RunContext, RunSummary};
use weiser_core::domain::check::{CheckType, Condition};
use weiser_core::domain::record::MetricRecord;
use weiser_core::infrastructure::config::BaseConfig;

fn seed_source(path: &Path) -> Result<()> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "CREATE TABLE orders (id INTEGER, budgeted_amount DOUBLE, status VARCHAR);
         INSERT INTO orders VALUES
             (1, 100.00, 'open'),
             (2, 200.00, 'open'),
             (3, 300.00, 'closed'),
             (4, 406.00, 'closed');
         CREATE TABLE vendors (id INTEGER, tenant_id INTEGER);
         INSERT INTO vendors VALUES (1, 1), (2, 1), (3, 2);
         CREATE TABLE customers (id INTEGER, email VARCHAR, phone VARCHAR);
         INSERT INTO customers VALUES
             (1, NULL, '555-0001'),
             (2, NULL, '555-0002'),
             (3, NULL, '555-0003'),
             (4, 'a@example.com', '555-0004'),
             (5, 'b@example.com', '555-0005');",
    )?;
    Ok(())
}

fn config(dir: &Path, checks_yaml: &str) -> Result<BaseConfig> {
    let source = dir.join("source.db");
    let metrics = dir.join("metrics.db");
    let yaml = format!(
        r#"
version: 1
datasources:
  - name: default
    type: duckdb
    db_name: "{}"
connections:
  - name: metricstore
    type: metricstore
    db_type: duckdb
    db_name: "{}"
checks:
{checks_yaml}
"#,
        source.display(),
        metrics.display(),
    );
    Ok(serde_yaml::from_str(&yaml)?)
}

async fn run(dir: &Path, checks_yaml: &str) -> Result<(RunContext, RunSummary)> {
    let ctx = pre_run(config(dir, checks_yaml)?).await?;
    let summary = run_checks(&ctx, &CancelFlag::new(), false).await?;
    Ok((ctx, summary))
}

/// Open the metrics file once the engine's connections are dropped.
fn metrics_conn(dir: &Path) -> Result<Connection> {
    Ok(Connection::open(dir.join("metrics.db"))?)
}

fn count_where(conn: &Connection, clause: &str) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM metrics WHERE {clause}");
    Ok(conn.query_row(&sql, [], |row| row.get(0))?)
}

#[tokio::test]
async fn scenario_simple_row_count_pass() -> Result<()> {
    let dir = tempfile::tempdir()?;
    seed_source(&dir.path().join("source.db"))?;

    let (ctx, summary) = run(
        dir.path(),
        r#"  - name: orders_count
    dataset: orders
    type: row_count
    condition: gt
    threshold: 0"#,
    )
    .await?;
    assert_eq!(summary.records, 1);
    assert_eq!(summary.passed, 1);
    assert!(summary.all_green());
    drop(ctx);

    let conn = metrics_conn(dir.path())?;
    assert_eq!(
        count_where(&conn, "name = 'orders_count' AND actual_value = 4 AND success")?,
        1
    );
    Ok(())
}

#[tokio::test]
async fn scenario_dataset_list_fans_out() -> Result<()> {
    let dir = tempfile::tempdir()?;
    seed_source(&dir.path().join("source.db"))?;

    let (ctx, summary) = run(
        dir.path(),
        r#"  - name: table_counts
    dataset: [orders, vendors]
    type: row_count
    condition: gt
    threshold: 0"#,
    )
    .await?;
    assert_eq!(summary.records, 2);
    assert_eq!(summary.passed, 2);
    drop(ctx);

    let conn = metrics_conn(dir.path())?;
    assert_eq!(count_where(&conn, "name = 'table_counts' AND actual_value = 4")?, 1);
    assert_eq!(count_where(&conn, "name = 'table_counts' AND actual_value = 3")?, 1);
    // Same declared name, different datasets, different check ids.
    let distinct: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT check_id) FROM metrics WHERE name = 'table_counts'",
        [],
        |row| row.get(0),
    )?;
    assert_eq!(distinct, 2);
    Ok(())
}

#[tokio::test]
async fn scenario_dimensional_row_count() -> Result<()> {
    let dir = tempfile::tempdir()?;
    seed_source(&dir.path().join("source.db"))?;

    let (ctx, summary) = run(
        dir.path(),
        r#"  - name: vendors_by_tenant
    dataset: vendors
    type: row_count
    dimensions: [tenant_id]
    condition: gt
    threshold: 0"#,
    )
    .await?;
    assert_eq!(summary.records, 2);
    assert_eq!(summary.passed, 2);
    drop(ctx);

    let conn = metrics_conn(dir.path())?;
    assert_eq!(
        count_where(&conn, "dimensions = ['1'] AND actual_value = 2")?,
        1
    );
    assert_eq!(
        count_where(&conn, "dimensions = ['2'] AND actual_value = 1")?,
        1
    );
    // Partitions of one declared check share its check id.
    let distinct: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT check_id) FROM metrics",
        [],
        |row| row.get(0),
    )?;
    assert_eq!(distinct, 1);
    Ok(())
}

#[tokio::test]
async fn scenario_between_sum() -> Result<()> {
    let dir = tempfile::tempdir()?;
    seed_source(&dir.path().join("source.db"))?;

    let (ctx, summary) = run(
        dir.path(),
        r#"  - name: budget_in_band
    dataset: orders
    type: numeric
    measure: sum(budgeted_amount)
    condition: between
    threshold: [1000, 2000]
  - name: budget_above_band
    dataset: orders
    type: numeric
    measure: sum(budgeted_amount)
    condition: between
    threshold: [1500, 2000]"#,
    )
    .await?;
    assert_eq!(summary.records, 2);
    assert_eq!(summary.passed, 1);
    assert_eq!(summary.failed, 1);
    drop(ctx);

    let conn = metrics_conn(dir.path())?;
    assert_eq!(
        count_where(&conn, "name = 'budget_in_band' AND actual_value = 1006.0 AND success")?,
        1
    );
    assert_eq!(
        count_where(
            &conn,
            "name = 'budget_above_band' AND fail AND threshold IS NULL \
             AND threshold_list = [1500.0, 2000.0]"
        )?,
        1
    );
    Ok(())
}

#[tokio::test]
async fn scenario_not_empty_per_dimension() -> Result<()> {
    let dir = tempfile::tempdir()?;
    seed_source(&dir.path().join("source.db"))?;

    let (ctx, summary) = run(
        dir.path(),
        r#"  - name: customers_contact
    dataset: customers
    type: not_empty
    dimensions: [email, phone]
    condition: le
    threshold: 0"#,
    )
    .await?;
    assert_eq!(summary.records, 2);
    assert_eq!(summary.passed, 1);
    assert_eq!(summary.failed, 1);
    drop(ctx);

    let conn = metrics_conn(dir.path())?;
    assert_eq!(
        count_where(
            &conn,
            "name = 'customers_contact_email_not_empty' AND actual_value = 3 AND fail"
        )?,
        1
    );
    assert_eq!(
        count_where(
            &conn,
            "name = 'customers_contact_phone_not_empty' AND actual_value = 0 AND success"
        )?,
        1
    );
    Ok(())
}

fn history_record(check_id: &str, value: f64, offset_secs: i64) -> MetricRecord {
    MetricRecord {
        check_id: check_id.into(),
        run_id: "seed-run".into(),
        name: "orders_count".into(),
        datasource: "default".into(),
        dataset: "orders".into(),
        check_type: CheckType::RowCount,
        condition: Condition::Gt,
        threshold: Some(0.0),
        threshold_list: Vec::new(),
        actual_value: Some(value),
        success: true,
        fail: false,
        run_time: (Utc::now() + Duration::seconds(offset_secs)).naive_utc(),
        dimensions: Vec::new(),
        time_bucket: None,
    }
}

#[tokio::test]
async fn scenario_anomaly_constant_history_scores_zero() -> Result<()> {
    let dir = tempfile::tempdir()?;
    seed_source(&dir.path().join("source.db"))?;
    let target = "1111111111111111111111111111111111111111111111111111111111111111";

    let checks = format!(
        r#"  - name: orders_count_drift
    dataset: metrics
    type: anomaly
    check_id: "{target}"
    condition: between
    threshold: [-3.5, 3.5]"#
    );

    // Constant history: MAD = 0, so z = 0 by definition, inside the band.
    let ctx = pre_run(config(dir.path(), &checks)?).await?;
    for i in 0..10 {
        ctx.store.write(&history_record(target, 100.0, i)).await?;
    }
    let summary = run_checks(&ctx, &CancelFlag::new(), false).await?;
    assert_eq!(summary.records, 1);
    assert_eq!(summary.passed, 1);
    drop(ctx);

    let conn = metrics_conn(dir.path())?;
    assert_eq!(
        count_where(&conn, "name = 'orders_count_drift' AND actual_value = 0 AND success")?,
        1
    );
    Ok(())
}

#[tokio::test]
async fn scenario_anomaly_spike_leaves_the_band() -> Result<()> {
    let dir = tempfile::tempdir()?;
    seed_source(&dir.path().join("source.db"))?;
    let target = "3333333333333333333333333333333333333333333333333333333333333333";

    let checks = format!(
        r#"  - name: orders_count_drift
    dataset: metrics
    type: anomaly
    check_id: "{target}"
    condition: between
    threshold: [-3.5, 3.5]"#
    );

    // Stable-but-jittered history (MAD > 0, unlike the constant case):
    // the latest value scores well inside the band.
    let stable = [99.0, 101.0, 100.0, 98.0, 102.0, 100.0, 99.5, 100.5, 100.0, 101.0];
    let ctx = pre_run(config(dir.path(), &checks)?).await?;
    for (i, value) in stable.iter().enumerate() {
        ctx.store.write(&history_record(target, *value, i as i64)).await?;
    }
    let summary = run_checks(&ctx, &CancelFlag::new(), false).await?;
    assert_eq!(summary.records, 1);
    assert_eq!(summary.passed, 1);

    // Inject a brutal outlier as the newest point and rerun: |z| >> 3.5.
    ctx.store.write(&history_record(target, 10_000.0, 60)).await?;
    let summary = run_checks(&ctx, &CancelFlag::new(), false).await?;
    assert_eq!(summary.records, 1);
    assert_eq!(summary.failed, 1);
    drop(ctx);

    let conn = metrics_conn(dir.path())?;
    assert_eq!(
        count_where(
            &conn,
            "name = 'orders_count_drift' AND success AND abs(actual_value) <= 3.5"
        )?,
        1
    );
    assert_eq!(
        count_where(
            &conn,
            "name = 'orders_count_drift' AND fail AND abs(actual_value) > 3.5"
        )?,
        1
    );
    Ok(())
}

#[tokio::test]
async fn scenario_insufficient_history_is_not_an_anomaly() -> Result<()> {
    let dir = tempfile::tempdir()?;
    seed_source(&dir.path().join("source.db"))?;
    let target = "2222222222222222222222222222222222222222222222222222222222222222";

    let checks = format!(
        r#"  - name: young_check_drift
    dataset: metrics
    type: anomaly
    check_id: "{target}"
    condition: between
    threshold: [-3.5, 3.5]"#
    );

    let ctx = pre_run(config(dir.path(), &checks)?).await?;
    for i in 0..3 {
        ctx.store.write(&history_record(target, 50.0, i)).await?;
    }
    let summary = run_checks(&ctx, &CancelFlag::new(), false).await?;
    assert_eq!(summary.records, 1);
    assert_eq!(summary.passed, 1);
    assert!(summary.all_green());
    Ok(())
}

#[tokio::test]
async fn scenario_failed_leaf_is_isolated() -> Result<()> {
    let dir = tempfile::tempdir()?;
    seed_source(&dir.path().join("source.db"))?;

    // First check queries a missing table; second must still run.
    let (ctx, summary) = run(
        dir.path(),
        r#"  - name: broken_check
    dataset: does_not_exist
    type: row_count
    condition: gt
    threshold: 0
  - name: orders_count
    dataset: orders
    type: row_count
    condition: gt
    threshold: 0"#,
    )
    .await?;
    assert_eq!(summary.records, 2);
    assert_eq!(summary.passed, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.errors.len(), 1);
    drop(ctx);

    let conn = metrics_conn(dir.path())?;
    assert_eq!(
        count_where(&conn, "name = 'broken_check' AND fail AND actual_value IS NULL")?,
        1
    );
    assert_eq!(count_where(&conn, "name = 'orders_count' AND success")?, 1);
    Ok(())
}

#[tokio::test]
async fn scenario_filter_narrows_rows() -> Result<()> {
    let dir = tempfile::tempdir()?;
    seed_source(&dir.path().join("source.db"))?;

    let (ctx, summary) = run(
        dir.path(),
        r#"  - name: open_orders
    dataset: orders
    type: row_count
    condition: eq
    threshold: 2
    filter: "status = 'open'""#,
    )
    .await?;
    assert_eq!(summary.passed, 1);
    drop(ctx);

    let conn = metrics_conn(dir.path())?;
    assert_eq!(count_where(&conn, "name = 'open_orders' AND actual_value = 2")?, 1);
    Ok(())
}
