// weiser/src/commands/run.rs
//
// USE CASE: execute every declared check and record the outcomes.

use std::path::PathBuf;

use anyhow::Context;
use weiser_core::application::{pre_run, run_checks, CancelFlag};
use weiser_core::infrastructure::config::{load_config, LoadOptions};

pub async fn execute(
    config_path: PathBuf,
    verbose: bool,
    skip_export: bool,
    env_file: Option<PathBuf>,
) -> anyhow::Result<()> {
    let start = std::time::Instant::now();

    // A. Load + template-expand the configuration (Infra)
    println!("⚙️  Loading configuration...");
    let options = LoadOptions { env_file };
    let config = load_config(&config_path, &options)
        .with_context(|| format!("Failed to load configuration from {config_path:?}"))?;
    println!(
        "   {} checks across {} datasources",
        config.checks.len(),
        config.datasources.len()
    );

    // B. Connect store + sources (store failure aborts: nothing could be
    // persisted)
    let ctx = pre_run(config).await.context("Pre-run failed")?;
    if !ctx.failed_sources.is_empty() {
        for (source, reason) in &ctx.failed_sources {
            println!("   ⚠️  Datasource '{source}' unavailable: {reason}");
        }
    }

    // C. Run the plan (Application Layer)
    println!("🟢 Running checks...");
    let cancel = CancelFlag::new();
    let summary = run_checks(&ctx, &cancel, verbose).await?;

    if !skip_export {
        ctx.store.flush(&ctx.run_id).await?;
    }

    // D. Read the run back from the store: the persisted counts must agree
    // with what the runner tallied in memory.
    let persisted = ctx.store.run_summary(&ctx.run_id).await?;
    if persisted.total != summary.records
        || persisted.passed != summary.passed
        || persisted.failed != summary.failed
    {
        eprintln!(
            "   ⚠️  Store disagrees with the run: persisted {}/{} passed/failed over {} records, \
             tallied {}/{} over {}",
            persisted.passed,
            persisted.failed,
            persisted.total,
            summary.passed,
            summary.failed,
            summary.records
        );
    }

    println!(
        "✨ Done in {:.2}s. {} recorded: {} passed, {} failed.",
        start.elapsed().as_secs_f64(),
        persisted.total,
        persisted.passed,
        persisted.failed
    );
    for error in &summary.errors {
        eprintln!("   ❌ {error}");
    }

    if summary.all_green() {
        Ok(())
    } else {
        // Non-zero exit when any recorded leaf failed.
        std::process::exit(1);
    }
}
