// weiser/src/commands/sample.rs
//
// USE CASE: execute one named check and print its raw rows.

use std::path::PathBuf;

use anyhow::Context;
use weiser_core::application::{pre_run, sample_check};
use weiser_core::infrastructure::config::{load_config, LoadOptions};
use weiser_core::ports::Scalar;

pub async fn execute(
    config_path: PathBuf,
    check: String,
    env_file: Option<PathBuf>,
) -> anyhow::Result<()> {
    let options = LoadOptions { env_file };
    let config = load_config(&config_path, &options)
        .with_context(|| format!("Failed to load configuration from {config_path:?}"))?;

    let ctx = pre_run(config).await.context("Pre-run failed")?;
    let sampled = sample_check(&ctx, &check)
        .await
        .with_context(|| format!("Sampling check '{check}' failed"))?;

    for leaf in &sampled {
        println!("-- {}\n{}", leaf.leaf, leaf.sql);
        for row in &leaf.rows {
            let cells: Vec<String> = row.iter().map(Scalar::to_label).collect();
            println!("   {}", cells.join(" | "));
        }
        if let Some(previous) = leaf.last_recorded {
            println!("   last recorded: {previous}");
        }
        println!();
    }
    Ok(())
}
