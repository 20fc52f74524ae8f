// weiser/src/commands/compile.rs
//
// USE CASE: show what would run, without executing anything.

use std::path::PathBuf;

use anyhow::Context;
use weiser_core::application::compile_all;
use weiser_core::infrastructure::config::{load_config, LoadOptions};

pub fn execute(
    config_path: PathBuf,
    verbose: bool,
    env_file: Option<PathBuf>,
) -> anyhow::Result<()> {
    let options = LoadOptions { env_file };
    let config = load_config(&config_path, &options)
        .with_context(|| format!("Failed to load configuration from {config_path:?}"))?;

    let compiled = compile_all(&config).context("Compilation failed")?;
    println!("📝 {} leaves compiled", compiled.len());
    for leaf in &compiled {
        match &leaf.sql {
            Some(sql) => println!("-- {} ({})\n{sql}\n", leaf.leaf, leaf.datasource),
            None => println!("-- {} (metric store history)\n", leaf.leaf),
        }
        if verbose && leaf.leaf != leaf.check {
            println!("   from check: {}", leaf.check);
        }
    }
    Ok(())
}
