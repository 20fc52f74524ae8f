// weiser/src/main.rs
//
// Thin dispatcher — parses CLI args and routes to command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::Commands;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    let filter = if cli.verbose() { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    match cli.command {
        Commands::Run {
            config,
            verbose,
            skip_export,
            env_file,
        } => commands::run::execute(config, verbose, skip_export, env_file).await,

        Commands::Compile {
            config,
            verbose,
            env_file,
        } => commands::compile::execute(config, verbose, env_file),

        Commands::Sample {
            config,
            check,
            env_file,
            ..
        } => commands::sample::execute(config, check, env_file).await,
    }
}
