// weiser/src/cli.rs

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "weiser")]
#[command(version)]
#[command(about = "Declarative data-quality checks with a persistent metric store", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn verbose(&self) -> bool {
        match &self.command {
            Commands::Run { verbose, .. } => *verbose,
            Commands::Compile { verbose, .. } => *verbose,
            Commands::Sample { verbose, .. } => *verbose,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute all checks and record every evaluation
    Run {
        /// Path of the configuration file
        config: PathBuf,

        /// Print each recorded evaluation
        #[arg(long, short)]
        verbose: bool,

        /// Skip mirroring run results to object storage
        #[arg(long = "skip-export", short = 's')]
        skip_export: bool,

        /// Explicit .env file (its values win over the ambient environment)
        #[arg(long = "env-file", short = 'e')]
        env_file: Option<PathBuf>,
    },

    /// Parse and expand the checks, printing each leaf's SQL
    Compile {
        /// Path of the configuration file
        config: PathBuf,

        /// Print expansion details
        #[arg(long, short)]
        verbose: bool,

        /// Explicit .env file (its values win over the ambient environment)
        #[arg(long = "env-file", short = 'e')]
        env_file: Option<PathBuf>,
    },

    /// Execute one named check and print its rows
    Sample {
        /// Path of the configuration file
        config: PathBuf,

        /// Name of the check to sample
        #[arg(long, short)]
        check: String,

        /// Print execution details
        #[arg(long, short)]
        verbose: bool,

        /// Explicit .env file (its values win over the ambient environment)
        #[arg(long = "env-file", short = 'e')]
        env_file: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_flags() {
        let args = Cli::parse_from(["weiser", "run", "checks.yaml", "-v", "-s"]);
        match args.command {
            Commands::Run {
                config,
                verbose,
                skip_export,
                env_file,
            } => {
                assert_eq!(config, PathBuf::from("checks.yaml"));
                assert!(verbose);
                assert!(skip_export);
                assert!(env_file.is_none());
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_parse_sample_check_name() {
        let args = Cli::parse_from(["weiser", "sample", "checks.yaml", "--check", "orders_count"]);
        match args.command {
            Commands::Sample { check, .. } => {
                assert_eq!(check, "orders_count");
            }
            _ => panic!("Expected Sample command"),
        }
    }

    #[test]
    fn test_parse_env_file() {
        let args = Cli::parse_from(["weiser", "compile", "checks.yaml", "-e", "prod.env"]);
        match args.command {
            Commands::Compile { env_file, .. } => {
                assert_eq!(env_file, Some(PathBuf::from("prod.env")));
            }
            _ => panic!("Expected Compile command"),
        }
    }
}
