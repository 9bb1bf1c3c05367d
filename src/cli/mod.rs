//! Command-line interface.

pub mod commands;
pub mod context;
pub mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;

pub use context::AppContext;

#[derive(Parser, Debug)]
#[command(name = "citriage", version, about = "Classify CI workflow failures by root cause")]
pub struct Cli {
    /// Emit machine-readable JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to .citriage/config.yaml plus local overrides)
    #[arg(long, global = true, env = "CITRIAGE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the project directory, default config and database
    Init(commands::init::InitArgs),
    /// Classify the failed jobs of a workflow run
    Classify(commands::classify::ClassifyArgs),
    /// Re-classify jobs whose logs were previously unavailable
    Reprocess(commands::reprocess::ReprocessArgs),
    /// Show detection and cache statistics
    Stats(commands::stats::StatsArgs),
    /// List the built-in failure signatures
    Patterns(commands::patterns::PatternsArgs),
}

/// Resolve configuration from an explicit file or the project directory.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Report a fatal error and exit.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let chain: Vec<String> = err.chain().map(ToString::to_string).collect();
        let body = serde_json::json!({ "success": false, "error": err.to_string(), "causes": chain });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["citriage", "classify", "run.yaml", "--logs-dir", "logs", "--json"]).unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Classify(args) => {
                assert_eq!(args.manifest, PathBuf::from("run.yaml"));
                assert_eq!(args.logs_dir, Some(PathBuf::from("logs")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_config_flag() {
        let cli = Cli::try_parse_from(["citriage", "--config", "ci.yaml", "stats"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("ci.yaml")));
        assert!(matches!(cli.command, Commands::Stats(_)));
    }
}
