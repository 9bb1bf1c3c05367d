//! citriage CLI entry point.

use clap::Parser;

use citriage::cli::{self, Cli, Commands};
use citriage::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match cli::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => cli::handle_error(err, cli.json),
    };

    // Held for the lifetime of the process so buffered file logs are flushed.
    let _logger = match LoggerImpl::init(&LogConfig::from(&config.logging)) {
        Ok(logger) => Some(logger),
        Err(err) => {
            eprintln!("Warning: logging disabled: {err:#}");
            None
        }
    };

    let result = match cli.command {
        Commands::Init(args) => cli::commands::init::execute(args, &config, cli.json).await,
        Commands::Classify(args) => cli::commands::classify::execute(args, &config, cli.json).await,
        Commands::Reprocess(args) => cli::commands::reprocess::execute(args, &config, cli.json).await,
        Commands::Stats(args) => cli::commands::stats::execute(args, &config, cli.json).await,
        Commands::Patterns(args) => cli::commands::patterns::execute(args, cli.json).await,
    };

    if let Err(err) = result {
        cli::handle_error(err, cli.json);
    }
}
