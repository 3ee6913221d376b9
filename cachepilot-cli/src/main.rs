//! CachePilot CLI - Command-line interface
//!
//! Replays navigation scripts against a simulated backend, inspects the
//! persisted navigation patterns and manages the configuration file.

mod commands;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use cachepilot::logging::{init_logging, LoggingConfig};
use clap::{Parser, Subcommand};

use commands::config::ConfigAction;
use commands::patterns::PatternsAction;
use commands::simulate::SimulateArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "cachepilot", version, about = "Adaptive cache orchestration toolkit")]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write logs to files in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay a route script against a simulated backend and print cache statistics
    Simulate(SimulateArgs),

    /// Inspect or maintain the learned navigation patterns
    Patterns {
        #[command(subcommand)]
        action: PatternsAction,
    },

    /// Create or show the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::default().with_level(if cli.verbose { "debug" } else { "warn" });
    if let Some(dir) = &cli.log_dir {
        logging = logging.with_directory(dir.clone());
    }
    let _guard = match init_logging(&logging).map_err(CliError::Logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::Simulate(args) => commands::simulate::run(cli.config.as_deref(), args),
        Command::Patterns { action } => commands::patterns::run(cli.config.as_deref(), action),
        Command::Config { action } => commands::config::run(cli.config.as_deref(), action),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", console::style("error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
