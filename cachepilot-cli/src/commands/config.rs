//! Configuration file commands.

use std::path::Path;

use cachepilot::config::{config_file_path, ConfigFile};
use clap::Subcommand;
use console::style;

use super::common::load_config;
use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(config_path: Option<&Path>, action: ConfigAction) -> Result<(), CliError> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(config_file_path);

    match action {
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                return Err(CliError::Config(format!(
                    "{} already exists. Use --force to overwrite it.",
                    path.display()
                )));
            }
            ConfigFile::default().save_to(&path)?;
            println!("Wrote default configuration to {}", style(path.display()).bold());
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_config(Some(&path))?;
            if !path.exists() {
                println!("{}", style("# file not found, showing defaults").dim());
            }
            print!("{}", config.to_ini_string()?);
            Ok(())
        }
        ConfigAction::Path => {
            println!("{}", path.display());
            Ok(())
        }
    }
}
