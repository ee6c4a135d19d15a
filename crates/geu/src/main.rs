//! Command-line entry point.

use clap::{Parser, Subcommand};
use geu_lib::commands;
use geu_lib::commands::app::AppError;
use geu_lib::commands::update::RunOutcome;
use geu_lib::config::{Config, ConfigError};
use log::{LevelFilter, info};
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the gnome-extension-updater binary
#[derive(Debug, Error)]
enum GeuError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Command orchestration failed.
    #[error(transparent)]
    App(#[from] AppError),
}

/// Command line of the `gnome-extension-updater` binary.
#[derive(Parser)]
#[command(name = "gnome-extension-updater")]
#[command(about = "Upgrade GNOME Shell user extensions from extensions.gnome.org", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file (default: $XDG_CONFIG_HOME/gnome-extension-updater/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Command to run.
    #[command(subcommand)]
    command: Commands,
}

/// Subcommands.
#[derive(Subcommand)]
enum Commands {
    /// List installed extensions and what the decision service wants done with them
    Check {
        /// Include disabled extensions
        #[arg(long)]
        all: bool,
    },
    /// Upgrade every extension the decision service marks for upgrade
    Update {
        /// Do not archive extensions and settings before updating
        #[arg(long)]
        skip_backup: bool,
    },
    /// Finish an update that was interrupted
    Recover,
}

/// Parse the command line, load configuration and run the command.
fn main() -> Result<(), GeuError> {
    let cli = Cli::parse();

    init_logging(&cli);

    let config_path = cli.config.clone().or_else(Config::default_path);
    let config = Config::load(config_path.as_deref())?;

    match cli.command {
        Commands::Check { all } => {
            commands::app::check(&config, !all)?;
        }
        Commands::Update { skip_backup } => {
            if let RunOutcome::Applied { restored, .. } =
                commands::app::update(&config, skip_backup)?
            {
                info!(
                    "Restored {} enabled extension(s); user extensions {}.",
                    restored.enabled.len(),
                    if restored.user_extensions_disabled {
                        "disabled"
                    } else {
                        "enabled"
                    }
                );
            }
        }
        Commands::Recover => {
            if let Some(report) = commands::app::recover(&config)? {
                info!("Reinstalled {} extension(s).", report.reinstalled.len());
            }
        }
    }
    Ok(())
}

/// Initialize logging based on the verbosity level specified in the CLI
fn init_logging(cli: &Cli) {
    let mut builder = env_logger::builder();
    builder
        .filter_level(if cli.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .format(|buf, record| {
            let level = record.level();
            let style = &buf.default_level_style(level);
            writeln!(buf, "[{style}{level}{style:#}] {}", record.args())
        });

    if !cli.verbose {
        builder.format_timestamp(None);
    }

    builder.init();
}
