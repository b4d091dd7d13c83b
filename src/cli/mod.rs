//! Command-line interface for the SRAT updater.
//!
//! # Commands
//!
//! - `check` - Ask the release API whether a newer build exists
//! - `install` - Download, verify and install the newest build now
//! - `run` - Run the background scheduler until interrupted
//! - `verify` - Check a binary's detached signature without installing it
//! - `rollback` - Restore `<executable>.old` over the running executable
//!
//! # Global Options
//!
//! - `--verbose` / `-v` - Debug logging
//! - `--quiet` / `-q` - No logging
//! - `--config` / `-c` - Updater config file
//! - `--no-progress` - Hide progress bars
//!
//! `RUST_LOG` overrides the level chosen by `--verbose` and `--quiet`.
//!
//! # Example
//!
//! ```bash
//! srat-updater check
//! srat-updater install --no-restart
//! srat-updater --config /etc/srat/updater.toml run
//! srat-updater verify ./srat --channel release
//! srat-updater rollback
//! ```

mod check;
mod install;
mod rollback;
mod run;
mod verify;

use crate::config::UpdaterConfig;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Settings derived from the global flags, shared by every command.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Default log filter; `None` disables logging.
    pub log_level: Option<String>,

    /// Hide progress bars.
    pub no_progress: bool,

    /// Explicit updater config file.
    pub config_path: Option<PathBuf>,
}

impl CliConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the global tracing subscriber, writing to stderr.
    ///
    /// `RUST_LOG` wins over the level picked from the flags.
    pub fn init_logging(&self) {
        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::new(self.log_level.as_deref().unwrap_or("off")),
        };
        // A subscriber may already be set when embedded in tests.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }

    /// Load the updater config named by `--config`, or the default one.
    pub async fn load_updater_config(&self) -> Result<UpdaterConfig> {
        UpdaterConfig::load_with_optional(self.config_path.clone()).await
    }
}

#[derive(Parser)]
#[command(
    name = "srat-updater",
    about = "Self-update tool for the SRAT NAS daemon",
    version,
    author,
    long_about = "Discovers, downloads, verifies and installs new SRAT builds from GitHub \
                  releases, keeping the previous binary for rollback."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all log output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Path to the updater config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Disable progress bars
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check for a newer release without installing it
    Check(check::CheckCommand),

    /// Install the newest eligible release now
    Install(install::InstallCommand),

    /// Run the update scheduler until interrupted
    Run(run::RunCommand),

    /// Verify a binary's detached minisign signature
    Verify(verify::VerifyCommand),

    /// Restore the previous binary from its `.old` backup
    Rollback(rollback::RollbackCommand),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            None
        } else {
            Some("info".to_string())
        };

        CliConfig {
            log_level,
            no_progress: self.no_progress,
            config_path: self.config.clone(),
        }
    }

    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        config.init_logging();

        match self.command {
            Commands::Check(cmd) => cmd.execute(&config).await,
            Commands::Install(cmd) => cmd.execute(&config).await,
            Commands::Run(cmd) => cmd.execute(&config).await,
            Commands::Verify(cmd) => cmd.execute(&config).await,
            Commands::Rollback(cmd) => cmd.execute(&config).await,
        }
    }
}
