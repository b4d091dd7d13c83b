//! Install the newest eligible release immediately.

use super::CliConfig;
use crate::upgrade::{UpdateOutcome, UpdateService};
use crate::utils::TerminalProgress;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Args, Debug)]
pub struct InstallCommand {
    /// Swap the binary but do not restart the daemon
    #[arg(long)]
    pub(crate) no_restart: bool,
}

impl InstallCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let updater_config = config.load_updater_config().await?;
        let shutdown = CancellationToken::new();

        let bar = if config.no_progress {
            TerminalProgress::hidden()
        } else {
            TerminalProgress::new()
        };
        let service = UpdateService::from_config(&updater_config, shutdown.clone())?
            .with_sink(Arc::new(bar.clone()));

        // Ctrl-C aborts a download in flight; the swap itself always completes.
        let token = CancellationToken::new();
        let interrupt = token.clone();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling update");
                interrupt.cancel();
            }
        });

        let result = service.update_now(&token, !self.no_restart).await;
        watcher.abort();
        bar.finish_and_clear();

        match result? {
            UpdateOutcome::UpToDate(reason) => {
                println!("{} {}", "✓".green(), "Already up to date".green());
                println!("  {}", reason.dimmed());
            }
            UpdateOutcome::Installed(asset) => {
                println!(
                    "{} Installed {} from {}",
                    "✓".green(),
                    asset.last_release.green(),
                    asset.arch_asset.name
                );
                if self.no_restart {
                    println!("Restart the daemon to run the new version.");
                }
            }
            UpdateOutcome::Available(asset) => {
                println!("Update {} available but not installed", asset.last_release.yellow());
            }
        }
        Ok(())
    }
}
