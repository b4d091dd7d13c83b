//! Report whether a newer release is available.

use super::CliConfig;
use crate::upgrade::{UpdateOutcome, UpdateService};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tokio_util::sync::CancellationToken;

#[derive(Args, Debug)]
pub struct CheckCommand {}

impl CheckCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let updater_config = config.load_updater_config().await?;
        let service = UpdateService::from_config(&updater_config, CancellationToken::new())?;

        println!("Checking for updates on the {} channel...", service.channel().as_str().cyan());

        match service.check_now().await? {
            UpdateOutcome::UpToDate(reason) => {
                println!(
                    "{} {} ({})",
                    "✓".green(),
                    "You are on the latest version".green(),
                    updater_config.running_version()
                );
                println!("  {}", reason.dimmed());
            }
            UpdateOutcome::Available(asset) | UpdateOutcome::Installed(asset) => {
                println!(
                    "{} {} → {}",
                    "Update available:".yellow(),
                    updater_config.running_version(),
                    asset.last_release.green()
                );
                println!("  asset: {} ({} bytes)", asset.arch_asset.name, asset.arch_asset.size);
                println!("Run {} to install it.", "srat-updater install".cyan());
            }
        }
        Ok(())
    }
}
