//! Restore the backup left by the last install.

use super::CliConfig;
use crate::upgrade::UpdateService;
use crate::upgrade::backup::BackupManager;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tokio_util::sync::CancellationToken;

#[derive(Args, Debug)]
pub struct RollbackCommand {}

impl RollbackCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let updater_config = config.load_updater_config().await?;
        let token = CancellationToken::new();
        let service = UpdateService::from_config(&updater_config, token.clone())?;

        let backup = BackupManager::new(service.installer().target().to_path_buf());
        if !backup.backup_exists() {
            println!(
                "{} No backup found at {}",
                "✗".red(),
                backup.backup_path().display()
            );
            anyhow::bail!("Nothing to roll back");
        }

        println!("{}", "Rolling back to previous version...".yellow());
        service.rollback(&token).await?;
        println!("{} {}", "✓".green(), "Rolled back successfully".green());
        println!("Restart the daemon to run the restored version.");
        Ok(())
    }
}
