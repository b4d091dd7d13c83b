//! Foreground scheduler loop.

use super::CliConfig;
use crate::upgrade::{UpdateScheduler, UpdateService};
use anyhow::Result;
use clap::Args;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Args, Debug)]
pub struct RunCommand {}

impl RunCommand {
    /// Runs until Ctrl-C, or until a supervised restart asks the process to exit.
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let updater_config = config.load_updater_config().await?;
        let shutdown = CancellationToken::new();
        let service = Arc::new(UpdateService::from_config(&updater_config, shutdown.clone())?);

        info!(
            channel = %service.channel(),
            auto_update = service.auto_update(),
            check_interval_secs = updater_config.schedule.check_interval_secs,
            "Starting update scheduler"
        );
        let scheduler = UpdateScheduler::start(service, &updater_config.schedule, &shutdown);

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Interrupted, shutting down");
                shutdown.cancel();
            }
            () = shutdown.cancelled() => {
                info!("Shutdown requested for restart");
            }
        }

        scheduler.stop().await;
        Ok(())
    }
}
