//! Check a binary's signature the way the installer would.

use super::CliConfig;
use crate::upgrade::{CommandVersionProbe, SignatureVerifier, UpdateChannel, VersionProbe};
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct VerifyCommand {
    /// Binary to verify; its signature is read from `<binary>.minisig`
    binary: PathBuf,

    /// Channel whose signature policy applies [default: configured channel]
    #[arg(long)]
    channel: Option<UpdateChannel>,

    /// Trust this minisign public key file instead of the embedded key
    #[arg(long, value_name = "FILE")]
    public_key: Option<PathBuf>,
}

impl VerifyCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let channel = match self.channel {
            Some(channel) => channel,
            None => config.load_updater_config().await?.update_channel,
        };

        let verifier = match &self.public_key {
            Some(path) => {
                let key = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read public key {}", path.display()))?;
                SignatureVerifier::with_public_key(&key)?
            }
            None => SignatureVerifier::embedded(),
        };

        if !self.binary.is_file() {
            anyhow::bail!("Binary {} does not exist", self.binary.display());
        }

        verifier.verify(&self.binary, channel).await?;
        println!(
            "{} {} accepted for the {} channel",
            "✓".green(),
            self.binary.display(),
            channel.as_str().cyan()
        );

        if let Some(version) = CommandVersionProbe::new().probe(&self.binary).await {
            println!("  reports version {}", version.to_string().green());
        }
        Ok(())
    }
}
