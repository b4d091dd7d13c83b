//! SRAT Updater - self-update pipeline for the SRAT NAS daemon
//!
//! SRAT runs as a long-lived daemon on Home Assistant hosts. This crate keeps
//! it current: it finds newer builds on GitHub releases, downloads the
//! archive for the host architecture, checks its minisign signature, swaps the
//! binary in place and restarts into it.
//!
//! # Architecture Overview
//!
//! - Releases are listed from the GitHub API and filtered by update channel
//!   (`none`, `develop`, `prerelease`, `release`)
//! - The best candidate is strictly newer than the running build
//! - Archives are unpacked into a private temporary directory that is removed
//!   whatever the outcome
//! - The running binary is only replaced by an atomic rename, with the previous
//!   build kept as `<binary>.old`
//!
//! ## Key Features
//!
//! - **Fail closed**: release and prerelease builds must carry a valid signature
//! - **One attempt at a time**: concurrent callers get a busy error
//! - **Progress**: every stage publishes status and percentage to subscribers
//! - **Develop builds**: drop a binary into the data directory to install it
//!
//! # Core Modules
//!
//! - [`cli`] - Command-line interface
//! - [`config`] - Updater configuration file
//! - [`core`] - Error taxonomy and user-facing error rendering
//! - [`upgrade`] - Resolver, fetcher, verifier, installer, service and scheduler
//! - [`utils`] - Filesystem, path validation, platform and progress helpers
//!
//! # Example
//!
//! ```rust,no_run
//! use srat_updater::config::UpdaterConfig;
//! use srat_updater::upgrade::{UpdateOutcome, UpdateService};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = UpdaterConfig::load_with_optional(None).await?;
//! let service = UpdateService::from_config(&config, CancellationToken::new())?;
//!
//! if let UpdateOutcome::Available(asset) = service.check_now().await? {
//!     println!("{} is available", asset.last_release);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod upgrade;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
