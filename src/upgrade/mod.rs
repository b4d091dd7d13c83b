//! Self-update pipeline for the SRAT daemon.
//!
//! The daemon discovers a newer release, downloads and unpacks it, checks its
//! signature, swaps it over the running binary and restarts into it, without
//! ever leaving the host without a working binary.
//!
//! # Architecture Overview
//!
//! - **[`ReleaseResolver`]**: picks the best release for the channel and architecture
//! - **[`PackageFetcher`]** with **[`ArchiveExtractor`]**: download into a temporary
//!   [`UpdatePackage`], with digest check and path-traversal protection
//! - **[`SignatureVerifier`]**: detached minisign signatures, policy per channel
//! - **[`Installer`]**: version sanity, atomic swap with `.old` backup, restart hand-off
//! - **[`UpdateService`]**: owns the above and allows one attempt at a time
//! - **[`UpdateScheduler`]**: background loop with an interval limiter and the
//!   develop drop-in watcher
//!
//! ## Attempt Flow
//!
//! ```text
//! CHECKING ─┬─> NO_UPGRADE
//!           └─> UPGRADE_AVAILABLE ──(auto update)──> DOWNLOADING ─> DOWNLOAD_COMPLETE
//!               ─> EXTRACTING ─> EXTRACT_COMPLETE ─> INSTALLING ─> INSTALL_COMPLETE
//!
//! any active stage ──> FAILED
//! ```
//!
//! Statuses are published through a [`ProgressSink`] in that order, with
//! non-decreasing percentages within each status.
//!
//! # Safety Mechanisms
//!
//! - Archive entries resolving outside the extraction root abort extraction
//! - Unsigned binaries are only accepted on the develop channel; a present but
//!   invalid signature is rejected everywhere
//! - The swap runs under an in-process guard and a per-host file lock, and is
//!   not interrupted by cancellation
//! - A failed swap moves `<target>.old` back before the error is reported
//!
//! # Example
//!
//! ```rust,no_run
//! use srat_updater::config::UpdaterConfig;
//! use srat_updater::upgrade::{UpdateScheduler, UpdateService};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = UpdaterConfig::load_with_optional(None).await?;
//! let shutdown = CancellationToken::new();
//! let service = Arc::new(UpdateService::from_config(&config, shutdown.clone())?);
//!
//! let scheduler = UpdateScheduler::start(service, &config.schedule, &shutdown);
//! shutdown.cancelled().await;
//! scheduler.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod backup;
pub mod cache;
pub mod channel;
pub mod extractor;
pub mod fetcher;
pub mod installer;
pub mod lock;
pub mod models;
pub mod progress;
pub mod release;
pub mod restart;
pub mod scheduler;
pub mod service;
pub mod signature;
pub mod verification;
pub mod version_probe;

#[cfg(test)]
mod tests;

pub use cache::ReleaseCache;
pub use channel::UpdateChannel;
pub use extractor::ArchiveExtractor;
pub use fetcher::{AssetResponse, AssetTransport, HttpTransport, PackageFetcher};
pub use installer::Installer;
pub use models::{BinaryAsset, ReleaseAsset, UpdatePackage};
pub use progress::{
    BroadcastSink, NullSink, ProgressSink, StageProgress, UpdateProgress, UpdateStatus,
};
pub use release::{GitHubReleaseSource, Release, ReleaseResolver, ReleaseSource, RemoteAsset};
pub use restart::{ProcessRestarter, RestartStrategy, Restarter};
pub use scheduler::{IntervalLimiter, SchedulerHandle, UpdateScheduler};
pub use service::{UpdateOutcome, UpdateService};
pub use signature::SignatureVerifier;
pub use verification::ChecksumVerifier;
pub use version_probe::{CommandVersionProbe, VersionProbe};
