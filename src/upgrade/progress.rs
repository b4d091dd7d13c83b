//! Progress reporting for update attempts.
//!
//! Every stage of an attempt publishes [`UpdateProgress`] values through a
//! [`ProgressSink`]. Delivery and fan-out belong to the sink; the pipeline only
//! guarantees ordering, which [`StageProgress`] enforces:
//!
//! - statuses move forward through the fixed stage order and never backward
//! - within one status, `progress` never decreases
//! - `FAILED` may follow any status
//!
//! ```text
//! CHECKING → NO_UPGRADE | UPGRADE_AVAILABLE
//!          → DOWNLOADING → DOWNLOAD_COMPLETE
//!          → EXTRACTING  → EXTRACT_COMPLETE
//!          → INSTALLING  → INSTALL_COMPLETE
//! ```

use crate::core::UpdateError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::debug;

/// Named stage of an update attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateStatus {
    Checking,
    NoUpgrade,
    UpgradeAvailable,
    Downloading,
    DownloadComplete,
    Extracting,
    ExtractComplete,
    Installing,
    InstallComplete,
    Failed,
}

impl UpdateStatus {
    /// Position in the stage order. `NoUpgrade` and `UpgradeAvailable` share a slot.
    const fn rank(self) -> u8 {
        match self {
            Self::Checking => 0,
            Self::NoUpgrade | Self::UpgradeAvailable => 1,
            Self::Downloading => 2,
            Self::DownloadComplete => 3,
            Self::Extracting => 4,
            Self::ExtractComplete => 5,
            Self::Installing => 6,
            Self::InstallComplete => 7,
            Self::Failed => 8,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Checking => "CHECKING",
            Self::NoUpgrade => "NO_UPGRADE",
            Self::UpgradeAvailable => "UPGRADE_AVAILABLE",
            Self::Downloading => "DOWNLOADING",
            Self::DownloadComplete => "DOWNLOAD_COMPLETE",
            Self::Extracting => "EXTRACTING",
            Self::ExtractComplete => "EXTRACT_COMPLETE",
            Self::Installing => "INSTALLING",
            Self::InstallComplete => "INSTALL_COMPLETE",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One broadcast progress value. Transient; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProgress {
    pub status: UpdateStatus,
    /// Percentage within `status`, 0 to 100.
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_release: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl UpdateProgress {
    #[must_use]
    pub fn new(status: UpdateStatus, progress: u8) -> Self {
        Self {
            status,
            progress: progress.min(100),
            last_release: None,
            error_message: None,
        }
    }

    /// A `FAILED` value carrying the error kind and message.
    #[must_use]
    pub fn failed(error: &UpdateError) -> Self {
        Self {
            status: UpdateStatus::Failed,
            progress: 100,
            last_release: None,
            error_message: Some(format!("{}: {error}", error.kind())),
        }
    }
}

/// Publish endpoint for progress values.
pub trait ProgressSink: Send + Sync {
    fn publish(&self, progress: UpdateProgress);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn publish(&self, _progress: UpdateProgress) {}
}

/// Fans progress out to any number of subscribers over a tokio broadcast channel.
///
/// Slow subscribers lag and miss values rather than blocking the pipeline.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<UpdateProgress>,
}

impl BroadcastSink {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<UpdateProgress> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(64)
    }
}

impl ProgressSink for BroadcastSink {
    fn publish(&self, progress: UpdateProgress) {
        // No subscribers is not an error.
        let _ = self.sender.send(progress);
    }
}

#[derive(Debug, Default)]
struct StageState {
    current: Option<(UpdateStatus, u8)>,
    last_release: Option<String>,
}

/// Ordering guard for the progress of a single update attempt.
///
/// Create one per attempt. Out-of-order values are dropped with a debug log
/// instead of reaching the sink.
pub struct StageProgress {
    sink: Arc<dyn ProgressSink>,
    state: Mutex<StageState>,
}

impl StageProgress {
    #[must_use]
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            sink,
            state: Mutex::new(StageState::default()),
        }
    }

    /// A tracker that publishes nowhere.
    #[must_use]
    pub fn silent() -> Self {
        Self::new(Arc::new(NullSink))
    }

    /// Attach the release tag to every following value.
    pub fn set_release(&self, tag: impl Into<String>) {
        self.lock().last_release = Some(tag.into());
    }

    /// Publish `percent` for `status` if it respects the ordering rules.
    pub fn emit(&self, status: UpdateStatus, percent: u8) {
        let percent = percent.min(100);
        let mut state = self.lock();

        if let Some((current, last)) = state.current {
            if status == current && percent <= last {
                return;
            }
            if status != current && status.rank() <= current.rank() {
                debug!(from = %current, to = %status, "Dropping out-of-order progress");
                return;
            }
        }
        state.current = Some((status, percent));

        let mut value = UpdateProgress::new(status, percent);
        value.last_release.clone_from(&state.last_release);
        drop(state);
        self.sink.publish(value);
    }

    /// Publish `done / total` as a percentage of `status`.
    pub fn ratio(&self, status: UpdateStatus, done: u64, total: u64) {
        self.emit(status, percent_of(done, total));
    }

    /// Publish `status` at 100.
    pub fn complete(&self, status: UpdateStatus) {
        self.emit(status, 100);
    }

    /// Publish `FAILED` for `error`. Always delivered once per attempt.
    pub fn fail(&self, error: &UpdateError) {
        let mut state = self.lock();
        if matches!(state.current, Some((UpdateStatus::Failed, _))) {
            return;
        }
        state.current = Some((UpdateStatus::Failed, 100));

        let mut value = UpdateProgress::failed(error);
        value.last_release.clone_from(&state.last_release);
        drop(state);
        self.sink.publish(value);
    }

    /// The most recently published status, if any.
    #[must_use]
    pub fn current(&self) -> Option<UpdateStatus> {
        self.lock().current.map(|(status, _)| status)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StageState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for StageProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageProgress").field("current", &self.current()).finish_non_exhaustive()
    }
}

/// Integer percentage of `done / total`, clamped to 0..=100. A zero total reads as 0.
#[must_use]
pub fn percent_of(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (u128::from(done) * 100 / u128::from(total)).min(100);
    u8::try_from(pct).unwrap_or(100)
}
