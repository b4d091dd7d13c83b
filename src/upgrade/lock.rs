//! Per-host install lock.
//!
//! The in-process guard in [`UpdateService`](crate::upgrade::UpdateService)
//! serializes attempts within one daemon. This lock extends that to every
//! process sharing the data directory, so two daemons on one host never swap
//! binaries at the same time. The lock is released when dropped.
//!
//! Waiting never parks a thread: the lock is polled with `try_lock_exclusive`
//! under exponential backoff, so the wait observes cancellation and gives up
//! after a timeout.

use crate::core::UpdateError;
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// File name of the lock inside the data directory.
pub const LOCK_FILE_NAME: &str = ".update.lock";

/// How long an install waits for another process to release the lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(120);

const STARTING_BACKOFF_DELAY_MS: u64 = 10;
const MAX_BACKOFF_DELAY_MS: u64 = 500;

pub struct InstallLock {
    file: Arc<File>,
    path: PathBuf,
}

impl InstallLock {
    /// Acquire `<data_dir>/.update.lock`, waiting at most [`DEFAULT_LOCK_TIMEOUT`].
    pub async fn acquire(data_dir: &Path, token: &CancellationToken) -> Result<Self, UpdateError> {
        Self::acquire_with_timeout(data_dir, token, DEFAULT_LOCK_TIMEOUT).await
    }

    /// Acquire the lock, polling with backoff from 10ms up to 500ms.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::Cancelled`] when `token` fires while waiting
    /// - [`UpdateError::Busy`] when another process still holds the lock after `timeout`
    /// - [`UpdateError::InstallFailed`] when the lock file cannot be opened
    pub async fn acquire_with_timeout(
        data_dir: &Path,
        token: &CancellationToken,
        timeout: Duration,
    ) -> Result<Self, UpdateError> {
        let lock_path = data_dir.join(LOCK_FILE_NAME);
        let failed = |reason: String| UpdateError::install("lock", &lock_path, reason);

        tokio::fs::create_dir_all(data_dir)
            .await
            .map_err(|e| failed(format!("cannot create {}: {e}", data_dir.display())))?;

        let open_path = lock_path.clone();
        let file = tokio::task::spawn_blocking(move || {
            OpenOptions::new().create(true).write(true).truncate(false).open(&open_path)
        })
        .await
        .map_err(|e| failed(e.to_string()))?
        .map_err(|e| failed(format!("cannot open lock file: {e}")))?;
        let file = Arc::new(file);

        let start = std::time::Instant::now();
        let backoff = ExponentialBackoff::from_millis(STARTING_BACKOFF_DELAY_MS)
            .max_delay(Duration::from_millis(MAX_BACKOFF_DELAY_MS));

        for delay in backoff {
            if token.is_cancelled() {
                return Err(UpdateError::Cancelled);
            }

            let candidate = Arc::clone(&file);
            let locked = tokio::task::spawn_blocking(move || candidate.try_lock_exclusive())
                .await
                .map_err(|e| failed(e.to_string()))?;

            match locked {
                Ok(true) => {
                    debug!(
                        path = %lock_path.display(),
                        wait_ms = start.elapsed().as_millis(),
                        "Install lock acquired"
                    );
                    return Ok(Self { file, path: lock_path });
                }
                Ok(false) | Err(_) => {
                    let remaining = timeout.saturating_sub(start.elapsed());
                    if remaining.is_zero() {
                        warn!(path = %lock_path.display(), ?timeout, "Install lock still held");
                        return Err(UpdateError::Busy);
                    }
                    tokio::select! {
                        biased;
                        () = token.cancelled() => return Err(UpdateError::Cancelled),
                        () = tokio::time::sleep(delay.min(remaining)) => {}
                    }
                }
            }
        }

        Err(UpdateError::Busy)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(self.file.as_ref()) {
            warn!(path = %self.path.display(), error = %e, "Failed to release install lock");
        }
    }
}
