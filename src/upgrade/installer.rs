//! Verified, atomic replacement of the running binary.
//!
//! An install runs in this order:
//!
//! 1. The package must name an executable that exists on disk.
//! 2. Its detached signature is checked for the configured channel.
//! 3. The version the candidate reports is compared with the running one.
//! 4. Under the per-host [`InstallLock`], the swap:
//!    - snapshot the target to `<target>.old`
//!    - rename a staged copy of the new binary over the target
//!    - place every auxiliary file relative to the target's directory
//!    - on any failure, move `<target>.old` back before reporting
//! 5. The package's temporary directory is removed.
//!
//! The swap runs to completion on a blocking thread even if the caller stops
//! waiting, so cancellation never leaves a half-replaced install.

use crate::core::UpdateError;
use crate::upgrade::backup::BackupManager;
use crate::upgrade::lock::{DEFAULT_LOCK_TIMEOUT, InstallLock};
use crate::upgrade::progress::{StageProgress, UpdateStatus};
use crate::upgrade::release::parse_tag;
use crate::upgrade::restart::{ProcessRestarter, RestartStrategy, Restarter};
use crate::upgrade::signature::SignatureVerifier;
use crate::upgrade::version_probe::{CommandVersionProbe, VersionProbe};
use crate::upgrade::{UpdateChannel, UpdatePackage};
use crate::utils::fs::{atomic_copy, is_executable, set_mode};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Mode given to a candidate executable extracted without any execute bit.
const EXECUTABLE_MODE: u32 = 0o755;

pub struct Installer {
    target: PathBuf,
    data_dir: PathBuf,
    current_version: String,
    channel: UpdateChannel,
    verifier: SignatureVerifier,
    probe: Arc<dyn VersionProbe>,
    restarter: Arc<dyn Restarter>,
    strategy: RestartStrategy,
    lock_timeout: Duration,
}

impl std::fmt::Debug for Installer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Installer")
            .field("target", &self.target)
            .field("data_dir", &self.data_dir)
            .field("current_version", &self.current_version)
            .field("channel", &self.channel)
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

impl Installer {
    /// Installer replacing `target`, locking through `data_dir`.
    ///
    /// Starts with the embedded signing key, a `--version` probe, the
    /// detected restart strategy and the default channel.
    pub fn new(
        target: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
        current_version: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            data_dir: data_dir.into(),
            current_version: current_version.into(),
            channel: UpdateChannel::default(),
            verifier: SignatureVerifier::embedded(),
            probe: Arc::new(CommandVersionProbe::new()),
            restarter: Arc::new(ProcessRestarter::new(None, CancellationToken::new())),
            strategy: RestartStrategy::detect(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_channel(mut self, channel: UpdateChannel) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_verifier(mut self, verifier: SignatureVerifier) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn VersionProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_restarter(
        mut self,
        restarter: Arc<dyn Restarter>,
        strategy: RestartStrategy,
    ) -> Self {
        self.restarter = restarter;
        self.strategy = strategy;
        self
    }

    /// How long to wait for another process holding the install lock.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub const fn channel(&self) -> UpdateChannel {
        self.channel
    }

    pub const fn strategy(&self) -> RestartStrategy {
        self.strategy
    }

    pub fn verifier(&self) -> &SignatureVerifier {
        &self.verifier
    }

    /// Install `pkg` over the target without restarting. Not cancellable.
    pub async fn install(&self, pkg: UpdatePackage) -> Result<(), UpdateError> {
        let token = CancellationToken::new();
        self.install_with_progress(pkg, &token, Arc::new(StageProgress::silent())).await
    }

    /// Install `pkg`, reporting `INSTALLING` and `INSTALL_COMPLETE`.
    ///
    /// `token` is observed until the install lock is held; the swap itself
    /// always runs to completion.
    pub async fn install_with_progress(
        &self,
        pkg: UpdatePackage,
        token: &CancellationToken,
        progress: Arc<StageProgress>,
    ) -> Result<(), UpdateError> {
        self.install_into(pkg, &self.target, token, &progress).await
    }

    /// Install `pkg`, then hand off to the new binary. Not cancellable.
    pub async fn apply_and_restart(&self, pkg: UpdatePackage) -> Result<(), UpdateError> {
        let token = CancellationToken::new();
        self.apply_and_restart_with_progress(pkg, &token, Arc::new(StageProgress::silent())).await
    }

    pub async fn apply_and_restart_with_progress(
        &self,
        pkg: UpdatePackage,
        token: &CancellationToken,
        progress: Arc<StageProgress>,
    ) -> Result<(), UpdateError> {
        self.install_into(pkg, &self.target, token, &progress).await?;
        info!(strategy = %self.strategy, target = %self.target.display(), "Restarting");
        self.restarter.restart(self.strategy, &self.target).await
    }

    /// Install `pkg` at `overseer_path`, the binary an external overseer
    /// watches and restarts on its own. No restart is issued here.
    pub async fn install_overseer_update(
        &self,
        pkg: UpdatePackage,
        overseer_path: &Path,
    ) -> Result<(), UpdateError> {
        if overseer_path.as_os_str().is_empty() {
            return Err(UpdateError::invalid_package("overseer path is empty"));
        }
        let progress = StageProgress::silent();
        self.install_into(pkg, overseer_path, &CancellationToken::new(), &progress).await
    }

    /// Put `<target>.old` back in place.
    pub async fn rollback(&self, token: &CancellationToken) -> Result<(), UpdateError> {
        let _lock = self.lock(token).await?;
        let backup = BackupManager::new(self.target.clone());
        let target = self.target.clone();
        tokio::task::spawn_blocking(move || backup.restore_backup())
            .await
            .map_err(|e| UpdateError::install("rollback", &target, e))?
            .map_err(|e| UpdateError::install("rollback", &target, format!("{e:#}")))?;
        info!(target = %self.target.display(), "Rolled back to previous binary");
        Ok(())
    }

    async fn install_into(
        &self,
        pkg: UpdatePackage,
        target: &Path,
        token: &CancellationToken,
        progress: &StageProgress,
    ) -> Result<(), UpdateError> {
        let Some(executable) = pkg.current_executable_path().map(Path::to_path_buf) else {
            return Err(UpdateError::invalid_package("package has no executable"));
        };
        match tokio::fs::metadata(&executable).await {
            Ok(meta) if meta.is_file() => {}
            _ => {
                return Err(UpdateError::invalid_package(format!(
                    "executable {} does not exist",
                    executable.display()
                )));
            }
        }

        progress.emit(UpdateStatus::Installing, 0);
        self.verifier.verify(&executable, self.channel).await?;
        progress.emit(UpdateStatus::Installing, 30);
        self.check_version(&executable).await?;
        progress.emit(UpdateStatus::Installing, 50);

        let mut others = Vec::with_capacity(pkg.other_files_paths().len());
        for path in pkg.other_files_paths() {
            let relative = pkg.relative_path(path).map(Path::to_path_buf).ok_or_else(|| {
                UpdateError::invalid_package(format!("{} is outside the package", path.display()))
            })?;
            others.push((path.clone(), relative));
        }

        let lock = self.lock(token).await?;
        info!(target = %target.display(), files = others.len() + 1, "Swapping binary");

        // The package moves into the blocking task so its directory outlives
        // the swap even if this future is dropped.
        let swap_target = target.to_path_buf();
        let pkg = tokio::task::spawn_blocking(move || {
            swap(&swap_target, &executable, &others).map(|()| pkg)
        })
        .await
        .map_err(|e| UpdateError::install("swap", target, e))??;
        drop(lock);

        progress.emit(UpdateStatus::Installing, 90);
        let temp_dir = pkg.temp_dir_path().to_path_buf();
        if let Err(e) = pkg.cleanup() {
            warn!(path = %temp_dir.display(), error = %e, "Failed to remove package directory");
        }

        progress.complete(UpdateStatus::InstallComplete);
        info!(target = %target.display(), "Install complete");
        Ok(())
    }

    async fn check_version(&self, executable: &Path) -> Result<(), UpdateError> {
        let candidate = self.probe.probe(executable).await;

        if self.channel == UpdateChannel::Develop {
            match candidate {
                Some(version) => debug!(%version, "Develop candidate version"),
                None => warn!(binary = %executable.display(), "Develop candidate has no version"),
            }
            return Ok(());
        }

        let running =
            parse_tag(&self.current_version).map_err(|e| UpdateError::InvalidVersion {
                version: self.current_version.clone(),
                reason: e.to_string(),
            })?;
        let Some(candidate) = candidate else {
            return Err(UpdateError::invalid_package(format!(
                "cannot determine version of {}",
                executable.display()
            )));
        };
        if candidate <= running {
            return Err(UpdateError::invalid_package(format!(
                "candidate version {candidate} is not newer than running {running}"
            )));
        }
        debug!(%candidate, %running, "Candidate version accepted");
        Ok(())
    }

    async fn lock(&self, token: &CancellationToken) -> Result<InstallLock, UpdateError> {
        InstallLock::acquire_with_timeout(&self.data_dir, token, self.lock_timeout).await
    }
}

/// Blocking swap with rollback. Not a cancellation point.
fn swap(
    target: &Path,
    executable: &Path,
    others: &[(PathBuf, PathBuf)],
) -> Result<(), UpdateError> {
    let backup = BackupManager::new(target.to_path_buf());
    let had_backup = backup
        .create_backup()
        .map_err(|e| UpdateError::install("backup", target, format!("{e:#}")))?;

    if let Err(err) = place_files(target, executable, others) {
        error!(target = %target.display(), error = %err, "Swap failed, restoring previous binary");
        if had_backup {
            if let Err(e) = backup.restore_backup() {
                error!(target = %target.display(), error = %format!("{e:#}"), "Restore failed");
            }
        } else if let Err(e) = fs::remove_file(target) {
            debug!(target = %target.display(), error = %e, "Nothing to remove after failed swap");
        }
        return Err(err);
    }
    Ok(())
}

fn place_files(
    target: &Path,
    executable: &Path,
    others: &[(PathBuf, PathBuf)],
) -> Result<(), UpdateError> {
    if !is_executable(executable).map_err(|e| UpdateError::install("stat", executable, e))? {
        set_mode(executable, EXECUTABLE_MODE)
            .map_err(|e| UpdateError::install("chmod", executable, e))?;
    }

    atomic_copy(executable, target).map_err(|e| UpdateError::install("copy", target, e))?;

    let install_dir = target.parent().unwrap_or_else(|| Path::new("."));
    for (source, relative) in others {
        let dest = install_dir.join(relative);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| UpdateError::install("mkdir", parent, e))?;
        }
        atomic_copy(source, &dest).map_err(|e| UpdateError::install("copy", &dest, e))?;
        debug!(dest = %dest.display(), "Placed auxiliary file");
    }
    Ok(())
}
