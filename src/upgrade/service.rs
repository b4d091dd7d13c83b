//! The update pipeline behind a single guard.
//!
//! [`UpdateService`] owns the resolver, fetcher and installer and runs at most
//! one attempt at a time. Every entry point takes the guard with `try_lock`;
//! a second caller gets [`UpdateError::Busy`] instead of interleaving with the
//! attempt in flight.

use crate::config::UpdaterConfig;
use crate::core::UpdateError;
use crate::upgrade::cache::ReleaseCache;
use crate::upgrade::extractor::ArchiveExtractor;
use crate::upgrade::fetcher::{HttpTransport, PackageFetcher};
use crate::upgrade::installer::Installer;
use crate::upgrade::progress::{NullSink, ProgressSink, StageProgress, UpdateStatus};
use crate::upgrade::release::{GitHubReleaseSource, ReleaseResolver};
use crate::upgrade::restart::{ProcessRestarter, RestartStrategy};
use crate::upgrade::signature::SignatureVerifier;
use crate::upgrade::{ReleaseAsset, UpdateChannel, UpdatePackage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Result of one attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Nothing to do, with the reason.
    UpToDate(String),
    /// A newer release exists and was left alone.
    Available(ReleaseAsset),
    /// A newer release was installed.
    Installed(ReleaseAsset),
}

pub struct UpdateService {
    channel: UpdateChannel,
    auto_update: bool,
    data_dir: PathBuf,
    resolver: ReleaseResolver,
    fetcher: PackageFetcher,
    installer: Installer,
    sink: Arc<dyn ProgressSink>,
    guard: Mutex<()>,
}

impl std::fmt::Debug for UpdateService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateService")
            .field("channel", &self.channel)
            .field("auto_update", &self.auto_update)
            .field("data_dir", &self.data_dir)
            .field("installer", &self.installer)
            .finish_non_exhaustive()
    }
}

impl UpdateService {
    pub fn new(
        config: &UpdaterConfig,
        resolver: ReleaseResolver,
        fetcher: PackageFetcher,
        installer: Installer,
    ) -> Result<Self, UpdateError> {
        Ok(Self {
            channel: config.update_channel,
            auto_update: config.auto_update,
            data_dir: config.data_dir_path()?,
            resolver,
            fetcher,
            installer,
            sink: Arc::new(NullSink),
            guard: Mutex::new(()),
        })
    }

    /// Production wiring for the running executable.
    ///
    /// `shutdown` is cancelled when a supervised daemon should exit so its
    /// supervisor respawns it from the new binary.
    pub fn from_config(
        config: &UpdaterConfig,
        shutdown: CancellationToken,
    ) -> Result<Self, UpdateError> {
        let executable = std::env::current_exe().map_err(|e| UpdateError::Config {
            message: format!("cannot locate running executable: {e}"),
        })?;
        let executable_name = executable
            .file_name()
            .map(ToOwned::to_owned)
            .ok_or_else(|| UpdateError::Config {
                message: format!("executable path {} has no file name", executable.display()),
            })?;
        let data_dir = config.data_dir_path()?;

        let source = GitHubReleaseSource::new(&config.release)?;
        let resolver = ReleaseResolver::new(
            Arc::new(source),
            config.running_version(),
            config.release.artifact_prefix.clone(),
        )
        .with_cache(ReleaseCache::new(config.release.cache_ttl()));

        let transport =
            HttpTransport::new(Duration::from_secs(config.fetch.connect_timeout_secs))?;
        let fetcher = PackageFetcher::new(
            Arc::new(transport),
            ArchiveExtractor::new(&data_dir, executable_name),
        )
        .with_allowed_hosts(config.fetch.allowed_hosts.clone());

        let restarter = ProcessRestarter::new(config.restart.service_dir.clone(), shutdown);
        let installer = Installer::new(executable, &data_dir, config.running_version())
            .with_channel(config.update_channel)
            .with_verifier(SignatureVerifier::embedded())
            .with_restarter(Arc::new(restarter), RestartStrategy::detect());

        Self::new(config, resolver, fetcher, installer)
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub const fn channel(&self) -> UpdateChannel {
        self.channel
    }

    pub const fn auto_update(&self) -> bool {
        self.auto_update
    }

    pub fn installer(&self) -> &Installer {
        &self.installer
    }

    /// Where develop builds are dropped: `<data_dir>/<executable name>`.
    pub fn drop_in_path(&self) -> PathBuf {
        self.data_dir.join(self.fetcher.extractor().executable_name())
    }

    /// Query the release API now, bypassing the listing cache.
    pub async fn check_now(&self) -> Result<UpdateOutcome, UpdateError> {
        let _guard = self.guard.try_lock().map_err(|_| UpdateError::Busy)?;
        self.resolver.invalidate_cache();
        self.resolve(&self.progress()).await
    }

    /// Resolve and install regardless of `auto_update`.
    pub async fn update_now(
        &self,
        token: &CancellationToken,
        restart: bool,
    ) -> Result<UpdateOutcome, UpdateError> {
        let _guard = self.guard.try_lock().map_err(|_| UpdateError::Busy)?;
        self.resolver.invalidate_cache();
        self.attempt(token, true, restart).await
    }

    /// One scheduled cycle: resolve, then install and restart when
    /// `auto_update` is on.
    pub async fn run_cycle(&self, token: &CancellationToken) -> Result<UpdateOutcome, UpdateError> {
        let _guard = self.guard.try_lock().map_err(|_| UpdateError::Busy)?;
        self.attempt(token, self.auto_update, true).await
    }

    /// Install a local develop build and restart into it.
    pub async fn apply_local(
        &self,
        binary: &Path,
        token: &CancellationToken,
    ) -> Result<(), UpdateError> {
        let _guard = self.guard.try_lock().map_err(|_| UpdateError::Busy)?;
        let progress = self.progress();
        progress.emit(UpdateStatus::UpgradeAvailable, 100);

        let result = async {
            let data_dir = self.data_dir.clone();
            let source = binary.to_path_buf();
            let pkg = tokio::task::spawn_blocking(move || {
                UpdatePackage::from_local_binary(&data_dir, &source)
            })
            .await
            .map_err(|e| UpdateError::invalid_package(e.to_string()))??;
            if token.is_cancelled() {
                return Err(UpdateError::Cancelled);
            }
            self.installer.apply_and_restart_with_progress(pkg, token, progress.clone()).await
        }
        .await;

        if let Err(e) = &result {
            error!(binary = %binary.display(), error = %e, "Local update failed");
            progress.fail(e);
        }
        result
    }

    /// Roll back to `<target>.old`.
    pub async fn rollback(&self, token: &CancellationToken) -> Result<(), UpdateError> {
        let _guard = self.guard.try_lock().map_err(|_| UpdateError::Busy)?;
        self.installer.rollback(token).await
    }

    fn progress(&self) -> Arc<StageProgress> {
        Arc::new(StageProgress::new(self.sink.clone()))
    }

    /// Folds the benign "no update" error into [`UpdateOutcome::UpToDate`].
    async fn resolve(&self, progress: &StageProgress) -> Result<UpdateOutcome, UpdateError> {
        progress.emit(UpdateStatus::Checking, 0);
        match self.resolver.resolve(self.channel).await {
            Ok(asset) => {
                info!(
                    tag = %asset.last_release,
                    asset = %asset.arch_asset.name,
                    "Update available"
                );
                progress.set_release(asset.last_release.clone());
                progress.emit(UpdateStatus::UpgradeAvailable, 100);
                Ok(UpdateOutcome::Available(asset))
            }
            Err(UpdateError::NoUpdateAvailable { reason }) => {
                info!(channel = %self.channel, %reason, "No update");
                progress.emit(UpdateStatus::NoUpgrade, 100);
                Ok(UpdateOutcome::UpToDate(reason))
            }
            Err(e) => {
                progress.fail(&e);
                Err(e)
            }
        }
    }

    async fn attempt(
        &self,
        token: &CancellationToken,
        install: bool,
        restart: bool,
    ) -> Result<UpdateOutcome, UpdateError> {
        let progress = self.progress();
        let asset = match self.resolve(&progress).await? {
            UpdateOutcome::Available(asset) => asset,
            outcome => return Ok(outcome),
        };
        if !install {
            return Ok(UpdateOutcome::Available(asset));
        }

        let result = async {
            let pkg =
                self.fetcher.fetch_with_progress(&asset.arch_asset, token, progress.clone()).await?;
            if token.is_cancelled() {
                return Err(UpdateError::Cancelled);
            }
            if restart {
                self.installer.apply_and_restart_with_progress(pkg, token, progress.clone()).await
            } else {
                self.installer.install_with_progress(pkg, token, progress.clone()).await
            }
        }
        .await;

        match result {
            Ok(()) => Ok(UpdateOutcome::Installed(asset)),
            Err(e) => {
                warn!(tag = %asset.last_release, kind = e.kind(), error = %e, "Update failed");
                progress.fail(&e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        FakeReleaseSource, FakeRestarter, FakeTransport, FakeVersionProbe, RecordingSink,
        ZipEntry, release, zip_bytes,
    };
    use semver::Version;
    use tempfile::TempDir;

    const URL: &str = "https://github.com/dianlight/srat/releases/download/2.0.0/srat_x86_64.zip";

    struct Harness {
        _root: TempDir,
        target: PathBuf,
        data_dir: PathBuf,
        sink: Arc<RecordingSink>,
        restarter: Arc<FakeRestarter>,
        service: UpdateService,
    }

    fn harness(channel: UpdateChannel, auto_update: bool, transport: FakeTransport) -> Harness {
        let root = TempDir::new().unwrap();
        let data_dir = root.path().join("data");
        let target = root.path().join("bin").join("srat");
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        std::fs::write(&target, b"old binary").unwrap();

        let config = UpdaterConfig {
            update_channel: channel,
            auto_update,
            data_dir: data_dir.display().to_string(),
            ..UpdaterConfig::default()
        };
        let source = FakeReleaseSource::new(vec![release("2.0.0", false, &["srat_x86_64.zip"])]);
        let resolver =
            ReleaseResolver::new(Arc::new(source), "1.0.0", "srat").with_arch("x86_64");
        let fetcher =
            PackageFetcher::new(Arc::new(transport), ArchiveExtractor::new(&data_dir, "srat"));
        let restarter = Arc::new(FakeRestarter::default());
        // Develop policy lets the unsigned test archive through.
        let installer = Installer::new(&target, &data_dir, "1.0.0")
            .with_channel(UpdateChannel::Develop)
            .with_probe(Arc::new(FakeVersionProbe::new(Some(Version::new(2, 0, 0)))))
            .with_restarter(restarter.clone(), RestartStrategy::ReExec);

        let sink = Arc::new(RecordingSink::default());
        let service = UpdateService::new(&config, resolver, fetcher, installer)
            .unwrap()
            .with_sink(sink.clone());
        Harness {
            _root: root,
            target,
            data_dir,
            sink,
            restarter,
            service,
        }
    }

    fn good_transport() -> FakeTransport {
        let archive = zip_bytes(&[ZipEntry::file("srat", b"new binary", 0o755)]);
        FakeTransport::new().with_response(URL, 200, archive)
    }

    #[tokio::test]
    async fn test_cycle_without_auto_update_only_reports() {
        let h = harness(UpdateChannel::Release, false, good_transport());
        let outcome = h.service.run_cycle(&CancellationToken::new()).await.unwrap();

        assert!(matches!(outcome, UpdateOutcome::Available(ref a) if a.last_release == "2.0.0"));
        assert_eq!(std::fs::read(&h.target).unwrap(), b"old binary");
        assert_eq!(h.sink.statuses(), vec![UpdateStatus::Checking, UpdateStatus::UpgradeAvailable]);
    }

    #[tokio::test]
    async fn test_cycle_with_auto_update_installs_and_restarts() {
        let h = harness(UpdateChannel::Release, true, good_transport());
        let outcome = h.service.run_cycle(&CancellationToken::new()).await.unwrap();

        assert!(matches!(outcome, UpdateOutcome::Installed(_)));
        assert_eq!(std::fs::read(&h.target).unwrap(), b"new binary");
        assert_eq!(h.restarter.calls().len(), 1);

        let statuses = h.sink.statuses();
        for expected in [
            UpdateStatus::Checking,
            UpdateStatus::UpgradeAvailable,
            UpdateStatus::Downloading,
            UpdateStatus::DownloadComplete,
            UpdateStatus::Extracting,
            UpdateStatus::ExtractComplete,
            UpdateStatus::Installing,
            UpdateStatus::InstallComplete,
        ] {
            assert!(statuses.contains(&expected), "missing {expected}: {statuses:?}");
        }
        let values = h.sink.values();
        assert!(values.iter().skip(1).all(|v| v.last_release.as_deref() == Some("2.0.0")));
    }

    #[tokio::test]
    async fn test_update_now_without_restart() {
        let h = harness(UpdateChannel::Release, false, good_transport());
        let outcome = h.service.update_now(&CancellationToken::new(), false).await.unwrap();

        assert!(matches!(outcome, UpdateOutcome::Installed(_)));
        assert_eq!(std::fs::read(&h.target).unwrap(), b"new binary");
        assert!(h.restarter.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_download_broadcasts_failed() {
        let transport = FakeTransport::new().with_response(URL, 404, Vec::new());
        let h = harness(UpdateChannel::Release, true, transport);

        let err = h.service.run_cycle(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, UpdateError::DownloadFailed { status: Some(404), .. }));
        let last = h.sink.values().pop().unwrap();
        assert_eq!(last.status, UpdateStatus::Failed);
        assert!(last.error_message.unwrap().starts_with("download_failed"));
        assert_eq!(std::fs::read(&h.target).unwrap(), b"old binary");
    }

    #[tokio::test]
    async fn test_disabled_channel_is_up_to_date() {
        let h = harness(UpdateChannel::None, true, good_transport());
        let outcome = h.service.check_now().await.unwrap();

        assert!(matches!(outcome, UpdateOutcome::UpToDate(_)));
        assert_eq!(h.sink.statuses(), vec![UpdateStatus::Checking, UpdateStatus::NoUpgrade]);
    }

    #[tokio::test]
    async fn test_concurrent_attempt_is_busy() {
        let h = harness(UpdateChannel::Release, false, good_transport());
        let _held = h.service.guard.try_lock().unwrap();

        let err = h.service.check_now().await.unwrap_err();
        assert_eq!(err, UpdateError::Busy);
        let err = h.service.run_cycle(&CancellationToken::new()).await.unwrap_err();
        assert_eq!(err, UpdateError::Busy);
    }

    #[tokio::test]
    async fn test_cancelled_token_aborts_download() {
        let h = harness(UpdateChannel::Release, true, good_transport());
        let token = CancellationToken::new();
        token.cancel();

        let err = h.service.run_cycle(&token).await.unwrap_err();
        assert_eq!(err, UpdateError::Cancelled);
        assert_eq!(std::fs::read(&h.target).unwrap(), b"old binary");
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_install_lock() {
        let h = harness(UpdateChannel::Release, true, good_transport());
        std::fs::create_dir_all(&h.data_dir).unwrap();
        let other_daemon = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(h.data_dir.join(".update.lock"))
            .unwrap();
        fs4::fs_std::FileExt::lock_exclusive(&other_daemon).unwrap();

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            canceller.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(3),
            h.service.update_now(&token, false),
        )
        .await
        .expect("update must stop waiting for the lock once cancelled");
        assert_eq!(result.unwrap_err(), UpdateError::Cancelled);
        assert_eq!(std::fs::read(&h.target).unwrap(), b"old binary");
        assert_eq!(h.sink.statuses().last(), Some(&UpdateStatus::Failed));
    }

    #[tokio::test]
    async fn test_apply_local_installs_drop_in() {
        let h = harness(UpdateChannel::Develop, false, FakeTransport::new());
        let drop_in = h.service.drop_in_path();
        std::fs::create_dir_all(drop_in.parent().unwrap()).unwrap();
        std::fs::write(&drop_in, b"local build").unwrap();

        h.service.apply_local(&drop_in, &CancellationToken::new()).await.unwrap();
        assert_eq!(std::fs::read(&h.target).unwrap(), b"local build");
        assert!(drop_in.exists());
        assert_eq!(h.restarter.calls().len(), 1);
    }
}
