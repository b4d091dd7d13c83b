//! Shared fixture: a fake host with an installed binary and a data directory.

use semver::Version;
use srat_updater::config::UpdaterConfig;
use srat_updater::test_utils::signing::TestSigner;
use srat_updater::test_utils::{
    FakeReleaseSource, FakeRestarter, FakeTransport, FakeVersionProbe, RecordingSink, ZipEntry,
    init_test_logging, zip_bytes,
};
use srat_updater::upgrade::{
    ArchiveExtractor, Installer, PackageFetcher, Release, ReleaseResolver, RestartStrategy,
    SignatureVerifier, UpdateChannel, UpdateService,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

pub const INSTALLED: &[u8] = b"srat 2025.5.0";

pub struct TestHost {
    _root: TempDir,
    pub bin_dir: PathBuf,
    pub data_dir: PathBuf,
    pub target: PathBuf,
    pub signer: TestSigner,
    pub sink: Arc<RecordingSink>,
    pub restarter: Arc<FakeRestarter>,
}

impl TestHost {
    pub fn new() -> Self {
        init_test_logging(None);
        let root = TempDir::new().unwrap();
        let bin_dir = root.path().join("usr/local/bin");
        let data_dir = root.path().join("var/lib/srat/update");
        std::fs::create_dir_all(&bin_dir).unwrap();
        let target = bin_dir.join("srat");
        std::fs::write(&target, INSTALLED).unwrap();

        Self {
            _root: root,
            bin_dir,
            data_dir,
            target,
            signer: TestSigner::generate(),
            sink: Arc::new(RecordingSink::default()),
            restarter: Arc::new(FakeRestarter::default()),
        }
    }

    /// Zip bundle holding `srat`, its signature and a data file.
    pub fn signed_bundle(&self, binary: &[u8]) -> Vec<u8> {
        let signature = self.signer.sign(binary, "timestamp:0\tfile:srat");
        zip_bytes(&[
            ZipEntry::file("srat", binary, 0o755),
            ZipEntry::file("srat.minisig", signature.as_bytes(), 0o644),
            ZipEntry::dir("static/", 0o755),
            ZipEntry::file("static/index.html", b"<html></html>", 0o644),
        ])
    }

    pub fn installer(&self, channel: UpdateChannel, probed: Option<Version>) -> Installer {
        let verifier = SignatureVerifier::with_public_key(&self.signer.public_key_text()).unwrap();
        Installer::new(&self.target, &self.data_dir, "2025.5.0")
            .with_channel(channel)
            .with_verifier(verifier)
            .with_probe(Arc::new(FakeVersionProbe::new(probed)))
            .with_restarter(self.restarter.clone(), RestartStrategy::ReExec)
    }

    pub fn service(
        &self,
        channel: UpdateChannel,
        releases: Option<Vec<Release>>,
        transport: FakeTransport,
    ) -> UpdateService {
        let config = UpdaterConfig {
            update_channel: channel,
            auto_update: true,
            data_dir: self.data_dir.display().to_string(),
            ..UpdaterConfig::default()
        };
        let source = match releases {
            Some(releases) => FakeReleaseSource::new(releases),
            None => FakeReleaseSource::failing(),
        };
        let resolver =
            ReleaseResolver::new(Arc::new(source), "2025.5.0", "srat").with_arch("x86_64");
        let fetcher = PackageFetcher::new(
            Arc::new(transport),
            ArchiveExtractor::new(&self.data_dir, "srat"),
        )
        .with_allowed_hosts(config.fetch.allowed_hosts.clone());
        let installer = self.installer(channel, Some(Version::new(2025, 6, 1)));

        UpdateService::new(&config, resolver, fetcher, installer)
            .unwrap()
            .with_sink(self.sink.clone())
    }

    pub fn read(&self, relative: &str) -> Vec<u8> {
        std::fs::read(self.bin_dir.join(relative)).unwrap()
    }

    /// Data directory entries other than the install lock.
    pub fn data_leftovers(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.data_dir) else {
            return Vec::new();
        };
        entries
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name != ".update.lock")
            .collect()
    }
}

pub fn path_str(path: &Path) -> String {
    path.display().to_string()
}
