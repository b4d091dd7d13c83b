#[cfg(test)]
#[allow(clippy::module_inception)]
mod tests {
    use super::super::*;
    use crate::config::UpdaterConfig;
    use crate::core::UpdateError;
    use crate::test_utils::signing::TestSigner;
    use crate::test_utils::{
        FakeReleaseSource, FakeRestarter, FakeTransport, FakeVersionProbe, ZipEntry,
        init_test_logging, release, zip_bytes,
    };
    use semver::Version;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    const URL: &str =
        "https://github.com/dianlight/srat/releases/download/2025.6.1/srat_x86_64.zip";

    struct Host {
        _root: TempDir,
        data_dir: PathBuf,
        target: PathBuf,
        signer: TestSigner,
    }

    impl Host {
        fn new() -> Self {
            init_test_logging(None);
            let root = TempDir::new().unwrap();
            let data_dir = root.path().join("data");
            let target = root.path().join("bin").join("srat");
            std::fs::create_dir_all(target.parent().unwrap()).unwrap();
            std::fs::write(&target, b"running build 1.0.0").unwrap();
            Self {
                _root: root,
                data_dir,
                target,
                signer: TestSigner::generate(),
            }
        }

        /// Archive with `srat`, optionally its signature, and a data file.
        fn archive(&self, binary: &[u8], signed: bool) -> Vec<u8> {
            let mut entries = vec![
                ZipEntry::file("srat", binary, 0o755),
                ZipEntry::dir("share/", 0o755),
                ZipEntry::file("share/defaults.json", b"{}", 0o644),
            ];
            if signed {
                let signature = self.signer.sign(binary, "timestamp:0\tfile:srat");
                entries.push(ZipEntry::file("srat.minisig", signature.as_bytes(), 0o644));
            }
            zip_bytes(&entries)
        }

        fn service(&self, channel: UpdateChannel, transport: FakeTransport) -> UpdateService {
            let config = UpdaterConfig {
                update_channel: channel,
                auto_update: true,
                data_dir: self.data_dir.display().to_string(),
                ..UpdaterConfig::default()
            };
            let source = FakeReleaseSource::new(vec![
                release("2025.6.2-dev076", true, &["srat_x86_64.zip"]),
                release("2025.6.1", false, &["srat_x86_64.zip", "srat_aarch64.zip"]),
                release("2025.6.0", false, &["srat_x86_64.zip"]),
            ]);
            let resolver =
                ReleaseResolver::new(Arc::new(source), "1.0.0", "srat").with_arch("amd64");
            let fetcher = PackageFetcher::new(
                Arc::new(transport),
                ArchiveExtractor::new(&self.data_dir, "srat"),
            )
            .with_allowed_hosts(config.fetch.allowed_hosts.clone());
            let verifier =
                SignatureVerifier::with_public_key(&self.signer.public_key_text()).unwrap();
            let installer = Installer::new(&self.target, &self.data_dir, "1.0.0")
                .with_channel(channel)
                .with_verifier(verifier)
                .with_probe(Arc::new(FakeVersionProbe::new(Some(Version::new(2025, 6, 1)))))
                .with_restarter(Arc::new(FakeRestarter::default()), RestartStrategy::Supervisor);
            UpdateService::new(&config, resolver, fetcher, installer).unwrap()
        }

        /// Entries left in the data directory, ignoring the lock file.
        fn leftovers(&self) -> Vec<String> {
            let Ok(entries) = std::fs::read_dir(&self.data_dir) else {
                return Vec::new();
            };
            entries
                .filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|name| name != lock::LOCK_FILE_NAME)
                .collect()
        }
    }

    fn read(path: &Path) -> Vec<u8> {
        std::fs::read(path).unwrap()
    }

    #[tokio::test]
    async fn test_signed_release_is_installed_end_to_end() {
        let host = Host::new();
        let transport =
            FakeTransport::new().with_response(URL, 200, host.archive(b"new build 2025.6.1", true));
        let sink = Arc::new(BroadcastSink::new(256));
        let mut events = sink.subscribe();
        let service = host.service(UpdateChannel::Release, transport).with_sink(sink);

        let outcome = service.run_cycle(&CancellationToken::new()).await.unwrap();
        let UpdateOutcome::Installed(asset) = outcome else {
            panic!("expected an install, got {outcome:?}");
        };
        assert_eq!(asset.last_release, "2025.6.1");
        assert_eq!(asset.arch_asset.name, "srat_x86_64.zip");

        let bin_dir = host.target.parent().unwrap();
        assert_eq!(read(&host.target), b"new build 2025.6.1");
        assert_eq!(read(&bin_dir.join("srat.old")), b"running build 1.0.0");
        assert_eq!(read(&bin_dir.join("share/defaults.json")), b"{}");
        assert!(bin_dir.join("srat.minisig").exists());
        assert!(host.leftovers().is_empty(), "{:?}", host.leftovers());

        let order = [
            UpdateStatus::Checking,
            UpdateStatus::UpgradeAvailable,
            UpdateStatus::Downloading,
            UpdateStatus::DownloadComplete,
            UpdateStatus::Extracting,
            UpdateStatus::ExtractComplete,
            UpdateStatus::Installing,
            UpdateStatus::InstallComplete,
        ];
        let mut last: Option<(usize, u8)> = None;
        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            let index = order.iter().position(|s| *s == event.status).unwrap();
            if let Some((last_index, last_percent)) = last {
                assert!(index >= last_index, "{:?} after {:?}", event.status, order[last_index]);
                if index == last_index {
                    assert!(event.progress > last_percent);
                }
            }
            last = Some((index, event.progress));
            seen.push(event.status);
        }
        seen.dedup();
        assert_eq!(seen, order);
    }

    #[tokio::test]
    async fn test_unsigned_release_leaves_install_untouched() {
        let host = Host::new();
        let transport = FakeTransport::new().with_response(URL, 200, host.archive(b"evil", false));
        let service = host.service(UpdateChannel::Release, transport);

        let err = service.run_cycle(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, UpdateError::SignatureInvalid { .. }), "{err}");
        assert_eq!(read(&host.target), b"running build 1.0.0");
        assert!(!host.target.with_file_name("srat.old").exists());
        assert!(host.leftovers().is_empty(), "{:?}", host.leftovers());
    }

    #[tokio::test]
    async fn test_signature_for_other_content_is_rejected() {
        let host = Host::new();
        let mut entries = vec![ZipEntry::file("srat", b"swapped payload", 0o755)];
        let signature = host.signer.sign(b"genuine payload", "timestamp:0\tfile:srat");
        entries.push(ZipEntry::file("srat.minisig", signature.as_bytes(), 0o644));
        let transport = FakeTransport::new().with_response(URL, 200, zip_bytes(&entries));
        let service = host.service(UpdateChannel::Release, transport);

        let err = service.run_cycle(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, UpdateError::SignatureInvalid { .. }));
        assert_eq!(read(&host.target), b"running build 1.0.0");
    }

    #[tokio::test]
    async fn test_traversal_archive_is_rejected_and_cleaned() {
        let host = Host::new();
        let archive = zip_bytes(&[
            ZipEntry::file("srat", b"bin", 0o755),
            ZipEntry::file("share/../../../../escape.sh", b"#!/bin/sh", 0o755),
        ]);
        let transport = FakeTransport::new().with_response(URL, 200, archive);
        let service = host.service(UpdateChannel::Release, transport);

        let err = service.run_cycle(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, UpdateError::ExtractionFailed { .. }), "{err}");
        assert!(err.to_string().contains("invalid file path in zip"));
        assert!(host.leftovers().is_empty(), "{:?}", host.leftovers());
        assert_eq!(read(&host.target), b"running build 1.0.0");
    }

    #[tokio::test]
    async fn test_prerelease_channel_picks_prerelease() {
        let host = Host::new();
        let service = host.service(UpdateChannel::Prerelease, FakeTransport::new());

        let outcome = service.check_now().await.unwrap();
        let UpdateOutcome::Available(asset) = outcome else {
            panic!("expected an available update, got {outcome:?}");
        };
        assert_eq!(asset.last_release, "2025.6.2-dev076");
    }

    #[tokio::test]
    async fn test_develop_drop_in_unsigned_is_installed() {
        let host = Host::new();
        let service = host.service(UpdateChannel::Develop, FakeTransport::new());
        std::fs::create_dir_all(&host.data_dir).unwrap();
        let drop_in = service.drop_in_path();
        std::fs::write(&drop_in, b"local develop build").unwrap();

        // Develop never asks the release API.
        let outcome = service.check_now().await.unwrap();
        assert!(matches!(outcome, UpdateOutcome::UpToDate(_)));

        service.apply_local(&drop_in, &CancellationToken::new()).await.unwrap();
        assert_eq!(read(&host.target), b"local develop build");

        service.rollback(&CancellationToken::new()).await.unwrap();
        assert_eq!(read(&host.target), b"running build 1.0.0");
    }
}
