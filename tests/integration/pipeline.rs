//! Full update attempts against in-memory release and asset servers.

use crate::common::{INSTALLED, TestHost};
use semver::Version;
use sha2::{Digest, Sha256};
use srat_updater::core::UpdateError;
use srat_updater::test_utils::{FakeTransport, release};
use srat_updater::upgrade::{
    Release, RemoteAsset, RestartStrategy, UpdateChannel, UpdateOutcome, UpdatePackage,
    UpdateStatus,
};
use tokio_util::sync::CancellationToken;

const ASSET_URL: &str =
    "https://github.com/dianlight/srat/releases/download/2025.6.1/srat_x86_64.zip";

fn published() -> Vec<Release> {
    vec![
        release("2025.6.2-dev003", true, &["srat_x86_64.zip"]),
        release("2025.6.1", false, &["srat_x86_64.zip", "srat_aarch64.zip"]),
        release("2025.5.0", false, &["srat_x86_64.zip"]),
    ]
}

fn with_digest(body: &[u8], digest: String) -> Vec<Release> {
    vec![Release {
        tag_name: "2025.6.1".to_string(),
        prerelease: false,
        draft: false,
        assets: vec![RemoteAsset {
            name: "srat_x86_64.zip".to_string(),
            browser_download_url: ASSET_URL.to_string(),
            size: body.len() as u64,
            digest: Some(digest),
        }],
    }]
}

#[tokio::test]
async fn test_signed_release_is_installed_and_restarted() {
    let host = TestHost::new();
    let bundle = host.signed_bundle(b"srat 2025.6.1");
    let transport = FakeTransport::new().with_response(ASSET_URL, 200, bundle);
    let service = host.service(UpdateChannel::Release, Some(published()), transport);

    let outcome = service.run_cycle(&CancellationToken::new()).await.unwrap();
    let UpdateOutcome::Installed(asset) = outcome else {
        panic!("expected an install, got {outcome:?}");
    };
    assert_eq!(asset.last_release, "2025.6.1");

    assert_eq!(host.read("srat"), b"srat 2025.6.1");
    assert_eq!(host.read("srat.old"), INSTALLED);
    assert_eq!(host.read("static/index.html"), b"<html></html>");
    assert!(host.data_leftovers().is_empty(), "{:?}", host.data_leftovers());

    assert_eq!(host.restarter.calls(), vec![(RestartStrategy::ReExec, host.target.clone())]);
    assert_eq!(host.sink.statuses().last(), Some(&UpdateStatus::InstallComplete));
    assert!(host.sink.values().iter().all(|v| v.error_message.is_none()));
}

#[tokio::test]
async fn test_matching_published_digest_is_accepted() {
    let host = TestHost::new();
    let bundle = host.signed_bundle(b"srat 2025.6.1");
    let digest = format!("sha256:{}", hex::encode(Sha256::digest(&bundle)));
    let releases = with_digest(&bundle, digest);
    let transport = FakeTransport::new().with_response(ASSET_URL, 200, bundle);
    let service = host.service(UpdateChannel::Release, Some(releases), transport);

    let outcome = service.update_now(&CancellationToken::new(), false).await.unwrap();
    assert!(matches!(outcome, UpdateOutcome::Installed(_)));
    assert_eq!(host.read("srat"), b"srat 2025.6.1");
}

#[tokio::test]
async fn test_published_digest_mismatch_aborts_before_extraction() {
    let host = TestHost::new();
    let bundle = host.signed_bundle(b"srat 2025.6.1");
    let releases = with_digest(&bundle, format!("sha256:{}", "00".repeat(32)));
    let transport = FakeTransport::new().with_response(ASSET_URL, 200, bundle);
    let service = host.service(UpdateChannel::Release, Some(releases), transport);

    let err = service.run_cycle(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, UpdateError::DownloadFailed { .. }), "{err}");
    assert_eq!(host.read("srat"), INSTALLED);
    assert!(host.data_leftovers().is_empty(), "{:?}", host.data_leftovers());

    let statuses = host.sink.statuses();
    assert!(!statuses.contains(&UpdateStatus::Extracting));
    assert_eq!(statuses.last(), Some(&UpdateStatus::Failed));
    assert!(host.restarter.calls().is_empty());
}

#[tokio::test]
async fn test_release_api_offline_is_not_a_failure() {
    let host = TestHost::new();
    let transport = FakeTransport::new();
    let calls = transport.calls();
    let service = host.service(UpdateChannel::Release, None, transport);

    let outcome = service.run_cycle(&CancellationToken::new()).await.unwrap();
    assert!(matches!(outcome, UpdateOutcome::UpToDate(_)));
    assert_eq!(host.sink.statuses(), vec![UpdateStatus::Checking, UpdateStatus::NoUpgrade]);
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_only_older_releases_means_up_to_date() {
    let host = TestHost::new();
    let releases = vec![
        release("2025.5.0", false, &["srat_x86_64.zip"]),
        release("2025.4.2", false, &["srat_x86_64.zip"]),
    ];
    let service = host.service(UpdateChannel::Release, Some(releases), FakeTransport::new());

    let outcome = service.check_now().await.unwrap();
    assert!(matches!(outcome, UpdateOutcome::UpToDate(_)), "{outcome:?}");
}

#[tokio::test]
async fn test_removed_asset_reports_http_status() {
    let host = TestHost::new();
    let service = host.service(UpdateChannel::Release, Some(published()), FakeTransport::new());

    let err = service.update_now(&CancellationToken::new(), true).await.unwrap_err();
    assert!(
        matches!(err, UpdateError::DownloadFailed { status: Some(404), .. }),
        "unexpected error: {err}"
    );
    let failure = host.sink.values().into_iter().last().unwrap();
    assert_eq!(failure.status, UpdateStatus::Failed);
    assert!(failure.error_message.is_some());
    assert_eq!(host.read("srat"), INSTALLED);
}

#[tokio::test]
async fn test_cancelled_attempt_installs_nothing() {
    let host = TestHost::new();
    let bundle = host.signed_bundle(b"srat 2025.6.1");
    let transport = FakeTransport::new().with_response(ASSET_URL, 200, bundle);
    let service = host.service(UpdateChannel::Release, Some(published()), transport);

    let token = CancellationToken::new();
    token.cancel();
    let err = service.update_now(&token, true).await.unwrap_err();
    assert_eq!(err, UpdateError::Cancelled);
    assert_eq!(host.read("srat"), INSTALLED);
    assert!(!host.bin_dir.join("srat.old").exists());
}

#[tokio::test]
async fn test_install_without_restart() {
    let host = TestHost::new();
    let bundle = host.signed_bundle(b"srat 2025.6.1");
    let transport = FakeTransport::new().with_response(ASSET_URL, 200, bundle);
    let service = host.service(UpdateChannel::Release, Some(published()), transport);

    service.update_now(&CancellationToken::new(), false).await.unwrap();
    assert_eq!(host.read("srat"), b"srat 2025.6.1");
    assert!(host.restarter.calls().is_empty());

    service.rollback(&CancellationToken::new()).await.unwrap();
    assert_eq!(host.read("srat"), INSTALLED);
}

#[tokio::test]
async fn test_overseer_update_replaces_watched_binary_only() {
    let host = TestHost::new();
    let build = host.bin_dir.join("build").join("srat");
    std::fs::create_dir_all(build.parent().unwrap()).unwrap();
    std::fs::write(&build, b"srat develop build").unwrap();
    let overseer = host.bin_dir.join("overseer").join("srat");
    std::fs::create_dir_all(overseer.parent().unwrap()).unwrap();
    std::fs::write(&overseer, b"srat watched").unwrap();

    let installer = host.installer(UpdateChannel::Develop, Some(Version::new(2025, 6, 3)));
    let pkg = UpdatePackage::from_local_binary(&host.data_dir, &build).unwrap();
    installer.install_overseer_update(pkg, &overseer).await.unwrap();

    assert_eq!(std::fs::read(&overseer).unwrap(), b"srat develop build");
    assert_eq!(host.read("srat"), INSTALLED);
    assert!(host.restarter.calls().is_empty());
}
