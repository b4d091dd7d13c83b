//! Behaviour of the `srat-updater` binary.

use crate::common::path_str;
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn updater(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("srat-updater").unwrap();
    cmd.env("HOME", home)
        .env("NO_COLOR", "1")
        .env("SRAT_NO_PROGRESS", "1")
        .env_remove("RUST_LOG")
        .env_remove("SRAT_UPDATER_CONFIG");
    cmd
}

/// Config pinned to the `none` channel so nothing reaches the network.
fn offline_config(dir: &Path) -> String {
    let path = dir.join("updater.toml");
    let content = format!(
        "update_channel = \"none\"\ndata_dir = \"{}\"\n",
        path_str(&dir.join("data"))
    );
    std::fs::write(&path, content).unwrap();
    path_str(&path)
}

#[test]
fn test_help_lists_commands() {
    let temp = TempDir::new().unwrap();
    updater(temp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("verify"))
        .stdout(predicate::str::contains("rollback"));
}

#[test]
fn test_check_on_disabled_channel_is_up_to_date() {
    let temp = TempDir::new().unwrap();
    let config = offline_config(temp.path());

    updater(temp.path())
        .args(["--quiet", "--config", &config, "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("latest version"))
        .stdout(predicate::str::contains("release checks disabled for the none channel"));
}

#[test]
fn test_invalid_config_is_reported() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("updater.toml");
    std::fs::write(&config, "[release]\nper_page = 0\n").unwrap();

    updater(temp.path())
        .args(["--quiet", "--config", &path_str(&config), "check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("per_page"));
}

#[test]
fn test_verify_rejects_unsigned_binary_on_release() {
    let temp = TempDir::new().unwrap();
    let binary = temp.path().join("srat");
    std::fs::write(&binary, b"unsigned build").unwrap();

    updater(temp.path())
        .args(["--quiet", "verify", &path_str(&binary), "--channel", "release"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Signature invalid"))
        .stderr(predicate::str::contains("srat.minisig"));
}

#[test]
fn test_verify_accepts_unsigned_binary_on_develop() {
    let temp = TempDir::new().unwrap();
    let binary = temp.path().join("srat");
    std::fs::write(&binary, b"develop build").unwrap();

    updater(temp.path())
        .args(["--quiet", "verify", &path_str(&binary), "--channel", "develop"])
        .assert()
        .success()
        .stdout(predicate::str::contains("accepted for the develop channel"));
}

#[test]
fn test_verify_rejects_unknown_channel() {
    let temp = TempDir::new().unwrap();
    updater(temp.path())
        .args(["verify", "srat", "--channel", "nightly"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown update channel"));
}

#[test]
fn test_rollback_without_backup_fails() {
    let temp = TempDir::new().unwrap();
    let config = offline_config(temp.path());

    updater(temp.path())
        .args(["--quiet", "--config", &config, "rollback"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("No backup found"));
}
