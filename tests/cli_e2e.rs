//! End-to-end CLI tests for the blockdrive binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Binary command isolated from the caller's config, state and endpoint.
fn blockdrive(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("blockdrive").unwrap();
    cmd.env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join("config"))
        .env_remove("BLOCKDRIVE_ENDPOINT")
        .env_remove("BLOCKDRIVE_TOKEN")
        .env_remove("RUST_LOG")
        .arg("--state-dir")
        .arg(home.path().join("state"));
    cmd
}

#[test]
fn test_binary_help_displays_usage() {
    let home = TempDir::new().unwrap();
    blockdrive(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("NODE:LOCATION:PATH"))
        .stdout(predicate::str::contains("download"));
}

#[test]
fn test_binary_version_displays_version() {
    let home = TempDir::new().unwrap();
    blockdrive(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("blockdrive"));
}

#[test]
fn test_binary_without_subcommand_fails() {
    let home = TempDir::new().unwrap();
    blockdrive(&home).assert().failure();
}

#[test]
fn test_binary_invalid_flag_returns_error() {
    let home = TempDir::new().unwrap();
    blockdrive(&home)
        .args(["records", "download", "--invalid-flag"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_records_on_empty_state_dir() {
    let home = TempDir::new().unwrap();
    blockdrive(&home)
        .args(["records", "download", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
    assert!(home.path().join("state/transfers.db").exists());
}

#[test]
fn test_records_rejects_unknown_kind() {
    let home = TempDir::new().unwrap();
    blockdrive(&home)
        .args(["records", "sideways"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid transfer kind"));
}

#[test]
fn test_clear_records_succeeds_when_empty() {
    let home = TempDir::new().unwrap();
    blockdrive(&home)
        .args(["-q", "clear-records", "copy"])
        .assert()
        .success();
}

#[test]
fn test_prefs_set_and_show() {
    let home = TempDir::new().unwrap();
    let downloads = home.path().join("dl");
    std::fs::create_dir(&downloads).unwrap();

    blockdrive(&home)
        .arg("prefs")
        .arg("--download-dir")
        .arg(&downloads)
        .args(["--threads", "8"])
        .assert()
        .success()
        .stdout(predicate::str::contains("download_threads = 8"));

    blockdrive(&home)
        .arg("prefs")
        .assert()
        .success()
        .stdout(predicate::str::contains(downloads.display().to_string()))
        .stdout(predicate::str::contains("download_threads = 8"));
}

#[test]
fn test_prefs_rejects_missing_download_dir() {
    let home = TempDir::new().unwrap();
    blockdrive(&home)
        .arg("prefs")
        .arg("--download-dir")
        .arg(home.path().join("does-not-exist"))
        .assert()
        .failure();
}

#[test]
fn test_download_threads_out_of_range_rejected() {
    let home = TempDir::new().unwrap();
    blockdrive(&home)
        .args(["download", "n:l:/a", "--threads", "65"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("65"));
}

#[test]
fn test_remote_command_without_endpoint_fails() {
    let home = TempDir::new().unwrap();
    blockdrive(&home)
        .args(["ls", "n:l:/"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No remote endpoint configured"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let home = TempDir::new().unwrap();
    let config_dir = home.path().join("config/blockdrive");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("config.toml"), "db_max_connections = 0\n").unwrap();

    blockdrive(&home)
        .args(["records", "upload"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("db_max_connections"));
}
