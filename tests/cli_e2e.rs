//! End-to-end CLI tests for the mediafetch binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Command with an isolated config directory so a user config never leaks in.
fn mediafetch(config_home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("mediafetch").unwrap();
    cmd.env("XDG_CONFIG_HOME", config_home.path())
        .env_remove("RUST_LOG");
    cmd
}

/// Test that the binary can be invoked without input and exits with code 0.
#[test]
fn test_binary_invocation_returns_zero() {
    let home = TempDir::new().unwrap();
    mediafetch(&home)
        .write_stdin("")
        .assert()
        .success()
        .stderr(predicate::str::contains("No input provided"));
}

/// Test that --help displays usage information and exits with code 0.
#[test]
fn test_binary_help_displays_usage() {
    let home = TempDir::new().unwrap();
    mediafetch(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Download media files over HTTP(S)"))
        .stdout(predicate::str::contains("--sleep-429"));
}

/// Test that --version displays version and exits with code 0.
#[test]
fn test_binary_version_displays_version() {
    let home = TempDir::new().unwrap();
    mediafetch(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mediafetch"));
}

/// Test that invalid flags cause non-zero exit.
#[test]
fn test_binary_invalid_flag_returns_error() {
    let home = TempDir::new().unwrap();
    mediafetch(&home)
        .arg("--invalid-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

/// Test that -q flag works (quiet mode).
#[test]
fn test_binary_quiet_flag_accepted() {
    let home = TempDir::new().unwrap();
    mediafetch(&home).arg("-q").write_stdin("").assert().success();
}

#[test]
fn test_binary_missing_config_file_exits_with_config_code() {
    let home = TempDir::new().unwrap();
    mediafetch(&home)
        .args(["--config", "/nonexistent/mediafetch.json", "https://example.com/a.jpg"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_binary_malformed_config_exits_with_config_code() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("broken.json");
    std::fs::write(&config, "{ not json").unwrap();

    mediafetch(&home)
        .arg("--config")
        .arg(&config)
        .arg("https://example.com/a.jpg")
        .assert()
        .code(2);
}

#[test]
fn test_binary_invalid_action_spec_exits_with_config_code() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("actions.json");
    std::fs::write(&config, r#"{"output": {"actions": {"warning": "explode"}}}"#).unwrap();

    mediafetch(&home)
        .arg("--config")
        .arg(&config)
        .arg("https://example.com/a.jpg")
        .assert()
        .code(2);
}

#[test]
fn test_binary_invalid_signal_spec_exits_with_config_code() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("signals.json");
    std::fs::write(&config, r#"{"output": {"signals": {"SIGUSR1": "flag child"}}}"#).unwrap();

    mediafetch(&home)
        .arg("--config")
        .arg(&config)
        .arg("https://example.com/a.jpg")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("flag 'child' is not supported"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_downloads_urls_from_stdin() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/report.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("quarterly numbers"))
        .mount(&server)
        .await;

    let home = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let input = format!("# comment line\n\n{}/files/report.txt\n", server.uri());
    let mut cmd = mediafetch(&home);
    cmd.arg("-d").arg(out.path()).arg("--no-progress").write_stdin(input);

    let assert = tokio::task::spawn_blocking(move || cmd.assert())
        .await
        .unwrap();
    assert.success();

    let written = std::fs::read_to_string(out.path().join("report.txt")).unwrap();
    assert_eq!(written, "quarterly numbers");
    assert!(!out.path().join("report.txt.part").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_failed_download_exits_one() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let home = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let mut cmd = mediafetch(&home);
    cmd.arg("-d")
        .arg(out.path())
        .arg(format!("{}/gone.jpg", server.uri()));

    let assert = tokio::task::spawn_blocking(move || cmd.assert())
        .await
        .unwrap();
    assert.code(1).stderr(predicate::str::contains("404 Not Found"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_exit_action_sets_exit_code() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let home = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let config = home.path().join("config.json");
    std::fs::write(
        &config,
        r#"{"output": {"actions": {"warning:404": "exit 7"}}}"#,
    )
    .unwrap();

    let mut cmd = mediafetch(&home);
    cmd.arg("--config")
        .arg(&config)
        .arg("-d")
        .arg(out.path())
        .arg(format!("{}/gone.jpg", server.uri()));

    let assert = tokio::task::spawn_blocking(move || cmd.assert())
        .await
        .unwrap();
    assert.code(7);
}
