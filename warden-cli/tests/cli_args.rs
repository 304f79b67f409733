use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn warden_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("warden"));
    cmd.env("HOME", home).env("USERPROFILE", home);
    cmd
}

#[test]
fn help_lists_lifecycle_subcommands() {
    let home = TempDir::new().expect("home");
    warden_cmd(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("install"))
        .stdout(contains("pause"))
        .stdout(contains("continue"))
        .stdout(contains("status"))
        .stdout(contains("run"));
}

#[test]
fn unknown_subcommand_fails() {
    let home = TempDir::new().expect("home");
    warden_cmd(home.path()).arg("bogus").assert().failure();
}

#[test]
fn run_rejects_non_numeric_grace() {
    let home = TempDir::new().expect("home");
    warden_cmd(home.path())
        .args(["run", "--grace-secs", "soon"])
        .assert()
        .failure();
}

#[test]
fn status_reports_stopped_when_agent_is_down() {
    let home = TempDir::new().expect("home");
    let assert = warden_cmd(home.path())
        .args(["status", "--json"])
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("stdout utf8");
    let value: serde_json::Value = serde_json::from_str(&stdout).expect("status JSON");
    assert_eq!(value["state"], serde_json::json!("stopped"));
    assert!(
        value["socket"].as_str().is_some(),
        "stopped status should still point at the socket path"
    );
}

#[test]
fn stop_without_agent_prints_not_running() {
    let home = TempDir::new().expect("home");
    warden_cmd(home.path())
        .arg("stop")
        .assert()
        .success()
        .stdout(contains("agent is not running"));
}

#[test]
fn pause_without_agent_prints_not_running() {
    let home = TempDir::new().expect("home");
    warden_cmd(home.path())
        .arg("pause")
        .assert()
        .success()
        .stdout(contains("agent is not running"));
}
