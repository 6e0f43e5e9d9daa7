use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::{tempdir, TempDir};

fn workspace() -> TempDir {
    let dir = tempdir().expect("tempdir");
    let audit = dir.path().join("logs").join("audit.jsonl");
    fs::write(
        dir.path().join("settings.toml"),
        format!(
            "[service]\nunit = \"isc-dhcp-server\"\nuse_sudo = false\nsimulate = true\n\n\
             [audit]\npath = {:?}\n",
            audit.to_str().expect("utf-8 path")
        ),
    )
    .expect("write settings");
    dir
}

fn cli(dir: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("dhcp-hosts"));
    cmd.env("NO_COLOR", "1")
        .env_remove("CLICOLOR_FORCE")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(dir.path().join("settings.toml"));
    cmd
}

#[test]
fn status_reports_simulated_service() {
    let dir = workspace();

    cli(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("state=active"))
        .stdout(predicate::str::contains("isc-dhcp-server"));
}

#[test]
fn status_json_uses_snake_case_state() {
    let dir = workspace();
    let output = cli(&dir)
        .args(["--format", "json", "status"])
        .output()
        .expect("run");
    assert!(output.status.success());

    let value: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(value["state"], "active");
    assert!(value["raw_output"]
        .as_str()
        .unwrap_or_default()
        .contains("Active:"));
}

#[test]
fn restart_is_audited_as_config_change() {
    let dir = workspace();

    cli(&dir)
        .args(["--actor", "ops", "restart"])
        .assert()
        .success()
        .stdout(predicate::str::contains("restarted (simulated)"));

    let text =
        fs::read_to_string(dir.path().join("logs").join("audit.jsonl")).expect("audit file");
    let entry: Value = serde_json::from_str(text.lines().next().expect("one line")).expect("json");
    assert_eq!(entry["actor"], "ops");
    assert_eq!(entry["action"], "UPDATE");
    assert_eq!(entry["resource_type"], "CONFIG");
    assert_eq!(entry["status"], "SUCCESS");
}
