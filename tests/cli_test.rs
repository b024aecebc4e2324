use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn costs_fails_cleanly_on_missing_directory() {
    let mut cmd = Command::cargo_bin("llm-telemetry").unwrap();
    cmd.args(["costs", "--path", "/nonexistent/telemetry/root"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Telemetry directory not found"));
}

#[test]
fn costs_rejects_unknown_status_values() {
    let mut cmd = Command::cargo_bin("llm-telemetry").unwrap();
    cmd.args(["costs", "--status", "maybe"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("possible values"));
}

#[test]
fn no_subcommand_prints_help() {
    let mut cmd = Command::cargo_bin("llm-telemetry").unwrap();
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("costs"));
}

#[test]
fn version_flag_reports_the_crate_version() {
    let mut cmd = Command::cargo_bin("llm-telemetry").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
