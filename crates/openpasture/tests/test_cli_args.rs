//! CLI argument handling tests

use assert_cmd::Command;
use predicates::prelude::*;

fn cmd() -> Command {
    Command::cargo_bin("openpasture").expect("binary builds")
}

#[test]
fn test_help_lists_subcommands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("show"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_run_requires_farm() {
    cmd()
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--farm"));
}

#[test]
fn test_show_requires_farm() {
    cmd()
        .arg("show")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--farm"));
}

#[test]
fn test_unknown_subcommand_fails() {
    cmd().arg("deploy").assert().failure();
}
