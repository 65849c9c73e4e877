//! Binary-level checks: flag validation and startup failures.

use assert_cmd::Command;
use predicates::prelude::*;

fn prsweep() -> Command {
    let mut cmd = Command::cargo_bin("prsweep").expect("binary builds");
    // Run from an empty directory so a developer's prsweep.toml is not
    // picked up, and without ambient credentials.
    cmd.current_dir(std::env::temp_dir());
    cmd.env_remove("GITHUB_TOKEN");
    cmd.env_remove("REPO");
    cmd
}

#[test]
fn test_requires_a_run_mode() {
    prsweep()
        .arg("--repo")
        .arg("octo/widgets")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("specify --once or --continuous"));
}

#[test]
fn test_once_and_continuous_conflict() {
    prsweep()
        .args(["--once", "--continuous"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_missing_token_fails_before_any_network_use() {
    prsweep()
        .args(["--once", "--repo", "octo/widgets"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("GITHUB_TOKEN"));
}

#[test]
fn test_malformed_repo_is_rejected() {
    prsweep()
        .env("GITHUB_TOKEN", "t0ken")
        .args(["--once", "--repo", "not-a-slug"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("owner/name"));
}

#[test]
fn test_explicit_config_must_exist() {
    prsweep()
        .env("GITHUB_TOKEN", "t0ken")
        .args(["--once", "--config", "/nonexistent/prsweep.toml"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("config file not found"));
}

#[test]
fn test_help_lists_run_modes() {
    prsweep()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--once"))
        .stdout(predicate::str::contains("--continuous"))
        .stdout(predicate::str::contains("--dry-run"));
}

#[test]
fn test_version() {
    prsweep()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("prsweep"));
}
