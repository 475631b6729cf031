//! CLI surface tests

mod common;

use common::{cartoflash, write_settings};
use predicates::prelude::*;

#[test]
fn test_help_lists_the_flash_options() {
    cartoflash()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--flash"))
        .stdout(predicate::str::contains("--katapult"))
        .stdout(predicate::str::contains("--channel"))
        .stdout(predicate::str::contains("--high-temp"))
        .stdout(predicate::str::contains("--kseries"))
        .stdout(predicate::str::contains("--device"));
}

#[test]
fn test_version_flag() {
    cartoflash()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("cartoflash"));
}

#[test]
fn test_unknown_transport_is_rejected() {
    cartoflash()
        .args(["--flash", "spi"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_unknown_flag_is_rejected() {
    cartoflash()
        .arg("--frobnicate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unexpected argument"));
}

#[test]
fn test_completions_bash_emits_a_script() {
    cartoflash()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cartoflash"));
}

#[test]
fn test_completions_unknown_shell_fails() {
    cartoflash()
        .args(["completions", "tcsh"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown shell"));
}

#[test]
fn test_missing_explicit_config_is_fatal() {
    cartoflash()
        .args(["--config", "/nonexistent/cartoflash.yaml", "--yes"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("configuration file"));
}

#[test]
fn test_unreachable_moonraker_does_not_block_the_session() {
    // Moonraker is pointed at a closed port; an unanswerable status query
    // counts as a stopped print service, so the session carries on and dies
    // fetching the nonexistent release tree instead.
    let temp = tempfile::tempdir().expect("tempdir");
    let settings = write_settings(temp.path());
    cartoflash()
        .args(["--config"])
        .arg(&settings)
        .args(["--flash", "dfu", "--yes"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("release tree"));
}
