//! Basic CLI tests for the blockbay command-line interface.

use assert_cmd::Command;
use predicates::prelude::*;

fn blockbay() -> Command {
    let mut cmd = Command::cargo_bin("blockbay").unwrap();
    cmd.env_remove("BLOCKBAY_RESOURCES_URL")
        .env_remove("BLOCKBAY_LOG_JSON")
        .env_remove("RUST_LOG");
    cmd
}

/// Test that the CLI binary exists and shows help.
#[test]
fn test_cli_help() {
    blockbay()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("builtins"))
        .stdout(predicate::str::contains("describe"))
        .stdout(predicate::str::contains("switch"))
        .stdout(predicate::str::contains("call"))
        .stdout(predicate::str::contains("catalog"));
}

#[test]
fn test_cli_version() {
    blockbay()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("blockbay"));
}

#[test]
fn test_no_subcommand_shows_error() {
    // Clap's error code for a missing subcommand.
    blockbay().assert().failure().code(2);
}

#[test]
fn test_builtins_lists_boards_and_extensions() {
    blockbay()
        .arg("builtins")
        .assert()
        .success()
        .stdout(predicate::str::contains("coreExample"))
        .stdout(predicate::str::contains("unoCore"))
        .stdout(predicate::str::contains("unoStart"));
}

#[test]
fn test_describe_device_prints_categories() {
    blockbay()
        .args(["describe", "unoCore"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"id\": \"pin\""))
        .stdout(predicate::str::contains("UnoCoreAttachInterrupt"))
        .stdout(predicate::str::contains("unoCoreDataMap"));
}

#[test]
fn test_describe_extension() {
    blockbay()
        .args(["--verbose", "describe", "coreExample"])
        .assert()
        .success()
        .stdout(predicate::str::contains("describeBlock"))
        .stdout(predicate::str::contains("getThings"));
}

#[test]
fn test_describe_unknown_fails() {
    blockbay()
        .args(["describe", "boardA"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("boardA"));
}

#[test]
fn test_switch_reports_transitions() {
    blockbay()
        .args(["switch", "unoCore", "unoCore", "boardA", "unoStart", "unselectDevice"])
        .assert()
        .success()
        .stdout(predicate::str::contains("unoCore: activated as extension_"))
        .stdout(predicate::str::contains("unoCore: already loaded"))
        .stdout(predicate::str::contains("boardA: Device not found"))
        .stdout(predicate::str::contains("unselectDevice: cleared"))
        .stdout(predicate::str::contains("Active device: none"));
}

#[test]
fn test_call_device_operation() {
    blockbay()
        .args([
            "call",
            "unoCore",
            "unoCoreDataMap",
            "--args",
            r#"{"DATA": "50", "ARG0": "0", "ARG1": "100", "ARG2": "0", "ARG3": "10"}"#,
        ])
        .assert()
        .success()
        .stdout(predicate::str::diff("5\n"));
}

#[test]
fn test_call_rejects_bad_json() {
    blockbay()
        .args(["call", "coreExample", "exampleOpcode", "--args", "{not json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Arguments must be JSON"));
}

#[test]
fn test_catalog_unreachable_server_fails() {
    blockbay()
        .args(["--resources-url", "http://127.0.0.1:9", "catalog", "devices"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not reach the resources server"));
}
