//! Integration tests for the ddclight CLI
//!
//! These tests verify CLI argument parsing and help output. Brightness
//! control itself needs real display hardware and a session bus, and is part
//! of manual testing.

use std::process::Command;

/// Get the path to the ddclight binary
fn ddclight_bin() -> std::path::PathBuf {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());
    let mut path = std::path::PathBuf::from(manifest_dir);
    path.push("target");

    // Prefer release build
    let release_path = path.join("release").join("ddclight");
    if release_path.exists() {
        return release_path;
    }

    path.push("debug");
    path.push("ddclight");
    path
}

#[test]
fn test_help_command() {
    let output = Command::new(ddclight_bin())
        .arg("--help")
        .output()
        .expect("Failed to execute ddclight --help");

    assert!(output.status.success(), "ddclight --help should succeed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("brightness"),
        "Help should contain description"
    );
    for subcommand in ["get", "poke", "set", "increment", "decrement", "watch", "daemon"] {
        assert!(
            stdout.contains(subcommand),
            "Help should mention '{subcommand}' command"
        );
    }
}

#[test]
fn test_set_subcommand_help() {
    let output = Command::new(ddclight_bin())
        .args(["set", "--help"])
        .output()
        .expect("Failed to execute ddclight set --help");

    assert!(
        output.status.success(),
        "ddclight set --help should succeed"
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("PERCENTAGE"),
        "Set help should mention the percentage argument"
    );
}

#[test]
fn test_watch_subcommand_help() {
    let output = Command::new(ddclight_bin())
        .args(["watch", "--help"])
        .output()
        .expect("Failed to execute ddclight watch --help");

    assert!(
        output.status.success(),
        "ddclight watch --help should succeed"
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("change"),
        "Watch help should describe the command"
    );
}

#[test]
fn test_completion_bash() {
    let output = Command::new(ddclight_bin())
        .args(["completion", "bash"])
        .output()
        .expect("Failed to execute ddclight completion bash");

    assert!(
        output.status.success(),
        "ddclight completion bash should succeed"
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("ddclight"),
        "Completion script should mention the binary name"
    );
}

#[test]
fn test_invalid_command_fails() {
    let output = Command::new(ddclight_bin())
        .arg("invalid")
        .output()
        .expect("Failed to execute ddclight invalid");

    assert!(!output.status.success(), "Invalid command should fail");
}

#[test]
fn test_set_without_value_fails() {
    let output = Command::new(ddclight_bin())
        .arg("set")
        .output()
        .expect("Failed to execute ddclight set");

    assert!(
        !output.status.success(),
        "set without a percentage should fail"
    );
}
