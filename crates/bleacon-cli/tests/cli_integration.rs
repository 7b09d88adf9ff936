//! CLI Integration Tests
//!
//! These tests run the `bleacon` binary and check argument handling, config
//! management and error output. Scanning tests need a Bluetooth adapter and
//! are marked with #[ignore].
//!
//! Run:
//! ```
//! cargo test --package bleacon-cli --test cli_integration
//! ```
//!
//! Run hardware tests:
//! ```
//! BLEACON_MANUFACTURER=0x0059 cargo test --package bleacon-cli --test cli_integration -- --ignored --nocapture
//! ```

use std::env;
use std::path::Path;
use std::process::{Command, Output};

/// Get path to the bleacon binary
fn get_binary_path() -> String {
    let release_path = env!("CARGO_MANIFEST_DIR").to_string() + "/../../target/release/bleacon";
    let debug_path = env!("CARGO_MANIFEST_DIR").to_string() + "/../../target/debug/bleacon";

    if Path::new(&release_path).exists() {
        release_path
    } else if Path::new(&debug_path).exists() {
        debug_path
    } else {
        // Fall back to cargo run
        "cargo".to_string()
    }
}

fn command() -> Command {
    let binary = get_binary_path();
    let mut cmd = if binary == "cargo" {
        let mut cmd = Command::new("cargo");
        cmd.args(["run", "--quiet", "--package", "bleacon-cli", "--"]);
        cmd
    } else {
        Command::new(binary)
    };
    cmd.env_remove("BLEACON_MANUFACTURER").env("NO_COLOR", "1");
    cmd
}

/// Run bleacon with an isolated config file and return output
fn run_bleacon(config: &Path, args: &[&str]) -> Output {
    command()
        .env("BLEACON_CONFIG", config)
        .args(args)
        .output()
        .expect("Failed to run bleacon")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn get_manufacturer() -> Option<String> {
    env::var("BLEACON_MANUFACTURER").ok().filter(|s| !s.is_empty())
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_command() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_bleacon(&dir.path().join("config.toml"), &["--help"]);

    assert!(output.status.success(), "Help should succeed");
    let text = stdout(&output);
    for cmd in ["scan", "ibeacon", "connect", "config", "completions"] {
        assert!(text.contains(cmd), "Help should list {} command", cmd);
    }
}

#[test]
fn test_version_command() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_bleacon(&dir.path().join("config.toml"), &["--version"]);

    assert!(output.status.success(), "Version should succeed");
    assert!(stdout(&output).contains("bleacon"));
}

#[test]
fn test_subcommand_help() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");

    for cmd in ["scan", "ibeacon", "connect", "config"] {
        let output = run_bleacon(&config, &[cmd, "--help"]);
        assert!(output.status.success(), "{} --help should succeed", cmd);
        assert!(!stdout(&output).is_empty(), "{} --help should produce output", cmd);
    }
}

#[test]
fn test_completions_bash() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_bleacon(&dir.path().join("config.toml"), &["completions", "bash"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains("bleacon"));
}

// =============================================================================
// Config Commands
// =============================================================================

#[test]
fn test_config_path_honours_env() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("custom.toml");
    let output = run_bleacon(&config, &["config", "path"]);

    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), config.display().to_string());
}

#[test]
fn test_config_init_then_show() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("bleacon").join("config.toml");

    let output = run_bleacon(&config, &["config", "init"]);
    assert!(output.status.success(), "init failed: {}", stderr(&output));
    assert!(config.exists());

    let output = run_bleacon(&config, &["config", "init"]);
    assert!(!output.status.success(), "second init should refuse to overwrite");
    assert!(stderr(&output).contains("--force"));

    let output = run_bleacon(&config, &["config", "init", "--force"]);
    assert!(output.status.success());

    let output = run_bleacon(&config, &["config", "show"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("scan_mode"));
}

#[test]
fn test_config_show_reads_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(&config, "manufacturer = 89\nscan_mode = \"low_latency\"\n").unwrap();

    let output = run_bleacon(&config, &["config", "show"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("manufacturer = 89"));
    assert!(text.contains("low_latency"));
}

#[test]
fn test_invalid_config_falls_back_to_default() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(&config, "manufacturer = [").unwrap();

    let output = run_bleacon(&config, &["config", "show"]);
    assert!(output.status.success());
    assert!(stderr(&output).contains("Warning"));
}

// =============================================================================
// Argument Validation (fails before touching Bluetooth)
// =============================================================================

#[test]
fn test_scan_requires_manufacturer() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_bleacon(&dir.path().join("config.toml"), &["scan", "--timeout", "1"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("No manufacturer ID specified"));
}

#[test]
fn test_connect_requires_manufacturer() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_bleacon(
        &dir.path().join("config.toml"),
        &["connect", "--service", "180f", "--characteristic", "2a19"],
    );

    assert!(!output.status.success());
    assert!(stderr(&output).contains("No manufacturer ID specified"));
}

#[test]
fn test_invalid_manufacturer_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");

    for bad in ["apple", "0x10000", "70000"] {
        let output = run_bleacon(&config, &["scan", "--manufacturer", bad]);
        assert!(!output.status.success(), "{} should be rejected", bad);
        assert!(stderr(&output).contains("manufacturer"));
    }
}

#[test]
fn test_invalid_data_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_bleacon(
        &dir.path().join("config.toml"),
        &["scan", "--manufacturer", "89", "--data", "abc"],
    );

    assert!(!output.status.success());
}

#[test]
fn test_mask_length_must_match_data() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_bleacon(
        &dir.path().join("config.toml"),
        &["scan", "--manufacturer", "89", "--data", "beac", "--mask", "ff"],
    );

    assert!(!output.status.success());
    assert!(stderr(&output).to_lowercase().contains("mask"));
}

#[test]
fn test_invalid_uuid_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_bleacon(
        &dir.path().join("config.toml"),
        &["connect", "--manufacturer", "89", "--service", "not-a-uuid", "--characteristic", "2a19"],
    );

    assert!(!output.status.success());
}

// =============================================================================
// Hardware Tests (require a Bluetooth adapter and a nearby device)
// =============================================================================

#[test]
#[ignore = "requires BLE hardware"]
fn test_scan_once_hardware() {
    let Some(manufacturer) = get_manufacturer() else {
        eprintln!("BLEACON_MANUFACTURER not set, skipping");
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let output = run_bleacon(
        &dir.path().join("config.toml"),
        &[
            "scan",
            "--manufacturer",
            &manufacturer,
            "--once",
            "--timeout",
            "30",
            "--format",
            "json",
        ],
    );

    assert!(output.status.success(), "scan failed: {}", stderr(&output));
    let text = stdout(&output);
    let first = text.lines().next().expect("expected one report");
    let value: serde_json::Value = serde_json::from_str(first).unwrap();
    assert!(value["device_id"].is_string());
    assert!(value["payload"].is_string());
}

#[test]
#[ignore = "requires BLE hardware"]
fn test_ibeacon_hardware() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_bleacon(
        &dir.path().join("config.toml"),
        &["ibeacon", "--timeout", "10", "--format", "json"],
    );

    assert!(output.status.success(), "ibeacon failed: {}", stderr(&output));
    for line in stdout(&output).lines() {
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        assert!(value["uuid"].is_string());
    }
}
