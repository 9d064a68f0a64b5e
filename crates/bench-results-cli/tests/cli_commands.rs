// crates/bench-results-cli/tests/cli_commands.rs
// ============================================================================
// Module: CLI Command Tests
// Description: Integration tests for config checks and store initialization.
// Purpose: Ensure invalid configs fail closed before any server starts.
// Dependencies: bench-results-cli binary, tempfile
// ============================================================================
//! ## Overview
//! Runs the built `bench-results` binary against temporary config files.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::process::Output;

use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn bench_results_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_bench-results"))
}

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("bench-results.toml");
    fs::write(&path, body.trim()).expect("write config");
    path
}

fn sqlite_config(dir: &Path, auth: &str) -> String {
    let db = dir.join("results.db");
    format!(
        "[auth]\n{auth}\n\n[store]\ntype = \"sqlite\"\npath = \"{}\"\n",
        db.display().to_string().replace('\\', "/")
    )
}

fn run(args: &[&str], config: &Path) -> Output {
    Command::new(bench_results_bin())
        .args(args)
        .arg("--config")
        .arg(config)
        .env_remove("BENCH_RESULTS_CONFIG")
        .env_remove("BENCH_RESULTS_CLI_TEST_TOKEN")
        .output()
        .expect("run bench-results")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// ============================================================================
// SECTION: check-config
// ============================================================================

#[test]
fn check_config_accepts_valid_file() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &sqlite_config(dir.path(), "token = \"s3cret\""));
    let output = run(&["check-config"], &config);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("Config valid."));
    assert!(!dir.path().join("results.db").exists());
}

#[test]
fn check_config_rejects_missing_auth() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "[store]\ntype = \"sqlite\"\npath = \"x.db\"\n");
    let output = run(&["check-config"], &config);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Failed to load config"));
}

#[test]
fn check_config_rejects_unset_token_env() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        &sqlite_config(dir.path(), "token_env = \"BENCH_RESULTS_CLI_TEST_TOKEN\""),
    );
    let output = run(&["check-config"], &config);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("BENCH_RESULTS_CLI_TEST_TOKEN"));
}

#[test]
fn check_config_rejects_missing_file() {
    let dir = TempDir::new().unwrap();
    let output = run(&["check-config"], &dir.path().join("absent.toml"));
    assert!(!output.status.success());
    assert!(stderr(&output).contains("config io error"));
}

// ============================================================================
// SECTION: init-store and serve
// ============================================================================

#[test]
fn init_store_creates_sqlite_database() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &sqlite_config(dir.path(), "token = \"s3cret\""));
    let output = run(&["init-store"], &config);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("Store ready (sqlite)."));
    assert!(dir.path().join("results.db").exists());

    let again = run(&["init-store"], &config);
    assert!(again.status.success(), "stderr: {}", stderr(&again));
}

#[test]
fn serve_fails_closed_on_invalid_config() {
    let dir = TempDir::new().unwrap();
    let mut body = sqlite_config(dir.path(), "token = \"s3cret\"");
    body.push_str("\n[server]\nbind = \"not-an-address\"\n");
    let config = write_config(dir.path(), &body);
    let output = run(&["serve"], &config);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Failed to load config"));
    assert!(!dir.path().join("results.db").exists());
}
