//! End-to-end runs of the `harness` binary.

use std::path::Path;
use std::process::{Command, Output};

use harness_common::ExecutionResult;
use serde_json::{Value, json};

const HARNESS: &str = env!("CARGO_BIN_EXE_harness");

fn harness(args: &[&str], payload: &Path) -> Command {
    let mut cmd = Command::new(HARNESS);
    cmd.args(args)
        .arg(payload)
        .env_remove("HARNESS_CONFIG")
        .env_remove("HARNESS_TIMEOUT_MS")
        .env_remove("HARNESS_EXEC_BIN");
    cmd
}

fn decode(output: &Output) -> ExecutionResult {
    let stdout = String::from_utf8(output.stdout.clone()).unwrap();
    assert_eq!(stdout.matches('\n').count(), 1, "stdout: {stdout:?}");
    ExecutionResult::decode(&stdout).unwrap()
}

fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn prints_quotient_result() {
    let dir = tempfile::tempdir().unwrap();
    let payload = write(dir.path(), "p.json", r#"{"version":"v1","event":{"a":10,"b":2}}"#);

    let output = harness(&["main.handler"], &payload).output().unwrap();
    assert!(output.status.success());
    assert!(output.stderr.is_empty(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let result = decode(&output);
    assert_eq!(result.result, json!({"quotient": 5.0}));
    assert_eq!(result.error, None);
    assert_eq!(
        result.logs,
        "Hello from print\nINFO: Hello from logging\nERROR: Hello from error logging\n"
    );
}

#[test]
fn timeout_flag_bounds_execution() {
    let dir = tempfile::tempdir().unwrap();
    let payload = write(dir.path(), "p.json", r#"{"version":"v1"}"#);

    let output = harness(&["--timeout-ms", "200", "demo.hang"], &payload)
        .output()
        .unwrap();
    assert!(output.status.success());
    let result = decode(&output);
    assert_eq!(result.result, Value::Null);
    assert_eq!(result.error.as_deref(), Some("execution timed out"));
    assert_eq!(result.duration_ms, 200);
}

#[test]
fn config_file_sets_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let payload = write(dir.path(), "p.json", r#"{"version":"v1"}"#);
    let config = write(dir.path(), "harness.yaml", "timeout_ms: 250\n");
    let config = config.to_str().unwrap();

    let output = harness(&["--config", config, "demo.hang"], &payload)
        .output()
        .unwrap();
    let result = decode(&output);
    assert_eq!(result.error.as_deref(), Some("execution timed out"));
    assert_eq!(result.duration_ms, 250);
}

#[test]
fn config_error_is_reported_as_result() {
    let dir = tempfile::tempdir().unwrap();
    let payload = write(dir.path(), "p.json", r#"{"version":"v1"}"#);
    let config = write(dir.path(), "harness.yaml", "timeout_ms: 0\n");

    let output = harness(&["main.handler"], &payload)
        .env("HARNESS_CONFIG", &config)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let result = decode(&output);
    assert_eq!(result.result, Value::Null);
    let error = result.error.unwrap();
    assert!(error.starts_with("config error:"), "got: {error}");
}

#[test]
fn exec_bin_override() {
    let dir = tempfile::tempdir().unwrap();
    let payload = write(dir.path(), "p.json", r#"{"version":"v1"}"#);

    // `true` exits cleanly without printing a result.
    let output = harness(&["--exec-bin", "true", "main.handler"], &payload)
        .output()
        .unwrap();
    assert!(output.status.success());
    let error = decode(&output).error.unwrap();
    assert!(error.starts_with("invalid response from execution process"), "got: {error}");
}

#[test]
fn missing_arguments_are_reported_as_result() {
    let output = Command::new(HARNESS)
        .arg("main.handler")
        .env_remove("HARNESS_CONFIG")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let result = decode(&output);
    assert!(result.error.unwrap().starts_with("usage error:"));
}
