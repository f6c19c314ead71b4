use std::path::PathBuf;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_path(prefix: &str, ext: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push("tivalink-tests");
    let _ = std::fs::create_dir_all(&dir);

    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    dir.join(format!("{}-{}.{}", prefix, nonce, ext))
}

fn write_temp_file(prefix: &str, contents: &str) -> PathBuf {
    let path = temp_path(prefix, "yaml");
    std::fs::write(&path, contents).expect("Failed to write temp file");
    path
}

const GREETING: &str = "Hello EWU IEEE, from Cody Birkland\n\r";

#[test]
fn test_cli_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_tivalink"))
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("--max-polls"));
    assert!(stdout.contains("--snapshot"));
}

#[test]
fn test_cli_missing_board_file() {
    let output = Command::new(env!("CARGO_BIN_EXE_tivalink"))
        .args(["--board", "non_existent_board.yaml"])
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_cli_prints_greeting_and_echo() {
    let output = Command::new(env!("CARGO_BIN_EXE_tivalink"))
        .args(["--input", "A", "--max-polls", "500"])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(stdout, format!("{}A", GREETING));
}

#[test]
fn test_cli_no_uart_stdout() {
    let output = Command::new(env!("CARGO_BIN_EXE_tivalink"))
        .args(["--max-polls", "10", "--no-uart-stdout"])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn test_cli_script_pass() {
    let script = write_temp_file(
        "script-pass",
        r#"
schema_version: "1.0"
input: "ping"
limits:
  max_polls: 1000
assertions:
  - uart_contains: "Hello EWU IEEE"
  - uart_contains: "ping"
  - no_faults: true
"#,
    );

    let output = Command::new(env!("CARGO_BIN_EXE_tivalink"))
        .args(["--script", script.to_str().unwrap(), "--no-uart-stdout"])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
}

#[test]
fn test_cli_script_assertion_fail() {
    let script = write_temp_file(
        "script-fail",
        r#"
schema_version: "1.0"
limits:
  max_polls: 10
assertions:
  - uart_equals: "ThisTextWillNeverBeFound"
"#,
    );

    let output = Command::new(env!("CARGO_BIN_EXE_tivalink"))
        .args(["--script", script.to_str().unwrap(), "--no-uart-stdout"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(1)); // EXIT_ASSERT_FAIL
}

#[test]
fn test_cli_bad_board_is_config_error() {
    let board = write_temp_file("board-bad", "crystal_hz: 13000000\n");

    let output = Command::new(env!("CARGO_BIN_EXE_tivalink"))
        .args(["--board", board.to_str().unwrap()])
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(2)); // EXIT_CONFIG_ERROR
}

#[test]
fn test_cli_pll_never_locks_is_runtime_error() {
    let board = write_temp_file(
        "board-nolock",
        r#"
name: "no-lock"
max_polls: 200
simulation:
  pll_lock_ticks: null
"#,
    );

    let output = Command::new(env!("CARGO_BIN_EXE_tivalink"))
        .args(["--board", board.to_str().unwrap(), "--no-uart-stdout"])
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(3)); // EXIT_RUNTIME_ERROR
}

#[test]
fn test_cli_secondary_route_via_script_board() {
    let board = write_temp_file(
        "board-secondary",
        r#"
name: "forwarder"
route: secondary
"#,
    );
    let script = write_temp_file(
        "script-secondary",
        &format!(
            r#"
schema_version: "1.0"
board: "{}"
input: "xyz"
limits:
  max_polls: 1000
assertions:
  - uart_equals: "xyz"
    uart: 2
"#,
            board.file_name().unwrap().to_str().unwrap()
        ),
    );

    let output = Command::new(env!("CARGO_BIN_EXE_tivalink"))
        .args(["--script", script.to_str().unwrap()])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    assert_eq!(String::from_utf8(output.stdout).unwrap(), GREETING);
}

#[test]
fn test_cli_writes_snapshot() {
    let snapshot_path = temp_path("snapshot", "json");
    let _ = std::fs::remove_file(&snapshot_path);

    let output = Command::new(env!("CARGO_BIN_EXE_tivalink"))
        .args([
            "--input",
            "Q",
            "--max-polls",
            "500",
            "--no-uart-stdout",
            "--snapshot",
            snapshot_path.to_str().unwrap(),
        ])
        .output()
        .expect("Failed to execute tivalink");

    assert!(output.status.success());
    assert!(snapshot_path.exists());

    let content = std::fs::read_to_string(&snapshot_path).unwrap();
    let report: serde_json::Value = serde_json::from_str(&content).unwrap();

    assert_eq!(report["status"], "pass");
    assert_eq!(report["sysclk_hz"], 50_000_000);
    assert_eq!(report["echoed"], serde_json::json!([0x51]));
    assert_eq!(report["uart"]["uart0"], format!("{}Q", GREETING));
    assert_eq!(report["registers"]["sysclk_hz"], 50_000_000);
    assert_eq!(report["registers"]["peripherals"]["uart0"]["36"], 27); // IBRD
    assert_eq!(report["registers"]["peripherals"]["uart0"]["40"], 8); // FBRD
    assert!(report["accesses"]["writes"].as_u64().unwrap() > 0);
    assert_eq!(report["accesses"]["faults"], 0);

    let _ = std::fs::remove_file(&snapshot_path);
}
