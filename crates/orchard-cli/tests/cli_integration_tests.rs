//! CLI integration tests for orchard
//!
//! Tests the orchard CLI commands end-to-end using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread::JoinHandle;
use tempfile::TempDir;

/// Helper to create a command isolated inside `temp_dir`
///
/// Config, database and working directory all live in the temp dir, and no
/// API key leaks in from the environment.
#[allow(deprecated)]
fn orchard_cmd(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("orchard").unwrap();
    cmd.current_dir(temp_dir)
        .env("ORCHARD_CONFIG_DIR", temp_dir.path().join("config"))
        .env("ORCHARD_DATABASE", temp_dir.path().join("orchard.db"))
        .env_remove("ORCHARD_API_KEY")
        .env_remove("OPENROUTER_API_KEY")
        .env_remove("RUST_LOG");
    cmd
}

/// One-shot chat completions endpoint returning `content`; yields the raw request
fn serve_completion(content: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = std::thread::spawn(move || {
        let (mut socket, _) = listener.accept().unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        loop {
            let n = socket.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
                let len = headers
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= pos + 4 + len {
                    break;
                }
            }
        }

        let body = serde_json::json!({
            "model": "test/model",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        })
        .to_string();
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).unwrap();
        String::from_utf8_lossy(&buf).into_owned()
    });

    (format!("http://{}/v1", addr), handle)
}

// ============================================================================
// Fruits
// ============================================================================

#[test]
fn test_fruits_list_empty() {
    let temp_dir = TempDir::new().unwrap();

    orchard_cmd(&temp_dir)
        .args(["fruits", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No fruits found."));
}

#[test]
fn test_fruits_add_assigns_ids_from_ten() {
    let temp_dir = TempDir::new().unwrap();

    orchard_cmd(&temp_dir)
        .args(["fruits", "add", "Banana"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Fruit created: 10 - Banana"));

    orchard_cmd(&temp_dir)
        .args(["fruits", "add", "Apple"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Fruit created: 11 - Apple"));
}

#[test]
fn test_fruits_list_is_ordered_by_name() {
    let temp_dir = TempDir::new().unwrap();

    for name in ["Cherry", "Banana", "Apple"] {
        orchard_cmd(&temp_dir)
            .args(["fruits", "add", name])
            .assert()
            .success();
    }

    let output = orchard_cmd(&temp_dir)
        .args(["fruits", "list"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout
        .lines()
        .filter(|l| l.starts_with("  "))
        .map(str::trim)
        .collect();
    assert_eq!(lines, ["12 - Apple", "11 - Banana", "10 - Cherry"]);
}

#[test]
fn test_fruits_list_json() {
    let temp_dir = TempDir::new().unwrap();

    orchard_cmd(&temp_dir)
        .args(["fruits", "add", "Fig"])
        .assert()
        .success();

    let output = orchard_cmd(&temp_dir)
        .args(["--format", "json", "fruits", "list"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(parsed[0]["id"], 10);
    assert_eq!(parsed[0]["name"], "Fig");
}

#[test]
fn test_fruits_add_duplicate_fails() {
    let temp_dir = TempDir::new().unwrap();

    orchard_cmd(&temp_dir)
        .args(["fruits", "add", "Apple"])
        .assert()
        .success();

    orchard_cmd(&temp_dir)
        .args(["fruits", "add", "Apple"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("already exists"));

    // The rejected insert did not consume an id
    orchard_cmd(&temp_dir)
        .args(["fruits", "add", "Pear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("11 - Pear"));
}

#[test]
fn test_fruits_add_long_name_fails() {
    let temp_dir = TempDir::new().unwrap();
    let long_name = "x".repeat(41);

    orchard_cmd(&temp_dir)
        .args(["fruits", "add", &long_name])
        .assert()
        .failure()
        .stderr(predicate::str::contains("longer than 40 characters"));

    orchard_cmd(&temp_dir)
        .args(["fruits", "add", &"x".repeat(40)])
        .assert()
        .success();
}

#[test]
fn test_fruits_show_rename_delete() {
    let temp_dir = TempDir::new().unwrap();

    orchard_cmd(&temp_dir)
        .args(["fruits", "add", "Plum"])
        .assert()
        .success();

    orchard_cmd(&temp_dir)
        .args(["fruits", "show", "10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Fruit: Plum"));

    orchard_cmd(&temp_dir)
        .args(["fruits", "rename", "10", "Prune"])
        .assert()
        .success()
        .stdout(predicate::str::contains("10 - Prune"));

    orchard_cmd(&temp_dir)
        .args(["fruits", "delete", "10"])
        .assert()
        .success();

    orchard_cmd(&temp_dir)
        .args(["fruits", "show", "10"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_database_flag_overrides_env() {
    let temp_dir = TempDir::new().unwrap();
    let other_db = temp_dir.path().join("other.db");

    orchard_cmd(&temp_dir)
        .args(["fruits", "add", "Kiwi", "--database"])
        .arg(&other_db)
        .assert()
        .success();

    assert!(other_db.exists());
    orchard_cmd(&temp_dir)
        .args(["fruits", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No fruits found."));
}

// ============================================================================
// Poem
// ============================================================================

#[test]
fn test_poem_help_shows_defaults() {
    let temp_dir = TempDir::new().unwrap();

    orchard_cmd(&temp_dir)
        .args(["poem", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--lines"))
        .stdout(predicate::str::contains("Quarkus and GraalVM"))
        .stdout(predicate::str::contains("[default: 4]"));
}

#[test]
fn test_poem_without_api_key_fails() {
    let temp_dir = TempDir::new().unwrap();

    orchard_cmd(&temp_dir)
        .arg("poem")
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("API key not configured"));
}

#[test]
fn test_poem_rejects_invalid_lines() {
    let temp_dir = TempDir::new().unwrap();

    orchard_cmd(&temp_dir)
        .args(["poem", "--lines", "lots"])
        .assert()
        .failure();
}

#[test]
fn test_poem_zero_lines_fails_before_any_request() {
    let temp_dir = TempDir::new().unwrap();

    // Nothing listens here; reaching the network would fail differently
    orchard_cmd(&temp_dir)
        .args(["config", "set", "llm.base_url", "http://127.0.0.1:9/v1"])
        .assert()
        .success();

    orchard_cmd(&temp_dir)
        .env("ORCHARD_API_KEY", "test-key")
        .args(["poem", "--lines", "0"])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("at least one line"));
}

#[test]
fn test_poem_prints_generated_text() {
    let temp_dir = TempDir::new().unwrap();
    let (base_url, server) = serve_completion("Fast start, small heap,\nnative dreams.");

    orchard_cmd(&temp_dir)
        .args(["config", "set", "llm.base_url", &base_url])
        .assert()
        .success();

    orchard_cmd(&temp_dir)
        .env("ORCHARD_API_KEY", "test-key")
        .args(["poem", "Ahead-of-time compilation", "--lines", "2"])
        .assert()
        .success()
        .stdout("Fast start, small heap,\nnative dreams.\n");

    let request = server.join().unwrap();
    assert!(request.contains("You are a professional poet"));
    assert!(request.contains(
        r#"    Write a poem about Ahead-of-time compilation.\n    The poem should be 2 lines long.\n"#
    ));
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn test_config_set_and_get() {
    let temp_dir = TempDir::new().unwrap();

    orchard_cmd(&temp_dir)
        .args(["config", "set", "llm.default_model", "test/poet"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Set llm.default_model = test/poet"));

    orchard_cmd(&temp_dir)
        .args(["config", "get", "llm.default_model"])
        .assert()
        .success()
        .stdout("test/poet\n");

    orchard_cmd(&temp_dir)
        .args(["config", "reset"])
        .assert()
        .success();

    orchard_cmd(&temp_dir)
        .args(["config", "get", "llm.default_model"])
        .assert()
        .success()
        .stdout(predicate::str::contains("test/poet").not());
}

#[test]
fn test_config_rejects_api_key() {
    let temp_dir = TempDir::new().unwrap();

    orchard_cmd(&temp_dir)
        .args(["config", "set", "llm.api_key", "sk-secret"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ORCHARD_API_KEY"));
}

#[test]
fn test_config_list_and_path() {
    let temp_dir = TempDir::new().unwrap();

    orchard_cmd(&temp_dir)
        .args(["config", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("llm.base_url = "))
        .stdout(predicate::str::contains("database.max_connections = 5"));

    orchard_cmd(&temp_dir)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

// ============================================================================
// Doctor
// ============================================================================

#[test]
fn test_doctor_reports_missing_key() {
    let temp_dir = TempDir::new().unwrap();

    orchard_cmd(&temp_dir)
        .arg("doctor")
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("[!!] API Key: Not configured"))
        .stdout(predicate::str::contains("[OK] Database: Connected"))
        .stdout(predicate::str::contains("     Fruits: 0"))
        .stdout(predicate::str::contains("Some checks failed."))
        .stderr(predicate::str::contains("health check failed"));
}

#[test]
fn test_doctor_counts_fruits() {
    let temp_dir = TempDir::new().unwrap();

    for name in ["Apple", "Banana"] {
        orchard_cmd(&temp_dir)
            .args(["fruits", "add", name])
            .assert()
            .success();
    }

    orchard_cmd(&temp_dir)
        .env("ORCHARD_API_KEY", "sk-or-test-1234")
        .arg("doctor")
        .assert()
        .success()
        .stdout(predicate::str::contains("     Fruits: 2"));
}

#[test]
fn test_doctor_all_ok_with_key() {
    let temp_dir = TempDir::new().unwrap();

    orchard_cmd(&temp_dir)
        .env("ORCHARD_API_KEY", "sk-or-test-1234")
        .arg("doctor")
        .assert()
        .success()
        .stdout(predicate::str::contains("***1234"))
        .stdout(predicate::str::contains("All checks passed!"));
}
