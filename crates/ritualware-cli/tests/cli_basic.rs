//! Basic CLI E2E tests.
//!
//! Tests invoke the built binary against a throwaway data directory and
//! verify its JSON output.

use std::path::Path;
use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(data_dir: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_ritualware-cli"))
        .args(args)
        .env("RITUALWARE_DATA_DIR", data_dir)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn run_json(data_dir: &Path, args: &[&str]) -> serde_json::Value {
    let (stdout, stderr, code) = run_cli(data_dir, args);
    assert_eq!(code, 0, "CLI command {args:?} failed: {stderr}");
    serde_json::from_str(&stdout).expect("Failed to parse JSON output")
}

const RITUAL: &str = r#"
owner_id = "owner"
subject_id = "pet"
title = "Morning"

[[tasks]]
title = "Make the bed"
token_reward = 10

[[tasks]]
title = "Write a note"
evidence_kind = "text"

[[conditions]]
trigger = "completion"
operator = "=="
comparand = 0
actions = [{ type = "reward", amount = 5 }, { type = "notify", message = "Good start" }]
"#;

#[test]
fn test_account_open_and_balance() {
    let dir = tempfile::tempdir().unwrap();
    let account = run_json(dir.path(), &["account", "open", "pet"]);
    assert_eq!(account["subject_id"], "pet");
    assert_eq!(account["token_balance"], 0);

    let balance = run_json(dir.path(), &["account", "balance", "pet"]);
    assert_eq!(balance["token_balance"], 0);
}

#[test]
fn test_unknown_account_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(dir.path(), &["account", "balance", "ghost"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error: Account 'ghost' not found"));
}

#[test]
fn test_ritual_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    run_json(dir.path(), &["account", "open", "owner"]);
    run_json(dir.path(), &["account", "open", "pet"]);

    let file = dir.path().join("ritual.toml");
    std::fs::write(&file, RITUAL).unwrap();
    let ritual = run_json(dir.path(), &["ritual", "create", "--file", file.to_str().unwrap()]);
    let ritual_id = ritual["id"].as_str().unwrap().to_string();

    let preview = run_json(
        dir.path(),
        &[
            "ritual", "evaluate", &ritual_id, "--subject", "pet", "--trigger", "completion",
            "--value", "0", "--dry-run",
        ],
    );
    assert_eq!(preview["actions"].as_array().unwrap().len(), 2);
    assert_eq!(preview["log"]["results"][0]["status"]["outcome"], "skipped");

    let current = run_json(dir.path(), &["task", "current", "pet"]);
    assert_eq!(current["task_index"], 0);
    assert_eq!(current["progress"]["total"], 2);

    let outcome = run_json(
        dir.path(),
        &["task", "complete", &ritual_id, "pet", "0", "--text", "done"],
    );
    assert_eq!(outcome["next_task_index"], 1);
    assert_eq!(outcome["is_complete"], false);

    let balance = run_json(dir.path(), &["account", "balance", "pet"]);
    assert_eq!(balance["token_balance"], 15);

    let pending = run_json(dir.path(), &["notify", "list", "pet"]);
    assert_eq!(pending.as_array().unwrap().len(), 1);

    let (_, stderr, code) = run_cli(
        dir.path(),
        &["task", "complete", &ritual_id, "pet", "0", "--text", "again"],
    );
    assert_eq!(code, 1);
    assert!(stderr.contains("current task is 1"));
}

#[test]
fn test_config_set_and_get() {
    let dir = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(dir.path(), &["config", "set", "sessions.ttl_secs", "30"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "ok");

    let (stdout, _, code) = run_cli(dir.path(), &["config", "get", "sessions.ttl_secs"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "30");
}
