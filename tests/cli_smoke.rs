//! CLI smoke tests - run the compiled binary against temp directories.
//!
//! Every test points `--config` and `HOME` at a fresh temp directory so the
//! user's own configuration and sessions are never read or touched. No
//! network access required.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use tempfile::tempdir;

/// Helper: run agentforge with given args and return (exit_code, stdout, stderr).
fn run_cli(home: &Path, args: &[&str]) -> (i32, String, String) {
    let bin = env!("CARGO_BIN_EXE_agentforge");
    let output = Command::new(bin)
        .args(args)
        .env("HOME", home)
        .env("RUST_LOG", "error")
        .env_remove("AGENTFORGE_SESSION_ID")
        .env_remove("AGENTFORGE_SESSIONS_HOME")
        .output()
        .expect("failed to execute agentforge binary");
    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (code, stdout, stderr)
}

/// Helper: like `run_cli`, feeding `input` on stdin.
fn run_cli_with_input(home: &Path, args: &[&str], input: &str) -> (i32, String, String) {
    let bin = env!("CARGO_BIN_EXE_agentforge");
    let mut child = Command::new(bin)
        .args(args)
        .env("HOME", home)
        .env("RUST_LOG", "error")
        .env_remove("AGENTFORGE_SESSION_ID")
        .env_remove("AGENTFORGE_SESSIONS_HOME")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to execute agentforge binary");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    let output = child.wait_with_output().unwrap();
    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (code, stdout, stderr)
}

fn write_builtin_tools(dir: &Path) -> String {
    let path = dir.join("basics.json");
    std::fs::write(
        &path,
        r#"{"type": "python", "id": "basics", "module_path": "builtin", "functions": ["echo", "current_time"]}"#,
    )
    .unwrap();
    path.to_string_lossy().into_owned()
}

// ============================================================================
// Help & Version
// ============================================================================

#[test]
fn cli_no_args_shows_help() {
    let home = tempdir().unwrap();
    let (code, stdout, _stderr) = run_cli(home.path(), &[]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("agentforge"));
}

#[test]
fn cli_help_lists_commands() {
    let home = tempdir().unwrap();
    let (code, stdout, _stderr) = run_cli(home.path(), &["--help"]);
    assert_eq!(code, 0);
    for command in ["tools", "sessions", "chat", "config", "version"] {
        assert!(stdout.contains(command), "missing {} in help", command);
    }
}

#[test]
fn cli_version_command() {
    let home = tempdir().unwrap();
    let (code, stdout, _stderr) = run_cli(home.path(), &["version"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("agentforge"));
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn cli_config_check_without_file() {
    let home = tempdir().unwrap();
    let (code, stdout, _stderr) = run_cli(home.path(), &["config", "check"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("No config file found"), "{}", stdout);
}

#[test]
fn cli_config_check_valid_file() {
    let home = tempdir().unwrap();
    let config = home.path().join("config.yaml");
    std::fs::write(&config, "model: echo:default\nactivation:\n  max_concurrency: 2\n").unwrap();

    let (code, stdout, _stderr) = run_cli(
        home.path(),
        &["--config", config.to_str().unwrap(), "config", "check"],
    );
    assert_eq!(code, 0, "{}", stdout);
    assert!(stdout.contains("Configuration looks good"));
}

#[test]
fn cli_config_check_reports_errors() {
    let home = tempdir().unwrap();
    let config = home.path().join("config.json");
    std::fs::write(&config, r#"{"conversation": {"manager": "forgetful"}}"#).unwrap();

    let (code, stdout, _stderr) = run_cli(
        home.path(),
        &["--config", config.to_str().unwrap(), "config", "check"],
    );
    assert_eq!(code, 1);
    assert!(stdout.contains("[ERROR]"), "{}", stdout);
}

// ============================================================================
// Tools
// ============================================================================

#[test]
fn cli_tools_list_builtin() {
    let home = tempdir().unwrap();
    let tools = write_builtin_tools(home.path());

    let (code, stdout, stderr) = run_cli(home.path(), &["tools", "list", "--tool-config", &tools]);
    assert_eq!(code, 0, "{}", stderr);
    assert!(stdout.contains("basics"));
    assert!(stdout.contains("echo"));
    assert!(stdout.contains("current_time"));
}

#[test]
fn cli_tools_list_json_reports_failures() {
    let home = tempdir().unwrap();
    let tools = write_builtin_tools(home.path());
    let ghost = home.path().join("ghost.json");
    std::fs::write(
        &ghost,
        r#"{"type": "mcp", "id": "ghost", "command": "/nonexistent/agentforge-mcp"}"#,
    )
    .unwrap();

    let (code, stdout, stderr) = run_cli(
        home.path(),
        &[
            "tools",
            "list",
            "--json",
            "--tool-config",
            &tools,
            "--tool-config",
            ghost.to_str().unwrap(),
        ],
    );
    assert_eq!(code, 0, "{}", stderr);
    let out: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(out["tools"].as_array().unwrap().len(), 2);
    assert_eq!(out["failures"].as_array().unwrap().len(), 1);
    assert_eq!(out["failures"][0]["provider_id"], "ghost");
}

#[test]
fn cli_tools_call_echo() {
    let home = tempdir().unwrap();
    let tools = write_builtin_tools(home.path());

    let (code, stdout, stderr) = run_cli(
        home.path(),
        &[
            "tools",
            "call",
            "echo",
            "--args",
            r#"{"message": "smoke"}"#,
            "--tool-config",
            &tools,
        ],
    );
    assert_eq!(code, 0, "{}", stderr);
    assert_eq!(stdout.trim(), "smoke");
}

#[test]
fn cli_tools_call_unknown_tool_fails() {
    let home = tempdir().unwrap();
    let tools = write_builtin_tools(home.path());

    let (code, _stdout, stderr) =
        run_cli(home.path(), &["tools", "call", "nope", "--tool-config", &tools]);
    assert_ne!(code, 0);
    assert!(stderr.contains("Tool not found"), "{}", stderr);
}

// ============================================================================
// Sessions & Chat
// ============================================================================

#[test]
fn cli_sessions_list_empty() {
    let home = tempdir().unwrap();
    let sessions = home.path().join("sessions");
    let (code, stdout, _stderr) = run_cli(
        home.path(),
        &["sessions", "list", "--home", sessions.to_str().unwrap()],
    );
    assert_eq!(code, 0);
    assert!(stdout.contains("No sessions"));
}

#[test]
fn cli_chat_one_shot_creates_session() {
    let home = tempdir().unwrap();
    let tools = write_builtin_tools(home.path());

    let (code, stdout, stderr) = run_cli(
        home.path(),
        &[
            "chat",
            "-m",
            "!tool echo {\"message\": \"via chat\"}",
            "--session",
            "smoke",
            "--tool-config",
            &tools,
        ],
    );
    assert_eq!(code, 0, "{}", stderr);
    assert_eq!(stdout.trim(), "via chat");

    let sessions = home.path().join(".agentforge").join("sessions");
    let (code, stdout, _stderr) = run_cli(
        home.path(),
        &["sessions", "list", "--home", sessions.to_str().unwrap()],
    );
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "smoke");

    let (code, _stdout, _stderr) = run_cli(
        home.path(),
        &["sessions", "delete", "smoke", "--home", sessions.to_str().unwrap()],
    );
    assert_eq!(code, 0);
    let (code, _stdout, stderr) = run_cli(
        home.path(),
        &["sessions", "delete", "smoke", "--home", sessions.to_str().unwrap()],
    );
    assert_ne!(code, 0);
    assert!(stderr.contains("Session not found"));
}

#[test]
fn cli_chat_survives_failed_session_switch() {
    let home = tempdir().unwrap();
    let tools = write_builtin_tools(home.path());

    let (code, stdout, stderr) = run_cli_with_input(
        home.path(),
        &["chat", "--tool-config", &tools],
        "/session x/../../escape\nstill talking\n/quit\n",
    );
    assert_eq!(code, 0, "{}", stderr);
    assert!(stderr.contains("Invalid session name"), "{}", stderr);
    assert!(stdout.contains("still talking"), "{}", stdout);
    assert!(!home.path().join("escape").exists());
}
