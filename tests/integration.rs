//! Integration tests for AgentForge
//!
//! These tests drive the full assembly path: tool configuration files are
//! loaded from disk, turned into specifications, activated, handed to an
//! agent, and the conversation is persisted through a session.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use agentforge::agent::{AgentFactory, AssembledAgent, EchoRuntime};
use agentforge::config::FactoryConfig;
use agentforge::session::{BackingStore, FileBackingStore, Role};
use agentforge::tools::{SpecOutcome, ToolConfigEntry, ToolConfigRegistry, ToolSpecFactory};
use tempfile::{tempdir, TempDir};

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn basics_tool(dir: &Path) -> PathBuf {
    write(
        dir,
        "basics.yaml",
        "type: python\nid: basics\nmodule_path: builtin\nfunctions:\n  - echo\n  - current_time\n",
    )
}

fn config_with(dir: &TempDir, tool_config_paths: Vec<PathBuf>) -> FactoryConfig {
    FactoryConfig {
        tool_config_paths,
        sessions_home: Some(dir.path().join("sessions")),
        ..FactoryConfig::default()
    }
}

// ============================================================================
// Tool Configuration Loading
// ============================================================================

#[test]
fn test_registry_loads_every_format() {
    let dir = tempdir().unwrap();
    let yaml = basics_tool(dir.path());
    let toml = write(
        dir.path(),
        "server.toml",
        "type = \"mcp\"\nid = \"files\"\ncommand = \"file-server\"\nargs = [\"--root\", \"/tmp\"]\n",
    );
    let json = write(
        dir.path(),
        "peers.json",
        r#"[
            {"type": "a2a", "id": "planner", "urls": ["http://localhost:9000"]},
            {"type": "carrier-pigeon", "id": "bird"}
        ]"#,
    );
    let missing = dir.path().join("missing.json");

    let registry = ToolConfigRegistry::load(&[yaml, toml, json, missing]);
    let ids: Vec<&str> = registry.entries().iter().map(ToolConfigEntry::id).collect();

    assert_eq!(registry.records().count(), 3);
    assert_eq!(registry.failures().count(), 2);
    assert!(ids.contains(&"basics"));
    assert!(ids.contains(&"files"));
    assert!(ids.contains(&"planner"));
    assert!(registry
        .failures()
        .any(|f| f.error.contains("Unknown tool type 'carrier-pigeon'")));
}

#[test]
fn test_specifications_are_built_without_io() {
    let dir = tempdir().unwrap();
    let server = write(
        dir.path(),
        "unreachable.json",
        r#"{"type": "mcp-http", "id": "far-away", "url": "http://192.0.2.1:1/mcp"}"#,
    );
    let disabled = write(
        dir.path(),
        "disabled.json",
        r#"{"type": "mcp", "id": "off", "command": "never-run", "disabled": true}"#,
    );

    let registry = ToolConfigRegistry::load(&[server, disabled]);
    let entries = ToolSpecFactory::default().build_all(&registry);

    assert_eq!(entries.len(), 2);
    match &entries[0].outcome {
        SpecOutcome::Built(spec) => assert!(spec.is_remote()),
        other => panic!("expected built spec, got {:?}", other),
    }
    assert!(matches!(entries[1].outcome, SpecOutcome::Disabled));
}

// ============================================================================
// Factory to Agent
// ============================================================================

#[tokio::test]
async fn test_agent_calls_local_tool_and_persists_session() {
    let dir = tempdir().unwrap();
    let mut config = config_with(&dir, vec![basics_tool(dir.path())]);
    config.session_id = Some("integration".to_string());

    let mut factory = AgentFactory::new(config);
    factory.initialize().await.unwrap();
    let agent = factory.create_agent(Arc::new(EchoRuntime::new())).await.unwrap();

    let mut names: Vec<String> = agent.list_capabilities().into_iter().map(|d| d.name).collect();
    names.sort();
    assert_eq!(names, vec!["current_time", "echo"]);

    let reply = agent
        .run_interaction(r#"!tool echo {"message": "through the tool"}"#)
        .await
        .unwrap();
    assert_eq!(reply, "through the tool");
    agent.shutdown().await.unwrap();

    let store = FileBackingStore::new(dir.path().join("sessions"));
    let stored = store
        .open("integration", agent.sessions().strategy())
        .await
        .unwrap();
    let roles: Vec<Role> = stored.messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
    assert!(stored.messages[1].has_tool_calls());
}

#[tokio::test]
async fn test_second_agent_resumes_session() {
    let dir = tempdir().unwrap();
    let mut config = config_with(&dir, vec![basics_tool(dir.path())]);
    config.session_id = Some("resume".to_string());

    {
        let mut factory = AgentFactory::new(config.clone());
        factory.initialize().await.unwrap();
        let agent = factory.create_agent(Arc::new(EchoRuntime::new())).await.unwrap();
        assert_eq!(agent.run_interaction("remember me").await.unwrap(), "remember me");
        agent.shutdown().await.unwrap();
    }

    let mut factory = AgentFactory::new(config);
    factory.initialize().await.unwrap();
    let agent = factory.create_agent(Arc::new(EchoRuntime::new())).await.unwrap();
    let conversation = agent.sessions().conversation();
    assert_eq!(conversation.read().await.messages()[0].content, "remember me");

    agent.clear_history().await;
    assert!(conversation.read().await.is_empty());
    assert_eq!(agent.sessions().list_sessions().await.unwrap(), vec!["resume"]);

    // Shutdown saves; the cleared history must survive it
    agent.shutdown().await.unwrap();
    let stored = FileBackingStore::new(dir.path().join("sessions"))
        .open("resume", agent.sessions().strategy())
        .await
        .unwrap();
    let contents: Vec<&str> = stored.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["remember me", "remember me"]);
}

#[tokio::test]
async fn test_failed_providers_do_not_block_agent() {
    let dir = tempdir().unwrap();
    let ghost = write(
        dir.path(),
        "ghost.json",
        r#"{"type": "mcp", "id": "ghost", "command": "/nonexistent/agentforge-mcp-server"}"#,
    );
    let broken = write(dir.path(), "broken.json", "{ this is not json");
    let config = config_with(&dir, vec![basics_tool(dir.path()), ghost, broken]);

    let mut factory = AgentFactory::new(config);
    factory.initialize().await.unwrap();
    assert_eq!(factory.spec_entries().len(), 3);

    let agent = factory.create_agent(Arc::new(EchoRuntime::new())).await.unwrap();
    assert_eq!(agent.report().failures.len(), 1);
    assert_eq!(agent.report().failures[0].provider_id, "ghost");
    assert!(agent.tools().has("echo"));

    let reply = agent.run_interaction("!tool echo {\"message\": \"still here\"}").await.unwrap();
    assert_eq!(reply, "still here");
    agent.shutdown().await.unwrap();
    // Second shutdown is a no-op
    agent.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_create_agent_requires_initialize() {
    let dir = tempdir().unwrap();
    let factory = AgentFactory::new(config_with(&dir, Vec::new()));
    assert!(factory.create_agent(Arc::new(EchoRuntime::new())).await.is_err());
}

// ============================================================================
// Tool Servers
// ============================================================================

/// Minimal line-delimited MCP server: handshake, one tool, one call.
#[cfg(unix)]
const SHELL_SERVER: &str = r#"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
  case "$line" in
    *'"initialize"'*)
      echo "{\"jsonrpc\":\"2.0\",\"id\":$id,\"result\":{\"protocolVersion\":\"2024-11-05\",\"capabilities\":{}}}" ;;
    *'"tools/list"'*)
      echo "{\"jsonrpc\":\"2.0\",\"id\":$id,\"result\":{\"tools\":[{\"name\":\"shout\",\"description\":\"Upper-cases text\",\"inputSchema\":{\"type\":\"object\"}}]}}" ;;
    *'"tools/call"'*)
      echo "{\"jsonrpc\":\"2.0\",\"id\":$id,\"result\":{\"content\":[{\"type\":\"text\",\"text\":\"HELLO\"}]}}" ;;
  esac
done
"#;

#[cfg(unix)]
#[tokio::test]
async fn test_stdio_tool_server_end_to_end() {
    let dir = tempdir().unwrap();
    let record = serde_json::json!({
        "type": "mcp",
        "id": "shouter",
        "command": "sh",
        "args": ["-c", SHELL_SERVER],
        "timeout_secs": 10
    });
    let server = write(dir.path(), "shouter.json", &record.to_string());
    let config = config_with(&dir, vec![basics_tool(dir.path()), server]);

    let mut factory = AgentFactory::new(config);
    factory.initialize().await.unwrap();
    let agent = factory.create_agent(Arc::new(EchoRuntime::new())).await.unwrap();

    assert!(agent.report().failures.is_empty(), "{:?}", agent.report().failures);
    assert_eq!(agent.tools().names_for_provider("shouter"), vec!["shout"]);

    let reply = agent.run_interaction("!tool shout {\"text\": \"hello\"}").await.unwrap();
    assert_eq!(reply, "HELLO");
    agent.shutdown().await.unwrap();
}
