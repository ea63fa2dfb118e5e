//! Tool configuration records.
//!
//! Loads tool provider records from JSON, YAML or TOML files and classifies
//! each one by its `type` tag. Loading is the only I/O done here; nothing is
//! spawned or connected. A file that cannot be read, or a record with an
//! unknown tag, becomes a failed entry so that it is reported rather than
//! silently skipped.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::load_structured_file;
use crate::error::{ForgeError, Result};

use super::types::ProviderKind;

pub const TOOL_TYPE_PYTHON: &str = "python";
pub const TOOL_TYPE_LOCAL: &str = "local";
pub const TOOL_TYPE_MCP: &str = "mcp";
pub const TOOL_TYPE_MCP_STDIO: &str = "mcp-stdio";
pub const TOOL_TYPE_MCP_HTTP: &str = "mcp-http";
pub const TOOL_TYPE_A2A: &str = "a2a";

/// Every accepted `type` tag.
pub const KNOWN_TOOL_TYPES: &[&str] = &[
    TOOL_TYPE_PYTHON,
    TOOL_TYPE_LOCAL,
    TOOL_TYPE_MCP,
    TOOL_TYPE_MCP_STDIO,
    TOOL_TYPE_MCP_HTTP,
    TOOL_TYPE_A2A,
];

pub const DEFAULT_TOOL_ID: &str = "unknown";
pub const DEFAULT_LOCAL_TOOL_ID: &str = "unknown-python-tool";
pub const DEFAULT_MCP_SERVER_ID: &str = "unknown-mcp-server";
pub const DEFAULT_A2A_PROVIDER_ID: &str = "unknown-a2a-provider";
pub const FAILED_CONFIG_PREFIX: &str = "failed-config-";

// ============================================================================
// Provider payloads
// ============================================================================

/// In-process callables resolved from a module.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LocalToolConfig {
    /// Module holding the callables (catalog name or directory path)
    pub module_path: String,
    /// Function names to load; dotted names use their last segment
    #[serde(default)]
    pub functions: Vec<String>,
    /// Directory searched for executable callables, relative to the source file
    #[serde(default)]
    pub package_path: Option<String>,
}

/// Remote tool server reached over stdio or HTTP.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct McpToolConfig {
    /// Command launching a stdio server
    #[serde(default)]
    pub command: Option<String>,
    /// Arguments for `command`
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment for `command`, merged over the current environment
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Endpoint of an HTTP server
    #[serde(default)]
    pub url: Option<String>,
    /// Allow-list of capabilities. Empty keeps everything.
    #[serde(default)]
    pub functions: Vec<String>,
    /// Per-request timeout in seconds (default: 30)
    #[serde(default = "default_mcp_timeout")]
    pub timeout_secs: u64,
}

fn default_mcp_timeout() -> u64 {
    30
}

/// Peer agents reached over agent-to-agent RPC.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PeerAgentConfig {
    /// Base URLs of known agents
    #[serde(default)]
    pub urls: Vec<String>,
    /// HTTP timeout in seconds (default: 300)
    #[serde(default = "default_a2a_timeout")]
    pub timeout: u64,
    /// Push-notification endpoint handed to peers
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Token sent with push notifications
    #[serde(default)]
    pub webhook_token: Option<String>,
}

fn default_a2a_timeout() -> u64 {
    300
}

/// Provider-specific part of a record, one variant per provider family.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolProviderConfig {
    Local(LocalToolConfig),
    Mcp(McpToolConfig),
    PeerAgent(PeerAgentConfig),
}

// ============================================================================
// Records
// ============================================================================

/// One tool provider record. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolConfigRecord {
    /// Unique provider id
    pub id: String,
    /// The `type` tag as written
    pub type_tag: String,
    /// Disabled records are skipped before reaching the factory
    pub disabled: bool,
    /// File the record was read from
    pub source_file: Option<PathBuf>,
    /// Provider payload
    pub provider: ToolProviderConfig,
}

#[derive(Deserialize)]
struct RecordHeader {
    #[serde(rename = "type")]
    type_tag: Option<String>,
    id: Option<String>,
    #[serde(default)]
    disabled: bool,
}

impl ToolConfigRecord {
    /// Classify and parse a raw record.
    ///
    /// Unknown or missing `type` tags are rejected here, so the factory only
    /// ever sees known provider kinds.
    pub fn from_value(value: &Value, source_file: Option<&Path>) -> Result<Self> {
        if !value.is_object() {
            return Err(ForgeError::Config(
                "Tool configuration must be an object".to_string(),
            ));
        }
        let header: RecordHeader = serde_json::from_value(value.clone())
            .map_err(|e| ForgeError::Config(format!("Invalid tool configuration: {}", e)))?;

        let type_tag = header
            .type_tag
            .ok_or_else(|| ForgeError::Config("Tool configuration missing 'type'".to_string()))?;

        let payload_error = |e: serde_json::Error| {
            ForgeError::Config(format!("{} tool configuration invalid: {}", type_tag, e))
        };

        let (provider, default_id) = match type_tag.as_str() {
            TOOL_TYPE_PYTHON | TOOL_TYPE_LOCAL => (
                ToolProviderConfig::Local(
                    serde_json::from_value(value.clone()).map_err(payload_error)?,
                ),
                DEFAULT_LOCAL_TOOL_ID,
            ),
            TOOL_TYPE_MCP | TOOL_TYPE_MCP_STDIO | TOOL_TYPE_MCP_HTTP => (
                ToolProviderConfig::Mcp(
                    serde_json::from_value(value.clone()).map_err(payload_error)?,
                ),
                DEFAULT_MCP_SERVER_ID,
            ),
            TOOL_TYPE_A2A => (
                ToolProviderConfig::PeerAgent(
                    serde_json::from_value(value.clone()).map_err(payload_error)?,
                ),
                DEFAULT_A2A_PROVIDER_ID,
            ),
            other => {
                return Err(ForgeError::Config(format!("Unknown tool type '{}'", other)));
            }
        };

        Ok(Self {
            id: header.id.unwrap_or_else(|| default_id.to_string()),
            type_tag,
            disabled: header.disabled,
            source_file: source_file.map(Path::to_path_buf),
            provider,
        })
    }

    /// Provider kind of this record.
    ///
    /// Tool servers with a `command` are stdio processes even when a `url`
    /// is also present.
    pub fn kind(&self) -> ProviderKind {
        match &self.provider {
            ToolProviderConfig::Local(_) => ProviderKind::LocalCallable,
            ToolProviderConfig::PeerAgent(_) => ProviderKind::PeerAgent,
            ToolProviderConfig::Mcp(mcp) => {
                if mcp.command.is_some() {
                    ProviderKind::RemoteProcess
                } else if mcp.url.is_some() || self.type_tag == TOOL_TYPE_MCP_HTTP {
                    ProviderKind::RemoteHttp
                } else {
                    ProviderKind::RemoteProcess
                }
            }
        }
    }

    /// Directory of the source file, used to resolve relative paths.
    pub fn base_dir(&self) -> Option<&Path> {
        self.source_file.as_deref().and_then(Path::parent)
    }
}

/// A record that could not be loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedToolConfig {
    pub id: String,
    pub source_file: Option<PathBuf>,
    pub error: String,
}

impl FailedToolConfig {
    fn for_file(path: &Path, suffix: Option<usize>, error: &ForgeError) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_TOOL_ID.to_string());
        let id = match suffix {
            Some(index) => format!("{}{}#{}", FAILED_CONFIG_PREFIX, name, index),
            None => format!("{}{}", FAILED_CONFIG_PREFIX, name),
        };
        Self {
            id,
            source_file: Some(path.to_path_buf()),
            error: error.to_string(),
        }
    }
}

/// A loaded record or the reason it failed.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolConfigEntry {
    Loaded(ToolConfigRecord),
    Failed(FailedToolConfig),
}

impl ToolConfigEntry {
    pub fn id(&self) -> &str {
        match self {
            Self::Loaded(record) => &record.id,
            Self::Failed(failed) => &failed.id,
        }
    }

    pub fn source_file(&self) -> Option<&Path> {
        match self {
            Self::Loaded(record) => record.source_file.as_deref(),
            Self::Failed(failed) => failed.source_file.as_deref(),
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Ordered collection of tool configuration entries.
#[derive(Debug, Clone, Default)]
pub struct ToolConfigRegistry {
    entries: Vec<ToolConfigEntry>,
}

impl ToolConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load records from configuration files.
    ///
    /// Files holding an array contribute one record per element.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Self {
        let mut registry = Self::new();
        let mut good = 0usize;
        let mut bad = 0usize;

        for path in paths {
            let path = path.as_ref();
            let value = match load_structured_file(path) {
                Ok(value) => value,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Error loading tool config");
                    registry
                        .entries
                        .push(ToolConfigEntry::Failed(FailedToolConfig::for_file(path, None, &e)));
                    bad += 1;
                    continue;
                }
            };

            let items: Vec<(Option<usize>, Value)> = match value {
                Value::Array(items) => items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| (Some(i), v))
                    .collect(),
                other => vec![(None, other)],
            };

            for (index, item) in items {
                match ToolConfigRecord::from_value(&item, Some(path)) {
                    Ok(record) => {
                        info!(id = %record.id, file = %path.display(), "Loaded tool config");
                        registry.entries.push(ToolConfigEntry::Loaded(record));
                        good += 1;
                    }
                    Err(e) => {
                        warn!(file = %path.display(), error = %e, "Invalid tool config");
                        registry.entries.push(ToolConfigEntry::Failed(
                            FailedToolConfig::for_file(path, index, &e),
                        ));
                        bad += 1;
                    }
                }
            }
        }

        debug!(
            good,
            bad,
            files = paths.len(),
            "Tool config discovery complete"
        );
        registry
    }

    /// Build records from in-memory values (no provenance).
    pub fn from_values<I: IntoIterator<Item = Value>>(values: I) -> Self {
        let entries = values
            .into_iter()
            .enumerate()
            .map(|(i, value)| match ToolConfigRecord::from_value(&value, None) {
                Ok(record) => ToolConfigEntry::Loaded(record),
                Err(e) => ToolConfigEntry::Failed(FailedToolConfig {
                    id: value
                        .get("id")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("{}{}", FAILED_CONFIG_PREFIX, i)),
                    source_file: None,
                    error: e.to_string(),
                }),
            })
            .collect();
        Self { entries }
    }

    pub fn push(&mut self, record: ToolConfigRecord) {
        self.entries.push(ToolConfigEntry::Loaded(record));
    }

    pub fn entries(&self) -> &[ToolConfigEntry] {
        &self.entries
    }

    /// Successfully loaded records, in load order.
    pub fn records(&self) -> impl Iterator<Item = &ToolConfigRecord> {
        self.entries.iter().filter_map(|e| match e {
            ToolConfigEntry::Loaded(record) => Some(record),
            ToolConfigEntry::Failed(_) => None,
        })
    }

    /// Entries that failed to load.
    pub fn failures(&self) -> impl Iterator<Item = &FailedToolConfig> {
        self.entries.iter().filter_map(|e| match e {
            ToolConfigEntry::Failed(failed) => Some(failed),
            ToolConfigEntry::Loaded(_) => None,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_local_record() {
        let record = ToolConfigRecord::from_value(
            &json!({"type": "python", "id": "math", "module_path": "builtin", "functions": ["echo"]}),
            None,
        )
        .unwrap();
        assert_eq!(record.id, "math");
        assert_eq!(record.kind(), ProviderKind::LocalCallable);
        assert!(!record.disabled);
        match record.provider {
            ToolProviderConfig::Local(local) => assert_eq!(local.functions, vec!["echo"]),
            other => panic!("unexpected provider {:?}", other),
        }
    }

    #[test]
    fn test_mcp_kind_by_transport() {
        let stdio = ToolConfigRecord::from_value(
            &json!({"type": "mcp", "id": "fs", "command": "fs-server", "url": "http://x"}),
            None,
        )
        .unwrap();
        assert_eq!(stdio.kind(), ProviderKind::RemoteProcess);

        let http =
            ToolConfigRecord::from_value(&json!({"type": "mcp", "id": "web", "url": "http://x"}), None)
                .unwrap();
        assert_eq!(http.kind(), ProviderKind::RemoteHttp);

        let tagged_http =
            ToolConfigRecord::from_value(&json!({"type": "mcp-http", "id": "none"}), None).unwrap();
        assert_eq!(tagged_http.kind(), ProviderKind::RemoteHttp);
    }

    #[test]
    fn test_mcp_defaults() {
        let record =
            ToolConfigRecord::from_value(&json!({"type": "mcp-stdio", "command": "srv"}), None)
                .unwrap();
        assert_eq!(record.id, DEFAULT_MCP_SERVER_ID);
        match record.provider {
            ToolProviderConfig::Mcp(mcp) => {
                assert_eq!(mcp.timeout_secs, 30);
                assert!(mcp.functions.is_empty());
                assert!(mcp.env.is_empty());
            }
            other => panic!("unexpected provider {:?}", other),
        }
    }

    #[test]
    fn test_a2a_defaults() {
        let record = ToolConfigRecord::from_value(
            &json!({"type": "a2a", "urls": ["http://agent:9000"], "disabled": true}),
            None,
        )
        .unwrap();
        assert_eq!(record.id, DEFAULT_A2A_PROVIDER_ID);
        assert!(record.disabled);
        assert_eq!(record.kind(), ProviderKind::PeerAgent);
        match record.provider {
            ToolProviderConfig::PeerAgent(peer) => {
                assert_eq!(peer.timeout, 300);
                assert!(peer.webhook_url.is_none());
            }
            other => panic!("unexpected provider {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = ToolConfigRecord::from_value(&json!({"type": "grpc", "id": "x"}), None)
            .unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: Unknown tool type 'grpc'");
    }

    #[test]
    fn test_missing_type_rejected() {
        assert!(ToolConfigRecord::from_value(&json!({"id": "x"}), None).is_err());
        assert!(ToolConfigRecord::from_value(&json!("mcp"), None).is_err());
    }

    #[test]
    fn test_local_missing_module_path_rejected() {
        let err = ToolConfigRecord::from_value(&json!({"type": "python", "functions": ["a"]}), None)
            .unwrap_err();
        assert!(err.to_string().contains("module_path"));
    }

    #[test]
    fn test_load_files_with_provenance() {
        let dir = TempDir::new().unwrap();
        let json_path = dir.path().join("fs.json");
        std::fs::write(&json_path, r#"{"type": "mcp", "id": "fs", "command": "fs-server"}"#)
            .unwrap();
        let yaml_path = dir.path().join("peers.yaml");
        std::fs::write(&yaml_path, "type: a2a\nid: peers\nurls:\n  - http://localhost:9000\n")
            .unwrap();
        let broken_path = dir.path().join("broken.json");
        std::fs::write(&broken_path, "{not json").unwrap();
        let missing_path = dir.path().join("missing.json");

        let registry =
            ToolConfigRegistry::load(&[&json_path, &yaml_path, &broken_path, &missing_path]);
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.records().count(), 2);

        let fs = registry.records().next().unwrap();
        assert_eq!(fs.source_file.as_deref(), Some(json_path.as_path()));
        assert_eq!(fs.base_dir(), Some(dir.path()));

        let failed: Vec<_> = registry.failures().collect();
        assert_eq!(failed.len(), 2);
        assert_eq!(failed[0].id, "failed-config-broken.json");
        assert_eq!(failed[1].id, "failed-config-missing.json");
        assert_eq!(failed[1].source_file.as_deref(), Some(missing_path.as_path()));
    }

    #[test]
    fn test_load_array_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tools.toml.json");
        std::fs::write(
            &path,
            r#"[{"type": "local", "id": "a", "module_path": "builtin", "functions": ["echo"]},
                {"type": "smtp", "id": "b"}]"#,
        )
        .unwrap();

        let registry = ToolConfigRegistry::load(&[path]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.entries()[0].id(), "a");
        assert_eq!(registry.entries()[1].id(), "failed-config-tools.toml.json#1");
    }

    #[test]
    fn test_from_values() {
        let registry = ToolConfigRegistry::from_values(vec![
            json!({"type": "a2a", "id": "peers", "urls": ["http://a"]}),
            json!({"type": "carrier-pigeon", "id": "bird"}),
        ]);
        assert_eq!(registry.records().count(), 1);
        let failed: Vec<_> = registry.failures().collect();
        assert_eq!(failed[0].id, "bird");
        assert!(failed[0].error.contains("carrier-pigeon"));
        assert!(failed[0].source_file.is_none());
    }
}
