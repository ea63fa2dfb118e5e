//! Tool types for AgentForge
//!
//! This module defines the core types for tool execution: the `Tool` trait
//! every capability implements, the `ToolContext` passed to each call and the
//! descriptors exchanged with remote tool providers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Closed set of tool provider kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// In-process callables resolved at build time
    LocalCallable,
    /// Tool server launched as a subprocess (stdio)
    RemoteProcess,
    /// Tool server reached over HTTP
    RemoteHttp,
    /// Peer agent reached over agent-to-agent RPC
    PeerAgent,
}

impl ProviderKind {
    /// Whether specifications of this kind hold a deferred connection.
    pub fn is_remote(&self) -> bool {
        !matches!(self, ProviderKind::LocalCallable)
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LocalCallable => write!(f, "local"),
            Self::RemoteProcess => write!(f, "remote_process"),
            Self::RemoteHttp => write!(f, "remote_http"),
            Self::PeerAgent => write!(f, "peer_agent"),
        }
    }
}

/// Result of a single tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Text handed back to the model
    pub content: String,
    /// Whether this result represents an error condition
    pub is_error: bool,
}

impl ToolOutput {
    /// Successful result.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    /// Error result. The model sees the message and may retry.
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// A capability as described by a remote provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    /// Name as known to the provider
    pub name: String,
    /// Human readable description
    #[serde(default)]
    pub description: String,
    /// JSON schema for the arguments
    #[serde(default = "empty_object_schema", rename = "inputSchema", alias = "input_schema")]
    pub input_schema: Value,
}

impl CapabilityDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// JSON schema accepting any object.
pub fn empty_object_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

/// Tool definition handed to the model runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    /// Provider that owns the tool; invocations are routed back to it
    pub provider_id: String,
}

/// Execution context passed to tools.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Active session name, if any
    pub session_id: Option<String>,
    /// Working directory for tools that touch the filesystem
    pub workspace: Option<String>,
}

impl ToolContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }
}

/// A callable capability.
///
/// Implemented by in-process tools, executable plugins and wrappers around
/// capabilities discovered on remote connections.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name the model uses to call the tool.
    fn name(&self) -> &str;

    /// Description shown to the model.
    fn description(&self) -> &str;

    /// JSON schema for the arguments.
    fn parameters(&self) -> Value;

    /// Id of the provider that produced this tool.
    fn provider_id(&self) -> &str;

    /// Run the tool.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput>;

    /// Definition handed to the model runtime.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
            provider_id: self.provider_id().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_provider_kind_remote() {
        assert!(!ProviderKind::LocalCallable.is_remote());
        assert!(ProviderKind::RemoteProcess.is_remote());
        assert!(ProviderKind::RemoteHttp.is_remote());
        assert!(ProviderKind::PeerAgent.is_remote());
        assert_eq!(ProviderKind::PeerAgent.to_string(), "peer_agent");
    }

    #[test]
    fn test_tool_output_constructors() {
        assert!(!ToolOutput::text("ok").is_error);
        let err = ToolOutput::error("boom");
        assert!(err.is_error);
        assert_eq!(err.content, "boom");
    }

    #[test]
    fn test_capability_descriptor_from_mcp_shape() {
        let desc: CapabilityDescriptor = serde_json::from_value(json!({
            "name": "read_file",
            "description": "Read a file",
            "inputSchema": {"type": "object", "properties": {"path": {"type": "string"}}}
        }))
        .unwrap();
        assert_eq!(desc.name, "read_file");
        assert_eq!(desc.input_schema["properties"]["path"]["type"], "string");
    }

    #[test]
    fn test_capability_descriptor_defaults() {
        let desc: CapabilityDescriptor = serde_json::from_value(json!({"name": "ping"})).unwrap();
        assert_eq!(desc.description, "");
        assert_eq!(desc.input_schema, empty_object_schema());
    }

    #[test]
    fn test_tool_context_builder() {
        let ctx = ToolContext::new().with_session("s1").with_workspace("/tmp");
        assert_eq!(ctx.session_id.as_deref(), Some("s1"));
        assert_eq!(ctx.workspace.as_deref(), Some("/tmp"));
    }
}
