//! MCP (Model Context Protocol) tool servers.
//!
//! Two transports are supported: a subprocess speaking newline-delimited
//! JSON-RPC over stdio, and an HTTP endpoint (streamable HTTP, JSON or SSE
//! responses). Both share the tool listing and calling logic below.

pub mod http;
pub mod protocol;
pub mod stdio;

pub use http::McpHttpTransport;
pub use stdio::McpStdioTransport;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{ForgeError, Result};
use crate::tools::types::{CapabilityDescriptor, ToolOutput};

use protocol::{CallToolResult, ListToolsResult};

/// Upper bound on `tools/list` pages, guards against servers that repeat a cursor.
const MAX_LIST_PAGES: usize = 64;

/// Request/response channel to an MCP server.
#[async_trait]
pub(crate) trait McpChannel: Send + Sync {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value>;

    async fn notify(&self, method: &str) -> Result<()>;

    /// `initialize` followed by `notifications/initialized`.
    async fn handshake(&self) -> Result<()> {
        self.request("initialize", Some(protocol::initialize_params()))
            .await?;
        self.notify("notifications/initialized").await
    }

    /// Every tool the server offers, following pagination cursors.
    async fn list_tools(&self) -> Result<Vec<CapabilityDescriptor>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let value = self.request("tools/list", params).await?;
            let page: ListToolsResult = serde_json::from_value(value)
                .map_err(|e| ForgeError::Mcp(format!("Invalid tools/list result: {}", e)))?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }

        Ok(tools)
    }

    async fn call_tool(&self, name: &str, args: Value) -> Result<ToolOutput> {
        let value = self
            .request(
                "tools/call",
                Some(json!({ "name": name, "arguments": args })),
            )
            .await?;
        let result: CallToolResult = serde_json::from_value(value)
            .map_err(|e| ForgeError::Mcp(format!("Invalid tools/call result: {}", e)))?;
        Ok(result.into_output())
    }
}
