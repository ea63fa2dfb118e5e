//! MCP over streamable HTTP.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{ForgeError, Result};
use crate::tools::remote::{Connection, RemoteTransport};
use crate::tools::types::{CapabilityDescriptor, ProviderKind, ToolOutput};

use super::protocol::{parse_sse_response, JsonRpcRequest, JsonRpcResponse};
use super::McpChannel;

const SESSION_HEADER: &str = "Mcp-Session-Id";

/// Endpoint description for an HTTP tool server. Inert until opened.
#[derive(Debug, Clone)]
pub struct McpHttpTransport {
    provider_id: String,
    url: String,
    timeout: Duration,
}

impl McpHttpTransport {
    pub fn new(provider_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            url: url.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RemoteTransport for McpHttpTransport {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::RemoteHttp
    }

    async fn open(&self) -> Result<Arc<dyn Connection>> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ForgeError::Activation(format!("HTTP client: {}", e)))?;

        let connection = McpHttpConnection {
            provider_id: self.provider_id.clone(),
            url: self.url.clone(),
            client,
            session_id: RwLock::new(None),
            next_id: AtomicU64::new(1),
        };

        connection.handshake().await.map_err(|e| {
            ForgeError::Activation(format!(
                "MCP server '{}' at {} unreachable: {}",
                self.provider_id, self.url, e
            ))
        })?;

        info!(provider = %self.provider_id, url = %self.url, "MCP HTTP server connected");
        Ok(Arc::new(connection))
    }
}

/// Live connection to an HTTP tool server.
pub struct McpHttpConnection {
    provider_id: String,
    url: String,
    client: reqwest::Client,
    session_id: RwLock<Option<String>>,
    next_id: AtomicU64,
}

impl McpHttpConnection {
    async fn post(&self, body: &JsonRpcRequest) -> Result<reqwest::Response> {
        let mut request = self
            .client
            .post(&self.url)
            .header(ACCEPT, "application/json, text/event-stream")
            .json(body);
        if let Some(session) = self.session_id.read().await.as_deref() {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request.send().await?;
        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.write().await = Some(session.to_string());
        }

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ForgeError::Mcp(format!(
                "{} returned HTTP {}: {}",
                self.url,
                status,
                text.trim()
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl McpChannel for McpHttpConnection {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let response = self
            .post(&JsonRpcRequest::call(id, method, params))
            .await?;

        let is_sse = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("text/event-stream"))
            .unwrap_or(false);
        let body = response.text().await?;

        let parsed = if is_sse {
            parse_sse_response(&body, id).ok_or_else(|| {
                ForgeError::Mcp(format!("No response to {} in event stream", method))
            })?
        } else {
            serde_json::from_str::<JsonRpcResponse>(&body)?
        };
        parsed.into_result(method)
    }

    async fn notify(&self, method: &str) -> Result<()> {
        self.post(&JsonRpcRequest::notification(method)).await?;
        Ok(())
    }
}

#[async_trait]
impl Connection for McpHttpConnection {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    async fn list_capabilities(&self) -> Result<Vec<CapabilityDescriptor>> {
        self.list_tools().await
    }

    async fn invoke(&self, name: &str, args: Value) -> Result<ToolOutput> {
        self.call_tool(name, args).await
    }

    async fn close(&self) -> Result<()> {
        let Some(session) = self.session_id.write().await.take() else {
            return Ok(());
        };
        let response = self
            .client
            .delete(&self.url)
            .header(SESSION_HEADER, &session)
            .send()
            .await?;
        // Servers without explicit session termination answer 405
        if !response.status().is_success()
            && response.status() != reqwest::StatusCode::METHOD_NOT_ALLOWED
        {
            return Err(ForgeError::Mcp(format!(
                "Ending MCP session on {} returned HTTP {}",
                self.url,
                response.status()
            )));
        }
        debug!(provider = %self.provider_id, "MCP HTTP session closed");
        Ok(())
    }
}
