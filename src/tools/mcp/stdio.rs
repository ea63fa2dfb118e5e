//! MCP over a subprocess's stdin/stdout.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

use crate::error::{ForgeError, Result};
use crate::tools::remote::{Connection, RemoteTransport};
use crate::tools::types::{CapabilityDescriptor, ProviderKind, ToolOutput};
use crate::utils::string::preview;

use super::protocol::{JsonRpcRequest, JsonRpcResponse};
use super::McpChannel;

/// Launch description for a stdio tool server. Inert until opened.
#[derive(Debug, Clone)]
pub struct McpStdioTransport {
    provider_id: String,
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    timeout: Duration,
}

impl McpStdioTransport {
    pub fn new(provider_id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Extra variables merged over the inherited environment.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

#[async_trait]
impl RemoteTransport for McpStdioTransport {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::RemoteProcess
    }

    async fn open(&self) -> Result<Arc<dyn Connection>> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ForgeError::Activation(format!(
                    "Failed to start MCP server '{}' ({}): {}",
                    self.provider_id, self.command, e
                ))
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.start_kill();
            return Err(ForgeError::Activation(format!(
                "MCP server '{}' has no stdio pipes",
                self.provider_id
            )));
        };

        if let Some(stderr) = child.stderr.take() {
            let provider = self.provider_id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(provider = %provider, "mcp stderr: {}", line);
                }
            });
        }

        let connection = McpStdioConnection {
            provider_id: self.provider_id.clone(),
            io: Mutex::new(StdioPipes {
                stdin,
                stdout: BufReader::new(stdout),
            }),
            child: Mutex::new(Some(child)),
            next_id: AtomicU64::new(1),
            timeout: self.timeout,
        };

        if let Err(e) = connection.handshake().await {
            let _ = connection.close().await;
            return Err(ForgeError::Activation(format!(
                "MCP server '{}' handshake failed: {}",
                self.provider_id, e
            )));
        }

        info!(provider = %self.provider_id, command = %self.command, "MCP stdio server started");
        Ok(Arc::new(connection))
    }
}

struct StdioPipes {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Live connection to a stdio tool server.
pub struct McpStdioConnection {
    provider_id: String,
    io: Mutex<StdioPipes>,
    child: Mutex<Option<Child>>,
    next_id: AtomicU64,
    timeout: Duration,
}

impl McpStdioConnection {
    async fn write_message(pipes: &mut StdioPipes, message: &JsonRpcRequest) -> Result<()> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        pipes.stdin.write_all(line.as_bytes()).await?;
        pipes.stdin.flush().await?;
        Ok(())
    }

    async fn read_response(&self, pipes: &mut StdioPipes, id: u64) -> Result<JsonRpcResponse> {
        let mut line = String::new();
        loop {
            line.clear();
            let read = pipes.stdout.read_line(&mut line).await?;
            if read == 0 {
                return Err(ForgeError::Mcp(format!(
                    "MCP server '{}' closed its output",
                    self.provider_id
                )));
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(response) if response.answers(id) => return Ok(response),
                // Notifications and unrelated messages
                Ok(_) => trace!(
                    provider = %self.provider_id,
                    "Skipping message: {}",
                    preview(trimmed, 120)
                ),
                Err(_) => warn!(
                    provider = %self.provider_id,
                    "Ignoring non JSON-RPC output: {}",
                    preview(trimmed, 120)
                ),
            }
        }
    }
}

#[async_trait]
impl McpChannel for McpStdioConnection {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::call(id, method, params);

        let mut guard = self.io.lock().await;
        let pipes = &mut *guard;
        let exchange = async {
            Self::write_message(pipes, &request).await?;
            self.read_response(pipes, id).await
        };
        let response = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| {
                ForgeError::Mcp(format!(
                    "MCP server '{}' timed out on {} after {}s",
                    self.provider_id,
                    method,
                    self.timeout.as_secs()
                ))
            })??;
        response.into_result(method)
    }

    async fn notify(&self, method: &str) -> Result<()> {
        let mut guard = self.io.lock().await;
        Self::write_message(&mut guard, &JsonRpcRequest::notification(method)).await
    }
}

#[async_trait]
impl Connection for McpStdioConnection {
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
        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };
        if let Err(e) = child.start_kill() {
            // Already exited
            debug!(provider = %self.provider_id, error = %e, "MCP server kill skipped");
        }
        match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
            Ok(Ok(status)) => {
                debug!(provider = %self.provider_id, %status, "MCP server stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(ForgeError::Mcp(format!(
                "Failed to reap MCP server '{}': {}",
                self.provider_id, e
            ))),
            Err(_) => Err(ForgeError::Mcp(format!(
                "MCP server '{}' did not exit after kill",
                self.provider_id
            ))),
        }
    }
}
