//! Executable callable adapter.
//!
//! Local tool functions that are not built into the catalog can be provided
//! as standalone executables. Each call spawns the executable, writes a
//! JSON-RPC 2.0 request to stdin, reads the response from stdout, and returns
//! the result. The executable is expected to exit after a single response.
//!
//! An optional `<name>.json` manifest next to the executable supplies the
//! description and parameter schema shown to the model.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ForgeError, Result};
use crate::tools::types::{empty_object_schema, Tool, ToolContext, ToolOutput};
use crate::utils::string::preview;

/// Default per-call timeout for executable callables.
pub const DEFAULT_PLUGIN_TIMEOUT_SECS: u64 = 30;

// ---- JSON-RPC 2.0 types (local, not coupled to MCP) ----

#[derive(Serialize)]
struct PluginJsonRpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: PluginExecuteParams,
}

#[derive(Serialize)]
struct PluginExecuteParams {
    tool: String,
    args: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
}

#[derive(Deserialize)]
struct PluginJsonRpcResponse {
    result: Option<PluginJsonRpcResult>,
    error: Option<PluginJsonRpcError>,
}

#[derive(Deserialize)]
struct PluginJsonRpcResult {
    output: String,
    #[serde(default)]
    is_error: bool,
}

#[derive(Deserialize)]
struct PluginJsonRpcError {
    code: i64,
    message: String,
}

/// Manifest describing an executable callable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PluginManifest {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Option<Value>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl PluginManifest {
    /// Read `<binary>.json` if present. A malformed manifest is ignored with
    /// a warning so the callable still loads.
    pub fn load_beside(binary: &Path) -> Option<Self> {
        let path = binary.with_extension("json");
        let content = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                warn!(manifest = %path.display(), error = %e, "Ignoring malformed plugin manifest");
                None
            }
        }
    }
}

/// A local callable backed by an executable.
pub struct ExecutableTool {
    name: String,
    description: String,
    parameters: Value,
    provider_id: String,
    binary_path: PathBuf,
    env: HashMap<String, String>,
    timeout: Duration,
}

impl ExecutableTool {
    /// Create a new executable callable.
    ///
    /// # Arguments
    /// * `name` - Tool name shown to the model
    /// * `provider_id` - Id of the owning provider record
    /// * `binary_path` - Path to the executable
    pub fn new(
        name: impl Into<String>,
        provider_id: impl Into<String>,
        binary_path: PathBuf,
    ) -> Self {
        let name = name.into();
        Self {
            description: format!("Run the '{}' callable", name),
            name,
            parameters: empty_object_schema(),
            provider_id: provider_id.into(),
            binary_path,
            env: HashMap::new(),
            timeout: Duration::from_secs(DEFAULT_PLUGIN_TIMEOUT_SECS),
        }
    }

    /// Apply a manifest's description, schema, timeout and environment.
    pub fn with_manifest(mut self, manifest: PluginManifest) -> Self {
        if let Some(description) = manifest.description {
            self.description = description;
        }
        if let Some(parameters) = manifest.parameters {
            self.parameters = parameters;
        }
        if let Some(secs) = manifest.timeout_secs {
            self.timeout = Duration::from_secs(secs);
        }
        self.env = manifest.env;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }
}

impl std::fmt::Debug for ExecutableTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutableTool")
            .field("name", &self.name)
            .field("provider", &self.provider_id)
            .field("binary", &self.binary_path)
            .finish()
    }
}

#[async_trait]
impl Tool for ExecutableTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        self.parameters.clone()
    }

    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        use tokio::io::AsyncWriteExt;
        use tokio::process::Command;

        let request = PluginJsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method: "execute",
            params: PluginExecuteParams {
                tool: self.name.clone(),
                args,
                session_id: ctx.session_id.clone(),
            },
        };

        let request_json = serde_json::to_string(&request).map_err(|e| {
            ForgeError::Tool(format!("Failed to serialize JSON-RPC request: {}", e))
        })?;

        // Spawn directly, no shell
        let mut cmd = Command::new(&self.binary_path);
        cmd.stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        if let Some(workspace) = &ctx.workspace {
            cmd.current_dir(workspace);
        }
        cmd.envs(&self.env);

        let mut child = cmd.spawn().map_err(|e| {
            ForgeError::Tool(format!(
                "Failed to spawn callable '{}' ({}): {}",
                self.name,
                self.binary_path.display(),
                e
            ))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(request_json.as_bytes())
                .await
                .map_err(|e| {
                    ForgeError::Tool(format!(
                        "Failed to write to callable '{}' stdin: {}",
                        self.name, e
                    ))
                })?;
            stdin.write_all(b"\n").await.ok();
            // dropping stdin closes the pipe
        }

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ForgeError::Tool(format!(
                    "Callable '{}' failed: {}",
                    self.name, e
                )));
            }
            Err(_) => {
                return Err(ForgeError::Tool(format!(
                    "Callable '{}' timed out after {}s",
                    self.name,
                    self.timeout.as_secs()
                )));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let detail = if stderr.trim().is_empty() {
                stdout.trim()
            } else {
                stderr.trim()
            };
            return Err(ForgeError::Tool(format!(
                "Callable '{}' exited with code {}: {}",
                self.name, code, detail
            )));
        }

        // The response is the last non-empty line; earlier lines are chatter
        let response_line = stdout
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("");

        if response_line.is_empty() {
            return Err(ForgeError::Tool(format!(
                "Callable '{}' produced no output",
                self.name
            )));
        }

        let response: PluginJsonRpcResponse = serde_json::from_str(response_line).map_err(|e| {
            ForgeError::Tool(format!(
                "Callable '{}' returned invalid JSON-RPC: {} (raw: {})",
                self.name,
                e,
                preview(response_line, 200)
            ))
        })?;

        if let Some(err) = response.error {
            debug!(tool = %self.name, code = err.code, "Callable returned error");
            return Ok(ToolOutput::error(format!(
                "{} (code {})",
                err.message, err.code
            )));
        }

        match response.result {
            Some(result) if result.is_error => Ok(ToolOutput::error(result.output)),
            Some(result) => Ok(ToolOutput::text(result.output)),
            None => Err(ForgeError::Tool(format!(
                "Callable '{}' returned neither result nor error",
                self.name
            ))),
        }
    }
}
