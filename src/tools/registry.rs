//! Tool registry for AgentForge
//!
//! This module provides the `ToolRegistry` struct holding the merged
//! capability set of an assembled agent: local callables plus every
//! capability discovered on remote connections. Tools are looked up by name
//! and executed with timing logs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::Result;

use super::{Tool, ToolContext, ToolDefinition, ToolOutput};

/// A registry that holds and manages tools.
///
/// Registration order is preserved so definitions reach the model in a
/// stable order.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use agentforge::tools::{EchoTool, ToolRegistry};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let mut registry = ToolRegistry::new();
/// registry.register(Arc::new(EchoTool::new("basics")));
///
/// assert!(registry.has("echo"));
///
/// let result = registry.execute("echo", json!({"message": "hello"})).await;
/// assert_eq!(result.unwrap().content, "hello");
/// # });
/// ```
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    /// Create a new empty tool registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool.
    ///
    /// Returns `false` when a tool with the same name is already registered;
    /// the first registration wins.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> bool {
        let name = tool.name().to_string();
        if let Some(existing) = self.tools.get(&name) {
            warn!(
                tool = %name,
                kept = existing.provider_id(),
                dropped = tool.provider_id(),
                "Duplicate tool name, keeping first"
            );
            return false;
        }
        info!(tool = %name, provider = tool.provider_id(), "Registering tool");
        self.order.push(name.clone());
        self.tools.insert(name, tool);
        true
    }

    /// Register every tool, returning how many were accepted.
    pub fn extend<I: IntoIterator<Item = Arc<dyn Tool>>>(&mut self, tools: I) -> usize {
        tools.into_iter().filter(|t| self.register(Arc::clone(t))).count()
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Execute a tool by name with default context.
    ///
    /// Tool-not-found returns `Ok(ToolOutput::error(...))` so the model can
    /// correct itself.
    pub async fn execute(&self, name: &str, args: Value) -> Result<ToolOutput> {
        self.execute_with_context(name, args, &ToolContext::default())
            .await
    }

    /// Execute a tool by name with a specific context.
    pub async fn execute_with_context(
        &self,
        name: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput> {
        let tool = match self.tools.get(name) {
            Some(t) => t,
            None => {
                return Ok(ToolOutput::error(format!("Tool not found: {}", name)));
            }
        };

        let start = Instant::now();

        match tool.execute(args, ctx).await {
            Ok(output) => {
                info!(
                    tool = name,
                    provider = tool.provider_id(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    is_error = output.is_error,
                    "Tool executed"
                );
                Ok(output)
            }
            Err(e) => {
                error!(
                    tool = name,
                    provider = tool.provider_id(),
                    error = %e,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Tool execution failed"
                );
                Err(e)
            }
        }
    }

    /// Tool definitions in registration order, for the model runtime.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.iter().map(|t| t.definition()).collect()
    }

    /// Tools in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.order.iter().filter_map(|name| self.tools.get(name))
    }

    /// Names of all registered tools, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    /// Names of tools owned by one provider.
    pub fn names_for_provider(&self, provider_id: &str) -> Vec<&str> {
        self.iter()
            .filter(|t| t.provider_id() == provider_id)
            .map(|t| t.name())
            .collect()
    }

    /// Check if a tool exists in the registry.
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get the number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.order)
            .finish()
    }
}
