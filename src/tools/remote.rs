//! Remote tool providers.
//!
//! A remote provider is described by an inert [`RemoteTransport`] that knows
//! how to open a [`Connection`]. Nothing touches the network or spawns a
//! process until the activator calls [`RemoteTransport::open`]. Capabilities
//! discovered on a connection are wrapped as [`RemoteTool`]s so the agent can
//! call them like any other tool.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::error::{ForgeError, Result};

use super::types::{CapabilityDescriptor, ProviderKind, Tool, ToolContext, ToolOutput};

/// How to reach a remote provider. Constructing one performs no I/O.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Id of the provider record this transport was built from.
    fn provider_id(&self) -> &str;

    /// Provider kind (process, HTTP or peer agent).
    fn kind(&self) -> ProviderKind;

    /// Open the connection. Spawns the process or performs the handshake.
    async fn open(&self) -> Result<Arc<dyn Connection>>;
}

/// An open connection to a remote provider.
///
/// Must be closed exactly once; the teardown coordinator owns that call.
#[async_trait]
pub trait Connection: Send + Sync {
    fn provider_id(&self) -> &str;

    /// Enumerate the capabilities the provider exposes.
    async fn list_capabilities(&self) -> Result<Vec<CapabilityDescriptor>>;

    /// Invoke a capability by its remote name.
    async fn invoke(&self, name: &str, args: Value) -> Result<ToolOutput>;

    /// Release the connection (kill the process, end the HTTP session).
    async fn close(&self) -> Result<()>;
}

/// Deferred handle to a remote provider, held by a tool specification until
/// activation.
#[derive(Clone)]
pub struct DeferredHandle {
    transport: Arc<dyn RemoteTransport>,
    allowed: Vec<String>,
}

impl DeferredHandle {
    pub fn new(transport: Arc<dyn RemoteTransport>) -> Self {
        Self {
            transport,
            allowed: Vec::new(),
        }
    }

    /// Restrict discovery to the named capabilities. Empty keeps everything.
    pub fn with_allowed(mut self, allowed: Vec<String>) -> Self {
        self.allowed = allowed;
        self
    }

    pub fn provider_id(&self) -> &str {
        self.transport.provider_id()
    }

    pub fn kind(&self) -> ProviderKind {
        self.transport.kind()
    }

    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }

    pub fn transport(&self) -> &Arc<dyn RemoteTransport> {
        &self.transport
    }

    pub async fn open(&self) -> Result<Arc<dyn Connection>> {
        self.transport.open().await
    }
}

impl fmt::Debug for DeferredHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredHandle")
            .field("provider_id", &self.provider_id())
            .field("kind", &self.kind())
            .field("allowed", &self.allowed)
            .finish()
    }
}

/// Keep only the allowed capabilities, in allow-list order.
///
/// Names requested but not offered by the provider are logged and skipped.
pub fn filter_capabilities(
    provider_id: &str,
    capabilities: Vec<CapabilityDescriptor>,
    allowed: &[String],
) -> Vec<CapabilityDescriptor> {
    if allowed.is_empty() {
        return capabilities;
    }

    let mut by_name: std::collections::HashMap<String, CapabilityDescriptor> = capabilities
        .into_iter()
        .map(|c| (c.name.clone(), c))
        .collect();

    let mut kept = Vec::with_capacity(allowed.len());
    for name in allowed {
        match by_name.remove(name) {
            Some(capability) => kept.push(capability),
            None => warn!(
                provider = provider_id,
                tool = %name,
                "Requested tool not offered by provider"
            ),
        }
    }
    kept
}

/// Wraps a capability discovered on a remote connection as a [`Tool`].
pub struct RemoteTool {
    descriptor: CapabilityDescriptor,
    connection: Arc<dyn Connection>,
}

impl RemoteTool {
    pub fn new(descriptor: CapabilityDescriptor, connection: Arc<dyn Connection>) -> Self {
        Self {
            descriptor,
            connection,
        }
    }

    /// Wrap every capability of a connection.
    pub fn wrap_all(
        descriptors: Vec<CapabilityDescriptor>,
        connection: &Arc<dyn Connection>,
    ) -> Vec<Arc<dyn Tool>> {
        descriptors
            .into_iter()
            .map(|d| Arc::new(RemoteTool::new(d, Arc::clone(connection))) as Arc<dyn Tool>)
            .collect()
    }
}

impl fmt::Debug for RemoteTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTool")
            .field("name", &self.descriptor.name)
            .field("provider", &self.connection.provider_id())
            .finish()
    }
}

#[async_trait]
impl Tool for RemoteTool {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn description(&self) -> &str {
        &self.descriptor.description
    }

    fn parameters(&self) -> Value {
        self.descriptor.input_schema.clone()
    }

    fn provider_id(&self) -> &str {
        self.connection.provider_id()
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
        self.connection
            .invoke(&self.descriptor.name, args)
            .await
            .map_err(|e| match e {
                ForgeError::Tool(_) => e,
                other => ForgeError::Tool(format!(
                    "Remote tool '{}' on '{}' failed: {}",
                    self.descriptor.name,
                    self.connection.provider_id(),
                    other
                )),
            })
    }
}
