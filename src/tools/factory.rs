//! Tool specification factory.
//!
//! Turns configuration records into [`ToolSpecification`]s. Local records
//! are resolved immediately into callables; remote records become a
//! [`DeferredHandle`] around an inert transport. No process is spawned and no
//! byte is sent for a remote record until the activator opens it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{ForgeError, Result};

use super::a2a::PeerAgentTransport;
use super::config::{
    LocalToolConfig, McpToolConfig, PeerAgentConfig, ToolConfigEntry, ToolConfigRecord,
    ToolConfigRegistry, ToolProviderConfig,
};
use super::local::LocalCatalog;
use super::mcp::{McpHttpTransport, McpStdioTransport};
use super::remote::{DeferredHandle, RemoteTransport};
use super::types::{ProviderKind, Tool};

pub const STATUS_DISABLED: &str = "Tool is disabled";

/// Callables resolved for a local provider.
#[derive(Clone)]
pub struct LocalToolSet {
    pub provider_id: String,
    pub tools: Vec<Arc<dyn Tool>>,
    /// Requested functions that did not resolve
    pub missing: Vec<String>,
}

impl std::fmt::Debug for LocalToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.tools.iter().map(|t| t.name()).collect();
        f.debug_struct("LocalToolSet")
            .field("provider_id", &self.provider_id)
            .field("tools", &names)
            .field("missing", &self.missing)
            .finish()
    }
}

/// Factory output for one record. Never holds a live connection.
#[derive(Debug, Clone)]
pub enum ToolSpecification {
    Local(LocalToolSet),
    Remote(DeferredHandle),
}

impl ToolSpecification {
    pub fn provider_id(&self) -> &str {
        match self {
            Self::Local(set) => &set.provider_id,
            Self::Remote(handle) => handle.provider_id(),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Local(_) => ProviderKind::LocalCallable,
            Self::Remote(handle) => handle.kind(),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

/// Outcome of building one record.
#[derive(Debug, Clone)]
pub enum SpecOutcome {
    Built(ToolSpecification),
    Disabled,
    Failed(String),
}

/// One record's build result, with provenance for diagnostics.
#[derive(Debug, Clone)]
pub struct SpecEntry {
    pub id: String,
    pub source_file: Option<PathBuf>,
    pub outcome: SpecOutcome,
}

impl SpecEntry {
    pub fn specification(&self) -> Option<&ToolSpecification> {
        match &self.outcome {
            SpecOutcome::Built(spec) => Some(spec),
            _ => None,
        }
    }

    /// One-line status for listings.
    pub fn status(&self) -> String {
        match &self.outcome {
            SpecOutcome::Built(ToolSpecification::Local(set)) if set.missing.is_empty() => {
                format!("loaded {} tool(s)", set.tools.len())
            }
            SpecOutcome::Built(ToolSpecification::Local(set)) => format!(
                "loaded {} tool(s), missing: {}",
                set.tools.len(),
                set.missing.join(", ")
            ),
            SpecOutcome::Built(ToolSpecification::Remote(handle)) => {
                format!("deferred ({})", handle.kind())
            }
            SpecOutcome::Disabled => STATUS_DISABLED.to_string(),
            SpecOutcome::Failed(error) => error.clone(),
        }
    }
}

/// Built specifications, in entry order.
pub fn specifications(entries: &[SpecEntry]) -> Vec<ToolSpecification> {
    entries
        .iter()
        .filter_map(SpecEntry::specification)
        .cloned()
        .collect()
}

/// Builds tool specifications from configuration records.
#[derive(Debug, Clone)]
pub struct ToolSpecFactory {
    catalog: LocalCatalog,
}

impl Default for ToolSpecFactory {
    fn default() -> Self {
        Self::new(LocalCatalog::with_builtins())
    }
}

impl ToolSpecFactory {
    pub fn new(catalog: LocalCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &LocalCatalog {
        &self.catalog
    }

    /// Build the specification for one record.
    ///
    /// Disabled records are the caller's concern; see [`Self::build_all`].
    pub fn build(&self, record: &ToolConfigRecord) -> Result<ToolSpecification> {
        debug!(id = %record.id, tag = %record.type_tag, "Building tool specification");
        match &record.provider {
            ToolProviderConfig::Local(local) => self.build_local(record, local),
            ToolProviderConfig::Mcp(mcp) => build_mcp(&record.id, mcp),
            ToolProviderConfig::PeerAgent(peer) => build_peer_agent(&record.id, peer),
        }
    }

    /// Build every entry of a registry. Failed and disabled records are
    /// carried through with their status so nothing is silently dropped.
    pub fn build_all(&self, registry: &ToolConfigRegistry) -> Vec<SpecEntry> {
        let entries: Vec<SpecEntry> = registry
            .entries()
            .iter()
            .map(|entry| match entry {
                ToolConfigEntry::Failed(failed) => SpecEntry {
                    id: failed.id.clone(),
                    source_file: failed.source_file.clone(),
                    outcome: SpecOutcome::Failed(failed.error.clone()),
                },
                ToolConfigEntry::Loaded(record) if record.disabled => {
                    info!(id = %record.id, "Skipping disabled tool");
                    SpecEntry {
                        id: record.id.clone(),
                        source_file: record.source_file.clone(),
                        outcome: SpecOutcome::Disabled,
                    }
                }
                ToolConfigEntry::Loaded(record) => {
                    let outcome = match self.build(record) {
                        Ok(spec) => SpecOutcome::Built(spec),
                        Err(e) => {
                            warn!(id = %record.id, error = %e, "Tool specification failed");
                            SpecOutcome::Failed(e.to_string())
                        }
                    };
                    SpecEntry {
                        id: record.id.clone(),
                        source_file: record.source_file.clone(),
                        outcome,
                    }
                }
            })
            .collect();

        let built = entries.iter().filter(|e| e.specification().is_some()).count();
        info!(built, total = entries.len(), "Tool specifications built");
        entries
    }

    fn build_local(
        &self,
        record: &ToolConfigRecord,
        local: &LocalToolConfig,
    ) -> Result<ToolSpecification> {
        if local.functions.is_empty() {
            return Err(ForgeError::Config(format!(
                "Local tool '{}' lists no functions",
                record.id
            )));
        }

        let resolved = self.catalog.resolve(&record.id, local, record.base_dir());
        if resolved.tools.is_empty() {
            return Err(ForgeError::Tool(format!(
                "No tools could be loaded from module '{}'",
                local.module_path
            )));
        }
        if !resolved.missing.is_empty() {
            warn!(
                id = %record.id,
                missing = %resolved.missing.join(", "),
                "Some functions could not be loaded"
            );
        }

        Ok(ToolSpecification::Local(LocalToolSet {
            provider_id: record.id.clone(),
            tools: resolved.tools,
            missing: resolved.missing,
        }))
    }
}

fn build_mcp(id: &str, mcp: &McpToolConfig) -> Result<ToolSpecification> {
    let timeout = Duration::from_secs(mcp.timeout_secs);
    let transport: Arc<dyn RemoteTransport> = match (&mcp.command, &mcp.url) {
        (Some(command), _) => Arc::new(
            McpStdioTransport::new(id, command.clone())
                .with_args(mcp.args.clone())
                .with_env(mcp.env.clone())
                .with_timeout(timeout),
        ),
        (None, Some(url)) => Arc::new(McpHttpTransport::new(id, url.clone()).with_timeout(timeout)),
        (None, None) => {
            return Err(ForgeError::Config(
                "MCP config must contain either 'command' (stdio) or 'url' (HTTP)".to_string(),
            ));
        }
    };

    Ok(ToolSpecification::Remote(
        DeferredHandle::new(transport).with_allowed(mcp.functions.clone()),
    ))
}

fn build_peer_agent(id: &str, peer: &PeerAgentConfig) -> Result<ToolSpecification> {
    let urls: Vec<String> = peer
        .urls
        .iter()
        .filter(|u| !u.trim().is_empty())
        .cloned()
        .collect();
    if urls.is_empty() {
        return Err(ForgeError::Config(
            "A2A tool configuration missing required 'urls' field".to_string(),
        ));
    }

    let transport = PeerAgentTransport::new(id, urls)
        .with_timeout(Duration::from_secs(peer.timeout))
        .with_webhook(peer.webhook_url.clone(), peer.webhook_token.clone());
    Ok(ToolSpecification::Remote(DeferredHandle::new(Arc::new(
        transport,
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> ToolConfigRecord {
        ToolConfigRecord::from_value(&value, None).unwrap()
    }

    #[test]
    fn test_build_local_partial() {
        let factory = ToolSpecFactory::default();
        let spec = factory
            .build(&record(json!({
                "type": "python", "id": "basics", "module_path": "builtin",
                "functions": ["echo", "missing_fn", "current_time"]
            })))
            .unwrap();
        match spec {
            ToolSpecification::Local(set) => {
                let names: Vec<_> = set.tools.iter().map(|t| t.name()).collect();
                assert_eq!(names, vec!["echo", "current_time"]);
                assert_eq!(set.missing, vec!["missing_fn"]);
            }
            other => panic!("expected local, got {:?}", other),
        }
    }

    #[test]
    fn test_build_local_nothing_resolved() {
        let factory = ToolSpecFactory::default();
        let err = factory
            .build(&record(json!({
                "type": "python", "id": "x", "module_path": "nowhere", "functions": ["a"]
            })))
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("No tools could be loaded from module 'nowhere'"));
    }

    #[test]
    fn test_build_mcp_is_deferred() {
        let factory = ToolSpecFactory::default();
        // The command does not exist; building must not try to run it.
        let spec = factory
            .build(&record(json!({
                "type": "mcp", "id": "fs", "command": "/nonexistent/server",
                "functions": ["read"]
            })))
            .unwrap();
        assert!(spec.is_remote());
        assert_eq!(spec.kind(), ProviderKind::RemoteProcess);
        assert_eq!(spec.provider_id(), "fs");
        match spec {
            ToolSpecification::Remote(handle) => assert_eq!(handle.allowed(), ["read"]),
            other => panic!("expected remote, got {:?}", other),
        }

        let http = factory
            .build(&record(json!({"type": "mcp", "id": "web", "url": "http://127.0.0.1:1"})))
            .unwrap();
        assert_eq!(http.kind(), ProviderKind::RemoteHttp);
    }

    #[test]
    fn test_build_mcp_without_endpoint_fails() {
        let factory = ToolSpecFactory::default();
        let err = factory
            .build(&record(json!({"type": "mcp", "id": "nothing"})))
            .unwrap_err();
        assert!(err.to_string().contains("either 'command' (stdio) or 'url' (HTTP)"));
    }

    #[test]
    fn test_build_a2a() {
        let factory = ToolSpecFactory::default();
        let spec = factory
            .build(&record(json!({"type": "a2a", "id": "peers", "urls": ["http://a:1"]})))
            .unwrap();
        assert_eq!(spec.kind(), ProviderKind::PeerAgent);

        let err = factory
            .build(&record(json!({"type": "a2a", "id": "peers", "urls": []})))
            .unwrap_err();
        assert!(err.to_string().contains("missing required 'urls'"));
    }

    #[test]
    fn test_build_all_statuses() {
        let registry = ToolConfigRegistry::from_values(vec![
            json!({"type": "python", "id": "basics", "module_path": "builtin", "functions": ["echo"]}),
            json!({"type": "mcp", "id": "off", "command": "srv", "disabled": true}),
            json!({"type": "mcp", "id": "broken"}),
            json!({"type": "telepathy", "id": "odd"}),
        ]);
        let entries = ToolSpecFactory::default().build_all(&registry);
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].status(), "loaded 1 tool(s)");
        assert_eq!(entries[1].status(), STATUS_DISABLED);
        assert!(matches!(entries[2].outcome, SpecOutcome::Failed(_)));
        assert!(entries[3].status().contains("Unknown tool type 'telepathy'"));
        assert_eq!(specifications(&entries).len(), 1);
    }
}
