//! Concurrent resource activation.
//!
//! [`ResourceActivator`] opens every deferred remote handle under a fixed
//! concurrency cap and waits for all of them before moving on. A slow or
//! failing provider never blocks or cancels the others. Each connection is
//! registered with the [`TeardownCoordinator`] as soon as it opens, before
//! its capabilities are listed, so a discovery failure still leaves it
//! tracked for release.

mod scope;
mod teardown;

pub use scope::{with_scope, ActivationScope};
pub use teardown::{TeardownCoordinator, TeardownEntry};

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::ActivationConfig;
use crate::error::{ForgeError, Result};
use crate::tools::{
    filter_capabilities, Connection, DeferredHandle, ProviderKind, RemoteTool, ToolRegistry,
    ToolSpecification,
};

/// Where a remote provider failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationStage {
    /// The connection could not be opened
    Activation,
    /// The connection opened but listing capabilities failed
    Discovery,
}

impl fmt::Display for ActivationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Activation => write!(f, "activation"),
            Self::Discovery => write!(f, "discovery"),
        }
    }
}

/// A provider that contributed no capabilities because of an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivationFailure {
    pub provider_id: String,
    pub stage: ActivationStage,
    pub message: String,
}

/// Per-provider outcome, for diagnostics and listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStatus {
    pub provider_id: String,
    pub kind: ProviderKind,
    /// Capabilities this provider added to the merged set
    pub tools: Vec<String>,
    /// Local functions that did not resolve
    pub missing: Vec<String>,
    pub failure: Option<ActivationStage>,
}

/// Result of one activation pass.
#[derive(Debug, Clone, Default)]
pub struct ActivationReport {
    /// Merged capability set, read-only once built
    pub tools: Arc<ToolRegistry>,
    pub statuses: Vec<ProviderStatus>,
    pub failures: Vec<ActivationFailure>,
}

impl ActivationReport {
    pub fn failure_for(&self, provider_id: &str) -> Option<&ActivationFailure> {
        self.failures.iter().find(|f| f.provider_id == provider_id)
    }
}

/// Activates tool specifications into a merged capability set.
#[derive(Debug, Clone)]
pub struct ResourceActivator {
    config: ActivationConfig,
}

impl Default for ResourceActivator {
    fn default() -> Self {
        Self::new(ActivationConfig::default())
    }
}

impl ResourceActivator {
    pub fn new(config: ActivationConfig) -> Self {
        Self { config }
    }

    /// Concurrency cap in effect (never below 1).
    pub fn concurrency_limit(&self) -> usize {
        self.config.max_concurrency.max(1)
    }

    /// Activate every specification.
    ///
    /// Returns once every remote activation has finished, successfully or
    /// not. Failures are reported in the result, never raised.
    pub async fn activate(
        &self,
        specs: &[ToolSpecification],
        teardown: &Arc<TeardownCoordinator>,
    ) -> ActivationReport {
        let started = Instant::now();
        let mut registry = ToolRegistry::new();
        let mut statuses = Vec::with_capacity(specs.len());
        let mut failures = Vec::new();
        let mut remote = Vec::new();

        for spec in specs {
            match spec {
                ToolSpecification::Local(set) => {
                    let mut accepted = Vec::new();
                    for tool in &set.tools {
                        if registry.register(Arc::clone(tool)) {
                            accepted.push(tool.name().to_string());
                        }
                    }
                    statuses.push(ProviderStatus {
                        provider_id: set.provider_id.clone(),
                        kind: ProviderKind::LocalCallable,
                        tools: accepted,
                        missing: set.missing.clone(),
                        failure: None,
                    });
                }
                ToolSpecification::Remote(handle) => remote.push(handle.clone()),
            }
        }

        let opened = self.open_all(remote, teardown).await;

        let mut live = Vec::new();
        for (handle, result) in opened {
            match result {
                Ok(connection) => live.push((handle, connection)),
                Err(e) => {
                    warn!(provider = handle.provider_id(), error = %e, "Activation failed");
                    failures.push(ActivationFailure {
                        provider_id: handle.provider_id().to_string(),
                        stage: ActivationStage::Activation,
                        message: e.to_string(),
                    });
                    statuses.push(ProviderStatus {
                        provider_id: handle.provider_id().to_string(),
                        kind: handle.kind(),
                        tools: Vec::new(),
                        missing: Vec::new(),
                        failure: Some(ActivationStage::Activation),
                    });
                }
            }
        }

        let discovered: Vec<_> = stream::iter(live)
            .map(|(handle, connection)| async move {
                let listed = connection.list_capabilities().await;
                (handle, connection, listed)
            })
            .buffered(self.concurrency_limit())
            .collect()
            .await;

        for (handle, connection, listed) in discovered {
            let provider_id = handle.provider_id().to_string();
            match listed {
                Ok(capabilities) => {
                    let kept = filter_capabilities(&provider_id, capabilities, handle.allowed());
                    let mut accepted = Vec::new();
                    for tool in RemoteTool::wrap_all(kept, &connection) {
                        let name = tool.name().to_string();
                        if registry.register(tool) {
                            accepted.push(name);
                        }
                    }
                    info!(
                        provider = %provider_id,
                        tools = accepted.len(),
                        "Capabilities discovered"
                    );
                    statuses.push(ProviderStatus {
                        provider_id,
                        kind: handle.kind(),
                        tools: accepted,
                        missing: Vec::new(),
                        failure: None,
                    });
                }
                Err(e) => {
                    // Stays registered for teardown
                    warn!(provider = %provider_id, error = %e, "Capability discovery failed");
                    failures.push(ActivationFailure {
                        provider_id: provider_id.clone(),
                        stage: ActivationStage::Discovery,
                        message: ForgeError::Discovery(e.to_string()).to_string(),
                    });
                    statuses.push(ProviderStatus {
                        provider_id,
                        kind: handle.kind(),
                        tools: Vec::new(),
                        missing: Vec::new(),
                        failure: Some(ActivationStage::Discovery),
                    });
                }
            }
        }

        info!(
            tools = registry.len(),
            providers = statuses.len(),
            failed = failures.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Activation complete"
        );

        ActivationReport {
            tools: Arc::new(registry),
            statuses,
            failures,
        }
    }

    /// Open every handle on its own task, at most `concurrency_limit` at
    /// a time, and wait for all of them.
    ///
    /// Tasks are detached: if this future is dropped they still finish. A
    /// connection that registers after `release_all` is closed on the spot,
    /// and a cancelled [`ActivationScope::enter`] runs `release_all` itself.
    async fn open_all(
        &self,
        handles: Vec<DeferredHandle>,
        teardown: &Arc<TeardownCoordinator>,
    ) -> Vec<(DeferredHandle, Result<Arc<dyn Connection>>)> {
        if handles.is_empty() {
            return Vec::new();
        }

        let limit = self.concurrency_limit();
        debug!(count = handles.len(), limit, "Activating remote providers");
        let permits = Arc::new(Semaphore::new(limit));

        let tasks: Vec<_> = handles
            .iter()
            .cloned()
            .map(|handle| {
                let permits = Arc::clone(&permits);
                let teardown = Arc::clone(teardown);
                tokio::spawn(async move {
                    let _permit = permits
                        .acquire_owned()
                        .await
                        .map_err(|e| ForgeError::Activation(e.to_string()))?;
                    let connection = handle.open().await?;
                    if !teardown
                        .register(TeardownEntry::for_connection(Arc::clone(&connection)))
                        .await
                    {
                        return Err(ForgeError::Activation(format!(
                            "Activation scope for '{}' closed before the connection opened",
                            handle.provider_id()
                        )));
                    }
                    debug!(provider = handle.provider_id(), "Connection opened");
                    Ok(connection)
                })
            })
            .collect();

        // Barrier: every task has finished past this point
        let joined = join_all(tasks).await;

        handles
            .into_iter()
            .zip(joined)
            .map(|(handle, joined)| {
                let result = joined.unwrap_or_else(|e| {
                    Err(ForgeError::Activation(format!(
                        "Activation task for '{}' aborted: {}",
                        handle.provider_id(),
                        e
                    )))
                });
                (handle, result)
            })
            .collect()
    }
}
