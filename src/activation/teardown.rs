//! Teardown coordinator.
//!
//! Tracks every successfully opened remote connection in registration order
//! and releases them in reverse order exactly once. Every release is
//! attempted; failures are collected into a single [`TeardownErrors`].

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ForgeError, Result, TeardownErrors};
use crate::tools::Connection;

/// One tracked resource and the function that releases it.
pub struct TeardownEntry {
    label: String,
    release: Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>,
}

impl TeardownEntry {
    pub fn new<F, Fut>(label: impl Into<String>, release: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            label: label.into(),
            release: Box::new(move || release().boxed()),
        }
    }

    /// Entry closing a remote connection.
    pub fn for_connection(connection: Arc<dyn Connection>) -> Self {
        let label = connection.provider_id().to_string();
        Self::new(label, move || async move { connection.close().await })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    async fn release(self) -> Result<()> {
        (self.release)().await
    }
}

impl std::fmt::Debug for TeardownEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeardownEntry")
            .field("label", &self.label)
            .finish()
    }
}

#[derive(Default)]
struct TeardownState {
    entries: Vec<TeardownEntry>,
    released: bool,
}

/// Owns the release of activated connections.
///
/// `register` is safe to call from many activation tasks at once.
#[derive(Default)]
pub struct TeardownCoordinator {
    state: Mutex<TeardownState>,
}

impl TeardownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track an entry for release.
    ///
    /// Returns `false` when `release_all` has already run; the entry is then
    /// released on the spot so a late activation cannot leak.
    pub async fn register(&self, entry: TeardownEntry) -> bool {
        let mut state = self.state.lock().await;
        if !state.released {
            debug!(label = %entry.label, position = state.entries.len(), "Registered for teardown");
            state.entries.push(entry);
            return true;
        }
        drop(state);

        let label = entry.label.clone();
        warn!(label = %label, "Registration after teardown, releasing immediately");
        if let Err(e) = entry.release().await {
            warn!(label = %label, error = %e, "Late release failed");
        }
        false
    }

    /// Number of tracked entries.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Labels in registration order.
    pub async fn labels(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .entries
            .iter()
            .map(|e| e.label.clone())
            .collect()
    }

    pub async fn is_released(&self) -> bool {
        self.state.lock().await.released
    }

    /// Release every entry in reverse registration order.
    ///
    /// Runs once; later calls do nothing and return `Ok(())`.
    pub async fn release_all(&self) -> Result<()> {
        let entries = {
            let mut state = self.state.lock().await;
            if state.released {
                return Ok(());
            }
            state.released = true;
            std::mem::take(&mut state.entries)
        };

        let total = entries.len();
        let mut errors = TeardownErrors::default();
        for entry in entries.into_iter().rev() {
            let label = entry.label.clone();
            match entry.release().await {
                Ok(()) => debug!(label = %label, "Released"),
                Err(e) => {
                    warn!(label = %label, error = %e, "Release failed");
                    errors.push(label, e.to_string());
                }
            }
        }

        info!(total, failed = errors.len(), "Teardown complete");
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ForgeError::Teardown(errors))
        }
    }
}

impl std::fmt::Debug for TeardownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeardownCoordinator").finish_non_exhaustive()
    }
}
