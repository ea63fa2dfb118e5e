//! Activation scope.
//!
//! Binds the teardown coordinator's lifetime to a block of work: entering
//! activates the specifications, leaving releases every tracked connection
//! exactly once on every exit path.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::ActivationConfig;
use crate::error::Result;
use crate::tools::{ToolRegistry, ToolSpecification};

use super::{ActivationReport, ResourceActivator, TeardownCoordinator};

/// Live activation. Call [`ActivationScope::exit`] to release.
///
/// Dropping a scope without `exit` releases on a background task.
pub struct ActivationScope {
    teardown: Arc<TeardownCoordinator>,
    report: ActivationReport,
    exited: bool,
}

impl ActivationScope {
    /// Activate `specs` and open the scope.
    ///
    /// If this future is dropped before it completes, whatever was already
    /// registered is released on a background task, and connections that
    /// open later are released as they register.
    pub async fn enter(specs: &[ToolSpecification], config: &ActivationConfig) -> Self {
        let teardown = Arc::new(TeardownCoordinator::new());
        let pending = PendingRelease(Some(Arc::clone(&teardown)));
        let report = ResourceActivator::new(config.clone())
            .activate(specs, &teardown)
            .await;
        pending.disarm();
        Self {
            teardown,
            report,
            exited: false,
        }
    }

    /// The merged capability set.
    pub fn tools(&self) -> Arc<ToolRegistry> {
        Arc::clone(&self.report.tools)
    }

    pub fn report(&self) -> &ActivationReport {
        &self.report
    }

    pub fn teardown(&self) -> &Arc<TeardownCoordinator> {
        &self.teardown
    }

    /// Release every tracked connection.
    pub async fn exit(mut self) -> Result<()> {
        self.exited = true;
        self.teardown.release_all().await
    }
}

impl Drop for ActivationScope {
    fn drop(&mut self) {
        if self.exited {
            return;
        }
        debug!("Activation scope dropped, releasing in background");
        release_in_background(Arc::clone(&self.teardown));
    }
}

/// Armed while `enter` is still activating.
struct PendingRelease(Option<Arc<TeardownCoordinator>>);

impl PendingRelease {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for PendingRelease {
    fn drop(&mut self) {
        if let Some(teardown) = self.0.take() {
            debug!("Activation cancelled, releasing in background");
            release_in_background(teardown);
        }
    }
}

fn release_in_background(teardown: Arc<TeardownCoordinator>) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                if let Err(e) = teardown.release_all().await {
                    warn!(error = %e, "Background teardown failed");
                }
            });
        }
        Err(_) => warn!("Teardown outside a runtime, connections not released"),
    }
}

impl std::fmt::Debug for ActivationScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationScope")
            .field("tools", &self.report.tools)
            .field("failures", &self.report.failures.len())
            .field("exited", &self.exited)
            .finish()
    }
}

/// Run `work` inside an activation scope and release afterwards.
///
/// An error from `work` wins over a teardown error; the teardown error is
/// logged in that case.
pub async fn with_scope<F, Fut, T>(
    specs: &[ToolSpecification],
    config: &ActivationConfig,
    work: F,
) -> Result<T>
where
    F: FnOnce(Arc<ToolRegistry>) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let scope = ActivationScope::enter(specs, config).await;
    let outcome = work(scope.tools()).await;
    let released = scope.exit().await;

    match (outcome, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(teardown_err)) => {
            warn!(error = %teardown_err, "Teardown failed after error");
            Err(e)
        }
    }
}
