//! Agent module - assembled agents and the factory that builds them
//!
//! An [`Agent`] owns the activation scope of its remote tool providers, the
//! merged capability set, and a handle to the session delegator. It exposes
//! exactly the operations callers need after assembly through
//! [`AssembledAgent`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ AgentFactory │────>│    Agent     │────>│ ModelRuntime │
//! │ (specs, cfg) │     │  (tool loop) │     │              │
//! └──────────────┘     └──────────────┘     └──────────────┘
//!                            │   │
//!                            ▼   ▼
//!                ┌──────────────┐ ┌──────────────────┐
//!                │ ToolRegistry │ │ SessionDelegator │
//!                └──────────────┘ └──────────────────┘
//! ```

pub mod factory;
pub mod runtime;

pub use factory::{parse_model_string, AgentFactory};
pub use runtime::{EchoRuntime, ModelRuntime, RuntimeReply, ECHO_TOOL_PREFIX};

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::activation::{ActivationReport, ActivationScope};
use crate::config::AgentSettings;
use crate::error::Result;
use crate::session::{Message, SessionDelegator};
use crate::tools::{ToolContext, ToolDefinition, ToolRegistry};

use runtime::RuntimeSummarizer;

/// Operations available on an assembled agent.
#[async_trait]
pub trait AssembledAgent: Send + Sync {
    /// Run one user interaction to completion and return the final reply.
    async fn run_interaction(&self, input: &str) -> Result<String>;

    /// Clear the live conversation. Stored sessions are left untouched.
    async fn clear_history(&self);

    /// Tool definitions of the merged capability set.
    fn list_capabilities(&self) -> Vec<ToolDefinition>;
}

/// Agent assembled from a model runtime, tools and a session delegator.
pub struct Agent {
    runtime: Arc<dyn ModelRuntime>,
    sessions: Arc<SessionDelegator>,
    report: ActivationReport,
    scope: Mutex<Option<ActivationScope>>,
    system_prompt: Option<String>,
    settings: AgentSettings,
    turn: Mutex<()>,
}

impl Agent {
    /// Build an agent around an entered activation scope.
    pub fn new(
        runtime: Arc<dyn ModelRuntime>,
        scope: ActivationScope,
        sessions: Arc<SessionDelegator>,
        system_prompt: Option<String>,
        settings: AgentSettings,
    ) -> Self {
        let report = scope.report().clone();
        Self {
            runtime,
            sessions,
            report,
            scope: Mutex::new(Some(scope)),
            system_prompt,
            settings,
            turn: Mutex::new(()),
        }
    }

    pub fn tools(&self) -> Arc<ToolRegistry> {
        Arc::clone(&self.report.tools)
    }

    /// Activation outcome per provider.
    pub fn report(&self) -> &ActivationReport {
        &self.report
    }

    pub fn sessions(&self) -> &Arc<SessionDelegator> {
        &self.sessions
    }

    pub fn runtime_name(&self) -> &str {
        self.runtime.name()
    }

    /// Save the active session and release every remote connection.
    ///
    /// Later calls do nothing.
    pub async fn shutdown(&self) -> Result<()> {
        let Some(scope) = self.scope.lock().await.take() else {
            debug!("Agent already shut down");
            return Ok(());
        };
        if let Err(e) = self.sessions.save().await {
            warn!(error = %e, "Failed to save session during shutdown");
        }
        info!("Shutting down agent");
        scope.exit().await
    }

    async fn execute_calls(&self, reply: &RuntimeReply, ctx: &ToolContext) -> Result<()> {
        for call in &reply.tool_calls {
            info!(tool = %call.name, id = %call.id, "Executing tool");
            let tools = &self.report.tools;
            let output = match call.arguments_value() {
                Ok(args) => match tools.execute_with_context(&call.name, args, ctx).await {
                    Ok(output) => output.content,
                    Err(e) => {
                        error!(tool = %call.name, error = %e, "Tool execution failed");
                        format!("Error: {}", e)
                    }
                },
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "Invalid JSON in tool arguments");
                    format!("Error: invalid arguments JSON: {}", e)
                }
            };
            self.sessions
                .append_message(Message::tool_result(&call.id, &output))
                .await?;
        }
        Ok(())
    }

    async fn reduce_history(&self) -> Result<()> {
        let removed = {
            let conversation = self.sessions.conversation();
            let mut conversation = conversation.write().await;
            let summarizer = RuntimeSummarizer(self.runtime.as_ref());
            self.sessions
                .strategy()
                .reduce(&mut conversation, Some(&summarizer))
                .await?
        };
        if removed > 0 {
            self.sessions.save().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl AssembledAgent for Agent {
    async fn run_interaction(&self, input: &str) -> Result<String> {
        let _turn = self.turn.lock().await;
        if input.trim().is_empty() {
            return Ok(String::new());
        }

        self.sessions.append_message(Message::user(input)).await?;

        let definitions = self.report.tools.definitions();
        let mut ctx = ToolContext::new();
        if let Some(id) = self.sessions.current_session_id().await {
            ctx = ctx.with_session(id);
        }

        let max_iterations = self.settings.max_tool_iterations;
        let mut iteration = 0;
        let final_reply = loop {
            let history = self.sessions.conversation().read().await.messages().to_vec();
            let reply = self
                .runtime
                .respond(self.system_prompt.as_deref(), &history, &definitions)
                .await?;

            if !reply.has_tool_calls() {
                break reply;
            }
            if iteration >= max_iterations {
                info!(
                    iterations = iteration,
                    "Tool loop reached maximum iterations, returning partial response"
                );
                break reply;
            }
            iteration += 1;
            debug!("Tool iteration {} of {}", iteration, max_iterations);

            self.sessions
                .append_message(Message::assistant_with_tools(
                    &reply.content,
                    reply.tool_calls.clone(),
                ))
                .await?;
            self.execute_calls(&reply, &ctx).await?;
        };

        self.sessions
            .append_message(Message::assistant(&final_reply.content))
            .await?;
        self.reduce_history().await?;
        Ok(final_reply.content)
    }

    async fn clear_history(&self) {
        self.sessions.clear_in_memory().await;
    }

    fn list_capabilities(&self) -> Vec<ToolDefinition> {
        self.report.tools.definitions()
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("runtime", &self.runtime.name())
            .field("tools", &self.report.tools.len())
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}
