//! Agent factory.
//!
//! Turns a [`FactoryConfig`] into an [`Agent`]: loads tool configuration
//! records, builds tool specifications, picks the conversation strategy and
//! prepares the session delegator. Remote providers are only activated when
//! [`AgentFactory::create_agent`] enters the activation scope.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::activation::ActivationScope;
use crate::config::FactoryConfig;
use crate::error::{ForgeError, Result};
use crate::session::{ConversationStrategy, FileBackingStore, SessionDelegator};
use crate::tools::{specifications, SpecEntry, SpecOutcome, ToolConfigRegistry, ToolSpecFactory};

use super::{Agent, ModelRuntime};

/// Framework used for bare model names.
pub const DEFAULT_FRAMEWORK: &str = "openai";

/// Split `framework:model_id` into its parts.
///
/// The framework is lowercased. A bare name uses [`DEFAULT_FRAMEWORK`];
/// an empty model id (`"litellm:"`) is allowed.
///
/// # Example
/// ```
/// use agentforge::agent::parse_model_string;
///
/// assert_eq!(parse_model_string("gpt-4o"), ("openai".into(), "gpt-4o".into()));
/// assert_eq!(
///     parse_model_string("LiteLLM:gemini/gemini-2.5-flash"),
///     ("litellm".into(), "gemini/gemini-2.5-flash".into())
/// );
/// ```
pub fn parse_model_string(model: &str) -> (String, String) {
    match model.split_once(':') {
        Some((framework, model_id)) => (framework.to_lowercase(), model_id.to_string()),
        None => (DEFAULT_FRAMEWORK.to_string(), model.to_string()),
    }
}

/// State produced by [`AgentFactory::initialize`].
struct Prepared {
    entries: Vec<SpecEntry>,
    sessions: Arc<SessionDelegator>,
    system_prompt: Option<String>,
}

/// Builds assembled agents from configuration.
pub struct AgentFactory {
    config: FactoryConfig,
    framework: String,
    model_id: String,
    spec_factory: ToolSpecFactory,
    prepared: Option<Prepared>,
}

impl AgentFactory {
    pub fn new(config: FactoryConfig) -> Self {
        Self::with_spec_factory(config, ToolSpecFactory::default())
    }

    /// Use a custom spec factory (for example one with extra catalog modules).
    pub fn with_spec_factory(config: FactoryConfig, spec_factory: ToolSpecFactory) -> Self {
        let (framework, model_id) = parse_model_string(&config.model);
        debug!(
            model = %config.model,
            framework = %framework,
            model_id = %model_id,
            "Parsed model string"
        );
        Self {
            config,
            framework,
            model_id,
            spec_factory,
            prepared: None,
        }
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    pub fn framework(&self) -> &str {
        &self.framework
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn is_initialized(&self) -> bool {
        self.prepared.is_some()
    }

    /// Load tool configuration and prepare sessions. Later calls do nothing.
    pub async fn initialize(&mut self) -> Result<()> {
        if self.prepared.is_some() {
            debug!("Factory already initialized");
            return Ok(());
        }
        info!("Initializing agent factory");

        let system_prompt = self.config.resolved_system_prompt()?;

        let registry = ToolConfigRegistry::load(&self.config.tool_config_paths);
        let entries = self.spec_factory.build_all(&registry);
        let failed: Vec<&SpecEntry> = entries
            .iter()
            .filter(|e| matches!(e.outcome, SpecOutcome::Failed(_)))
            .collect();
        if !failed.is_empty() {
            warn!(count = failed.len(), "Some tool configurations failed to load");
            for entry in failed {
                warn!(id = %entry.id, error = %entry.status(), "Tool configuration failed");
            }
        }

        let strategy = match self.config.resolved_summarization_prompt() {
            Ok(prompt) => ConversationStrategy::from_config(&self.config.conversation, prompt),
            Err(e) => {
                warn!(error = %e, "Failed to build conversation strategy, falling back to null");
                ConversationStrategy::Null
            }
        };
        debug!(strategy = %strategy.kind(), "Conversation strategy ready");

        let home = self.config.sessions_home_path();
        tokio::fs::create_dir_all(&home).await.map_err(|e| {
            ForgeError::SessionStore(format!("Cannot create '{}': {}", home.display(), e))
        })?;
        let sessions = Arc::new(SessionDelegator::new(
            Arc::new(FileBackingStore::new(home)),
            strategy,
        ));

        self.prepared = Some(Prepared {
            entries,
            sessions,
            system_prompt,
        });
        info!("Factory initialization completed");
        Ok(())
    }

    /// Per-record build results. Empty before `initialize`.
    pub fn spec_entries(&self) -> &[SpecEntry] {
        self.prepared
            .as_ref()
            .map(|p| p.entries.as_slice())
            .unwrap_or_default()
    }

    /// The session delegator, once initialized.
    pub fn sessions(&self) -> Option<&Arc<SessionDelegator>> {
        self.prepared.as_ref().map(|p| &p.sessions)
    }

    /// Activate the configured session, then every tool provider, and
    /// assemble the agent.
    ///
    /// The agent is available even when every remote provider failed.
    pub async fn create_agent(&self, runtime: Arc<dyn ModelRuntime>) -> Result<Agent> {
        let prepared = self.prepared.as_ref().ok_or_else(|| {
            ForgeError::Config("factory not initialized, call initialize() first".into())
        })?;

        if let Some(session_id) = &self.config.session_id {
            if !prepared.sessions.is_active().await {
                prepared.sessions.activate(session_id).await?;
            }
        }

        let specs = specifications(&prepared.entries);
        let scope = ActivationScope::enter(&specs, &self.config.activation).await;
        let report = scope.report();
        info!(
            runtime = runtime.name(),
            tools = report.tools.len(),
            failed_providers = report.failures.len(),
            "Agent assembled"
        );

        Ok(Agent::new(
            runtime,
            scope,
            Arc::clone(&prepared.sessions),
            prepared.system_prompt.clone(),
            self.config.agent.clone(),
        ))
    }
}

impl std::fmt::Debug for AgentFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentFactory")
            .field("framework", &self.framework)
            .field("model_id", &self.model_id)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AssembledAgent, EchoRuntime};
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> FactoryConfig {
        let tool_file = dir.path().join("basics.json");
        std::fs::write(
            &tool_file,
            r#"{"type": "python", "id": "basics", "module_path": "builtin", "functions": ["echo", "nope"]}"#,
        )
        .unwrap();
        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, r#"{"type": "smoke-signal", "id": "x"}"#).unwrap();

        FactoryConfig {
            tool_config_paths: vec![tool_file, broken],
            sessions_home: Some(dir.path().join("sessions")),
            ..FactoryConfig::default()
        }
    }

    #[test]
    fn test_parse_model_string() {
        assert_eq!(
            parse_model_string("anthropic:claude-3-5-sonnet"),
            ("anthropic".into(), "claude-3-5-sonnet".into())
        );
        assert_eq!(parse_model_string("litellm:"), ("litellm".into(), String::new()));
        assert_eq!(
            parse_model_string("ollama:llama2:13b"),
            ("ollama".into(), "llama2:13b".into())
        );
    }

    #[tokio::test]
    async fn test_create_before_initialize_fails() {
        let factory = AgentFactory::new(FactoryConfig::default());
        assert!(factory.spec_entries().is_empty());
        let err = factory.create_agent(Arc::new(EchoRuntime)).await.unwrap_err();
        assert!(matches!(err, ForgeError::Config(_)));
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut factory = AgentFactory::new(config_in(&dir));
        factory.initialize().await.unwrap();
        factory.initialize().await.unwrap();

        assert_eq!(factory.spec_entries().len(), 2);
        assert!(dir.path().join("sessions").is_dir());
    }

    #[tokio::test]
    async fn test_create_agent_with_partial_tools() {
        let dir = TempDir::new().unwrap();
        let mut factory = AgentFactory::new(config_in(&dir));
        factory.initialize().await.unwrap();

        let agent = factory.create_agent(Arc::new(EchoRuntime)).await.unwrap();
        let names: Vec<String> = agent.list_capabilities().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["echo"]);
        assert!(agent.report().statuses[0].missing.contains(&"nope".to_string()));
        agent.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_configured_session_is_activated() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.session_id = Some("daily".into());
        let mut factory = AgentFactory::new(config);
        factory.initialize().await.unwrap();

        let agent = factory.create_agent(Arc::new(EchoRuntime)).await.unwrap();
        assert_eq!(
            agent.sessions().current_session_id().await.as_deref(),
            Some("daily")
        );
        assert!(dir.path().join("sessions/session_daily").is_dir());
        agent.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unreadable_system_prompt_fails_initialize() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.system_prompt = Some(format!("@{}", dir.path().join("missing.txt").display()));
        let mut factory = AgentFactory::new(config);
        assert!(factory.initialize().await.is_err());
        assert!(!factory.is_initialized());
    }
}
