//! Configuration type definitions for AgentForge
//!
//! This module defines the configuration structs consumed by the agent
//! factory. All types implement serde traits and have sensible defaults, so a
//! partial config file only needs to name what it changes.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration struct for the agent factory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FactoryConfig {
    /// Model identifier, `framework:model_id` or a bare model name.
    pub model: String,
    /// System prompt. A value starting with `@` names a file to read.
    pub system_prompt: Option<String>,
    /// Message sent once right after the agent is created.
    pub initial_message: Option<String>,
    /// Framework-specific model options, passed through untouched.
    pub model_config: Option<serde_json::Map<String, serde_json::Value>>,
    /// Paths to individual tool configuration files.
    pub tool_config_paths: Vec<PathBuf>,
    /// Directory holding persisted sessions. Defaults to `~/.agentforge/sessions`.
    pub sessions_home: Option<PathBuf>,
    /// Session activated when the agent is created. `None` keeps sessions inactive.
    pub session_id: Option<String>,
    /// Conversation history strategy
    pub conversation: ConversationConfig,
    /// Remote tool activation settings
    pub activation: ActivationConfig,
    /// Assembled agent settings
    pub agent: AgentSettings,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            system_prompt: None,
            initial_message: None,
            model_config: None,
            tool_config_paths: Vec::new(),
            sessions_home: None,
            session_id: None,
            conversation: ConversationConfig::default(),
            activation: ActivationConfig::default(),
            agent: AgentSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_model() -> String {
    "echo:default".to_string()
}

// ============================================================================
// Conversation Configuration
// ============================================================================

/// Conversation history management strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConversationManagerKind {
    /// No management, unlimited history
    Null,
    /// Keep only the most recent messages
    #[default]
    SlidingWindow,
    /// Fold older messages into a summary
    Summarizing,
}

impl std::fmt::Display for ConversationManagerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::SlidingWindow => write!(f, "sliding_window"),
            Self::Summarizing => write!(f, "summarizing"),
        }
    }
}

/// Conversation management configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Strategy used to bound conversation history
    pub manager: ConversationManagerKind,
    /// Maximum messages kept by the sliding window
    pub sliding_window_size: usize,
    /// Messages never folded into a summary
    pub preserve_recent_messages: usize,
    /// Share of older messages folded per summarization (0.1-0.8)
    pub summary_ratio: f64,
    /// Truncate oversized tool results instead of dropping history
    pub should_truncate_results: bool,
    /// Prompt used when summarizing. A value starting with `@` names a file.
    pub custom_summarization_prompt: Option<String>,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            manager: ConversationManagerKind::SlidingWindow,
            sliding_window_size: default_window_size(),
            preserve_recent_messages: default_preserve_recent(),
            summary_ratio: default_summary_ratio(),
            should_truncate_results: true,
            custom_summarization_prompt: None,
        }
    }
}

fn default_window_size() -> usize {
    40
}

fn default_preserve_recent() -> usize {
    10
}

fn default_summary_ratio() -> f64 {
    0.3
}

// ============================================================================
// Activation Configuration
// ============================================================================

/// Remote tool-provider activation configuration.
///
/// Passed explicitly into the activator; nothing here is read from globals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivationConfig {
    /// Maximum number of remote activations running at once
    pub max_concurrency: usize,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
        }
    }
}

pub(crate) fn default_max_concurrency() -> usize {
    3
}

// ============================================================================
// Agent Settings
// ============================================================================

/// Settings for the assembled agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Upper bound on tool-call rounds per interaction
    pub max_tool_iterations: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_tool_iterations: 10,
        }
    }
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Multi-line human readable output
    Pretty,
    /// Compact single-line output with a `component` field
    #[default]
    Component,
    /// JSON lines for log aggregators
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
    /// Optional file to append log lines to (JSON format only)
    pub file: Option<String>,
    /// Default level filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Component,
            file: None,
            level: "info".to_string(),
        }
    }
}
