//! Error types for AgentForge
//!
//! This module defines all error types used throughout the crate. Uses
//! `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.
//!
//! The variants follow the lifecycle of an assembled agent: configuration
//! errors surface per record, activation and discovery errors are recovered
//! by the activator, teardown errors are aggregated, and session errors split
//! into the recoverable conflict case and an unusable backing store.

use std::fmt;
use thiserror::Error;

// ============================================================================
// Teardown Aggregation
// ============================================================================

/// A single failed release recorded during teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseFailure {
    /// Label of the released resource (usually the provider id).
    pub label: String,
    /// Rendered error message.
    pub message: String,
}

/// Every release failure from one `release_all` pass, in release order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownErrors {
    pub failures: Vec<ReleaseFailure>,
}

impl TeardownErrors {
    pub fn push(&mut self, label: impl Into<String>, message: impl Into<String>) {
        self.failures.push(ReleaseFailure {
            label: label.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }
}

impl fmt::Display for TeardownErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} release(s) failed", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; {}: {}", failure.label, failure.message)?;
        }
        Ok(())
    }
}

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for AgentForge operations.
#[derive(Error, Debug)]
pub enum ForgeError {
    /// Configuration errors (unknown provider tag, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tool loading or execution errors
    #[error("Tool error: {0}")]
    Tool(String),

    /// A remote connection could not be opened
    #[error("Activation error: {0}")]
    Activation(String),

    /// A connection opened but capability enumeration failed
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// One or more releases failed during teardown
    #[error("Teardown error: {0}")]
    Teardown(TeardownErrors),

    /// Persisted session state was written under an incompatible strategy
    #[error("Session conflict: {0}")]
    SessionConflict(String),

    /// The session backing store cannot be opened or initialized
    #[error("Session store unusable: {0}")]
    SessionStore(String),

    /// Other session management errors (invalid state, missing agent, etc.)
    #[error("Session error: {0}")]
    Session(String),

    /// MCP (Model Context Protocol) errors (server communication, tool calls)
    #[error("MCP error: {0}")]
    Mcp(String),

    /// Peer-agent (A2A) errors
    #[error("Peer agent error: {0}")]
    PeerAgent(String),

    /// Resource not found (sessions, tools, modules, etc.)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ForgeError {
    /// Returns `true` for the recoverable session conflict.
    pub fn is_session_conflict(&self) -> bool {
        matches!(self, ForgeError::SessionConflict(_))
    }
}

/// A specialized `Result` type for AgentForge operations.
pub type Result<T> = std::result::Result<T, ForgeError>;
