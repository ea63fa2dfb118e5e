//! Shared CLI helpers used across multiple command handlers.

use std::io::{self, BufRead};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use agentforge::activation::ActivationReport;
use agentforge::config::FactoryConfig;
use agentforge::session::{ConversationStrategy, FileBackingStore, SessionDelegator};

use super::ToolArgs;

/// Load config from `path`, or the default location.
pub(crate) fn load_config(path: Option<&Path>) -> Result<FactoryConfig> {
    match path {
        Some(path) => FactoryConfig::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => FactoryConfig::load().context("Failed to load config"),
    }
}

/// Load config and append tool files given on the command line.
pub(crate) fn load_with_tools(path: Option<&Path>, tools: &ToolArgs) -> Result<FactoryConfig> {
    let mut config = load_config(path)?;
    config
        .tool_config_paths
        .extend(tools.tool_config.iter().cloned());
    Ok(config)
}

/// Session delegator for commands that only manage stored sessions.
pub(crate) fn session_delegator(config: &FactoryConfig, home: Option<&Path>) -> SessionDelegator {
    let home = home
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.sessions_home_path());
    let strategy = ConversationStrategy::from_config(&config.conversation, None);
    SessionDelegator::new(Arc::new(FileBackingStore::new(home)), strategy)
}

/// Read a line from stdin, trimming whitespace. `None` at end of input.
pub(crate) fn read_line() -> Result<Option<String>> {
    let mut input = String::new();
    let read = io::stdin()
        .lock()
        .read_line(&mut input)
        .with_context(|| "Failed to read input")?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim().to_string()))
}

/// Print provider failures to stderr.
pub(crate) fn print_failures(report: &ActivationReport) {
    for failure in &report.failures {
        eprintln!(
            "  ! {} ({}): {}",
            failure.provider_id, failure.stage, failure.message
        );
    }
}
