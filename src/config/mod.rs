//! Configuration management for AgentForge
//!
//! This module provides configuration loading, saving and environment
//! overrides. Configuration is loaded from `~/.agentforge/config.json` by
//! default; any path ending in `.yaml`/`.yml` or `.toml` is parsed in that
//! format instead.

mod types;
pub mod validate;

pub use types::*;

use crate::error::{ForgeError, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Structured file formats understood by the loaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Yaml,
    Toml,
}

impl FileFormat {
    /// Pick a format from the file extension. Unknown extensions read as JSON.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("toml") => FileFormat::Toml,
            _ => FileFormat::Json,
        }
    }
}

/// Parse a JSON, YAML or TOML document into a generic JSON value.
///
/// An empty YAML document yields an empty object.
pub fn parse_structured(content: &str, format: FileFormat) -> Result<Value> {
    let value = match format {
        FileFormat::Json => serde_json::from_str(content)?,
        FileFormat::Yaml => {
            let value: Option<Value> = serde_yaml::from_str(content)?;
            value.unwrap_or_else(|| Value::Object(Default::default()))
        }
        FileFormat::Toml => {
            let table: toml::Table = toml::from_str(content)?;
            serde_json::to_value(table)?
        }
    };
    Ok(value)
}

/// Read and parse a structured file, choosing the format by extension.
pub fn load_structured_file(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Err(ForgeError::NotFound(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path)?;
    parse_structured(&content, FileFormat::from_path(path)).map_err(|e| {
        ForgeError::Config(format!("Problem loading file {}: {}", path.display(), e))
    })
}

impl FactoryConfig {
    /// Returns the AgentForge configuration directory path (~/.agentforge)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".agentforge")
    }

    /// Returns the path to the default config file (~/.agentforge/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    ///
    /// If the config file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let value = load_structured_file(path)?;
            serde_json::from_value(value)?
        } else {
            FactoryConfig::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables follow the pattern: AGENTFORGE_<FIELD>
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("AGENTFORGE_MODEL") {
            self.model = val;
        }
        if let Ok(val) = std::env::var("AGENTFORGE_SESSION_ID") {
            self.session_id = if val.is_empty() { None } else { Some(val) };
        }
        if let Ok(val) = std::env::var("AGENTFORGE_SESSIONS_HOME") {
            self.sessions_home = Some(expand_home(&val));
        }
        if let Ok(val) = std::env::var("AGENTFORGE_MAX_CONCURRENCY") {
            if let Ok(v) = val.parse() {
                self.activation.max_concurrency = v;
            }
        }
        if let Ok(val) = std::env::var("AGENTFORGE_LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    /// Save configuration to a specific path (always JSON).
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the session storage directory, expanding `~`.
    pub fn sessions_home_path(&self) -> PathBuf {
        match &self.sessions_home {
            Some(path) => expand_home(&path.to_string_lossy()),
            None => Self::dir().join("sessions"),
        }
    }

    /// Returns the system prompt with `@file` references resolved.
    pub fn resolved_system_prompt(&self) -> Result<Option<String>> {
        self.system_prompt
            .as_deref()
            .map(resolve_file_loadable)
            .transpose()
    }

    /// Returns the summarization prompt with `@file` references resolved.
    pub fn resolved_summarization_prompt(&self) -> Result<Option<String>> {
        self.conversation
            .custom_summarization_prompt
            .as_deref()
            .map(resolve_file_loadable)
            .transpose()
    }
}

/// Resolve a value that may reference a file with a leading `@`.
pub fn resolve_file_loadable(value: &str) -> Result<String> {
    match value.strip_prefix('@') {
        Some(path) => {
            let path = expand_home(path);
            std::fs::read_to_string(&path).map_err(|e| {
                ForgeError::Config(format!("Cannot read '{}': {}", path.display(), e))
            })
        }
        None => Ok(value.to_string()),
    }
}

/// Expand ~ to home directory in a path string
pub fn expand_home(path: &str) -> PathBuf {
    if path.is_empty() {
        return PathBuf::from(path);
    }

    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return match rest.strip_prefix('/') {
                Some(tail) => home.join(tail),
                None if rest.is_empty() => home,
                None => PathBuf::from(path),
            };
        }
    }

    PathBuf::from(path)
}
