//! Local callable resolution.
//!
//! A local provider record names a module and a list of functions. Modules
//! registered in the [`LocalCatalog`] resolve functions to in-process tools;
//! anything else is looked up as an executable under the record's directory
//! (see [`ExecutableTool`]).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{ForgeError, Result};

use super::binary_plugin::{ExecutableTool, PluginManifest};
use super::config::LocalToolConfig;
use super::types::{Tool, ToolContext, ToolOutput};

/// Name of the module holding the built-in tools.
pub const BUILTIN_MODULE: &str = "builtin";

/// Builds a tool for a given provider id.
pub type ToolConstructor = Arc<dyn Fn(&str) -> Arc<dyn Tool> + Send + Sync>;

/// Tools resolved for one local provider record.
pub struct ResolvedLocalTools {
    pub tools: Vec<Arc<dyn Tool>>,
    /// Requested functions that could not be found
    pub missing: Vec<String>,
}

/// Registry of in-process tool modules.
#[derive(Clone, Default)]
pub struct LocalCatalog {
    modules: HashMap<String, HashMap<String, ToolConstructor>>,
}

impl LocalCatalog {
    /// Empty catalog. Only executable lookup is available.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the built-in module registered.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog.register(BUILTIN_MODULE, "echo", |provider| {
            Arc::new(EchoTool::new(provider)) as Arc<dyn Tool>
        });
        catalog.register(BUILTIN_MODULE, "current_time", |provider| {
            Arc::new(CurrentTimeTool::new(provider)) as Arc<dyn Tool>
        });
        catalog
    }

    /// Register a tool constructor under `module.function`.
    pub fn register<F>(&mut self, module: &str, function: &str, constructor: F)
    where
        F: Fn(&str) -> Arc<dyn Tool> + Send + Sync + 'static,
    {
        self.modules
            .entry(module.to_string())
            .or_default()
            .insert(function.to_string(), Arc::new(constructor));
    }

    pub fn has_module(&self, module: &str) -> bool {
        self.modules.contains_key(module)
    }

    /// Resolve every requested function of a local provider record.
    ///
    /// Functions that cannot be found are collected in `missing`; the
    /// caller decides whether a partial result is acceptable.
    pub fn resolve(
        &self,
        provider_id: &str,
        config: &LocalToolConfig,
        base_dir: Option<&Path>,
    ) -> ResolvedLocalTools {
        let module = self.modules.get(&config.module_path);
        let search_dir = executable_dir(config, base_dir);
        let mut tools = Vec::new();
        let mut missing = Vec::new();

        for spec in &config.functions {
            let name = function_name(spec);
            if let Some(constructor) = module.and_then(|m| m.get(name)) {
                debug!(provider = provider_id, function = name, "Resolved built-in callable");
                tools.push(constructor(provider_id));
                continue;
            }

            match find_executable(&search_dir, name) {
                Some(path) => {
                    debug!(
                        provider = provider_id,
                        function = name,
                        path = %path.display(),
                        "Resolved executable callable"
                    );
                    let mut tool = ExecutableTool::new(name, provider_id, path.clone());
                    if let Some(manifest) = PluginManifest::load_beside(&path) {
                        tool = tool.with_manifest(manifest);
                    }
                    tools.push(Arc::new(tool) as Arc<dyn Tool>);
                }
                None => {
                    warn!(
                        provider = provider_id,
                        module = %config.module_path,
                        function = name,
                        "Function not found"
                    );
                    missing.push(spec.clone());
                }
            }
        }

        ResolvedLocalTools { tools, missing }
    }
}

impl std::fmt::Debug for LocalCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut modules: Vec<_> = self.modules.keys().collect();
        modules.sort();
        f.debug_struct("LocalCatalog")
            .field("modules", &modules)
            .finish()
    }
}

/// Dotted function specs (`pkg.module.func`) use their last segment.
pub fn function_name(spec: &str) -> &str {
    spec.rsplit('.').next().unwrap_or(spec)
}

/// `<base>/<package_path>/<module_path with '.' as '/'>`
fn executable_dir(config: &LocalToolConfig, base_dir: Option<&Path>) -> PathBuf {
    let mut dir = base_dir.map(Path::to_path_buf).unwrap_or_default();
    if let Some(package) = &config.package_path {
        dir.push(package);
    }
    for segment in config.module_path.split('.').filter(|s| !s.is_empty()) {
        dir.push(segment);
    }
    dir
}

fn find_executable(dir: &Path, name: &str) -> Option<PathBuf> {
    let candidate = dir.join(name);
    if is_executable(&candidate) {
        Some(candidate)
    } else {
        None
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

// ============================================================================
// Built-in tools
// ============================================================================

/// Returns its `message` argument unchanged.
#[derive(Debug)]
pub struct EchoTool {
    provider_id: String,
}

impl EchoTool {
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
        }
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echoes back the provided message"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": {"type": "string", "description": "Message to echo back"}
            },
            "required": ["message"]
        })
    }

    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
        match args.get("message").and_then(Value::as_str) {
            Some(message) => Ok(ToolOutput::text(message)),
            None => Err(ForgeError::Tool(
                "echo requires a string 'message' argument".to_string(),
            )),
        }
    }
}

/// Returns the current time in RFC 3339.
#[derive(Debug)]
pub struct CurrentTimeTool {
    provider_id: String,
}

impl CurrentTimeTool {
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
        }
    }
}

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Returns the current date and time (UTC unless local is requested)"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "local": {"type": "boolean", "description": "Use the local timezone"}
            }
        })
    }

    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
        let local = args.get("local").and_then(Value::as_bool).unwrap_or(false);
        let now = if local {
            chrono::Local::now().to_rfc3339()
        } else {
            chrono::Utc::now().to_rfc3339()
        };
        Ok(ToolOutput::text(now))
    }
}
