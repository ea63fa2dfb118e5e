//! Tools module - tool configuration, specifications and execution
//!
//! This module turns declarative tool configuration into callable tools.
//! Records are loaded by [`ToolConfigRegistry`], turned into
//! [`ToolSpecification`]s by [`ToolSpecFactory`], and merged into a
//! [`ToolRegistry`] once remote providers have been activated.
//!
//! # Overview
//!
//! - `Tool` trait: The interface that all tools must implement
//! - `ToolContext`: Execution context (session, workspace)
//! - `ToolRegistry`: The merged capability set handed to the agent
//! - `RemoteTransport` / `Connection`: inert descriptor and live connection
//!   of a remote provider
//!
//! # Providers
//!
//! - local callables: built-in catalog modules or executable plugins
//! - MCP tool servers over stdio or HTTP
//! - peer agents over agent-to-agent RPC
//!
//! # Example
//!
//! ```rust
//! use agentforge::tools::{ToolConfigRegistry, ToolSpecFactory, ToolSpecification};
//! use serde_json::json;
//!
//! let registry = ToolConfigRegistry::from_values(vec![json!({
//!     "type": "python",
//!     "id": "basics",
//!     "module_path": "builtin",
//!     "functions": ["echo", "current_time"]
//! })]);
//!
//! let factory = ToolSpecFactory::default();
//! let entries = factory.build_all(&registry);
//! match entries[0].specification() {
//!     Some(ToolSpecification::Local(set)) => assert_eq!(set.tools.len(), 2),
//!     other => panic!("unexpected: {:?}", other),
//! }
//! ```

pub mod a2a;
pub mod binary_plugin;
pub mod config;
pub mod factory;
pub mod local;
pub mod mcp;
mod registry;
pub mod remote;
mod types;

pub use config::{
    FailedToolConfig, ToolConfigEntry, ToolConfigRecord, ToolConfigRegistry, ToolProviderConfig,
};
pub use factory::{
    specifications, LocalToolSet, SpecEntry, SpecOutcome, ToolSpecFactory, ToolSpecification,
};
pub use local::{CurrentTimeTool, EchoTool, LocalCatalog};
pub use registry::ToolRegistry;
pub use remote::{filter_capabilities, Connection, DeferredHandle, RemoteTool, RemoteTransport};
pub use types::{
    empty_object_schema, CapabilityDescriptor, ProviderKind, Tool, ToolContext, ToolDefinition,
    ToolOutput,
};
