//! AgentForge - declarative agent assembly
//!
//! Builds agents from tool provider records and session settings:
//! tool specifications are built without touching the network, remote
//! providers are activated under a bounded worker pool with an all-finish
//! barrier, connections are released in reverse order on every exit path,
//! and conversations persist through a switchable session delegator.

pub mod activation;
pub mod agent;
pub mod config;
pub mod error;
pub mod session;
pub mod tools;
pub mod utils;

pub use activation::{
    with_scope, ActivationReport, ActivationScope, ResourceActivator, TeardownCoordinator,
};
pub use agent::{Agent, AgentFactory, AssembledAgent, EchoRuntime, ModelRuntime, RuntimeReply};
pub use config::FactoryConfig;
pub use error::{ForgeError, Result};
pub use session::{
    Conversation, ConversationStrategy, FileBackingStore, Message, Role, SessionDelegator,
    ToolCall,
};
pub use tools::{Tool, ToolDefinition, ToolRegistry, ToolSpecFactory, ToolSpecification};
