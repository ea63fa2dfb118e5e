//! Session module - conversation history and persisted sessions
//!
//! This module provides:
//! - Message types shared with the agent and the model runtime
//! - Conversation strategies that bound history (null, sliding window,
//!   summarizing)
//! - A [`BackingStore`] seam with a file-system implementation
//! - The [`SessionDelegator`], which attaches the live conversation to at
//!   most one named session at a time
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use agentforge::session::{ConversationStrategy, FileBackingStore, Message, SessionDelegator};
//!
//! #[tokio::main]
//! async fn main() {
//!     let home = tempfile::tempdir().unwrap();
//!     let store = Arc::new(FileBackingStore::new(home.path()));
//!     let sessions = SessionDelegator::new(store, ConversationStrategy::Null);
//!
//!     sessions.activate("demo").await.unwrap();
//!     sessions.append_message(Message::user("Hello!")).await.unwrap();
//!
//!     assert_eq!(sessions.list_sessions().await.unwrap(), vec!["demo"]);
//! }
//! ```

pub mod conversation;
mod delegator;
pub mod store;
mod types;

pub use conversation::{Conversation, ConversationState, ConversationStrategy, Summarizer};
pub use delegator::{backup_path, SessionDelegator, SessionHandle, SessionInfo};
pub use store::{validate_session_name, BackingStore, FileBackingStore, StoredSession};
pub use types::{Message, Role, ToolCall};
