//! Session delegator.
//!
//! Binds the live conversation to at most one named backing store at a
//! time. While inactive, persistence calls are ignored; while active, they
//! are forwarded to the store.
//!
//! Activating a session whose stored state belongs to a different
//! conversation strategy never fails: the old store is renamed to a unique
//! backup path and a fresh store takes its name.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::utils::string::prefix_chars;

use super::conversation::{Conversation, ConversationStrategy};
use super::store::{validate_session_name, BackingStore, StoredSession};
use super::types::Message;

/// The active session's name and storage location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug)]
struct ActiveSession {
    handle: SessionHandle,
    /// Stored messages that precede the live conversation. Grows when the
    /// live conversation is cleared so later writes never overwrite them.
    stored_offset: usize,
}

/// Snapshot of delegator state for status output.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: Option<String>,
    pub is_active: bool,
    pub sessions_home: PathBuf,
    pub available_sessions: Vec<String>,
}

/// Backup location for a conflicting store: `<path>.backup.<secs>.<id8>`.
pub fn backup_path(path: &Path) -> PathBuf {
    let timestamp = chrono::Utc::now().timestamp();
    let unique = uuid::Uuid::new_v4().simple().to_string();
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".backup.{}.{}", timestamp, prefix_chars(&unique, 8)));
    PathBuf::from(name)
}

/// Switches the live conversation between named sessions.
pub struct SessionDelegator {
    store: Arc<dyn BackingStore>,
    strategy: ConversationStrategy,
    conversation: Arc<RwLock<Conversation>>,
    active: RwLock<Option<ActiveSession>>,
}

impl SessionDelegator {
    /// Create an inactive delegator with an empty conversation.
    pub fn new(store: Arc<dyn BackingStore>, strategy: ConversationStrategy) -> Self {
        let conversation = Arc::new(RwLock::new(strategy.new_conversation()));
        Self::with_conversation(store, strategy, conversation)
    }

    /// Create an inactive delegator sharing an existing conversation.
    pub fn with_conversation(
        store: Arc<dyn BackingStore>,
        strategy: ConversationStrategy,
        conversation: Arc<RwLock<Conversation>>,
    ) -> Self {
        Self {
            store,
            strategy,
            conversation,
            active: RwLock::new(None),
        }
    }

    pub fn conversation(&self) -> Arc<RwLock<Conversation>> {
        Arc::clone(&self.conversation)
    }

    pub fn strategy(&self) -> &ConversationStrategy {
        &self.strategy
    }

    pub fn sessions_home(&self) -> &Path {
        self.store.home()
    }

    pub async fn is_active(&self) -> bool {
        self.active.read().await.is_some()
    }

    pub async fn current_session_id(&self) -> Option<String> {
        self.active
            .read()
            .await
            .as_ref()
            .map(|a| a.handle.name.clone())
    }

    pub async fn active_session(&self) -> Option<SessionHandle> {
        self.active.read().await.as_ref().map(|a| a.handle.clone())
    }

    /// Open (or create) `name` and make it the active session.
    ///
    /// A stored session with messages replaces the live conversation; an
    /// empty or new one receives the live conversation. The previous session
    /// is detached only once the new one is ready.
    pub async fn activate(&self, name: &str) -> Result<()> {
        let mut active = self.active.write().await;
        info!(session = %name, "Switching active session");

        let stored = match self.store.open(name, &self.strategy).await {
            Ok(stored) => stored,
            Err(e) if e.is_session_conflict() => {
                warn!(session = %name, error = %e, "Session has incompatible conversation state");
                self.back_up(name).await;
                let fresh = self.store.create(name, &self.strategy).await?;
                info!(session = %name, strategy = %self.strategy.kind(), "Created fresh session");
                fresh
            }
            Err(e) => {
                error!(session = %name, error = %e, "Failed to open session");
                return Err(e);
            }
        };

        self.attach(stored).await?;
        *active = Some(ActiveSession {
            handle: SessionHandle {
                name: name.to_string(),
                path: self.store.path_for(name),
            },
            stored_offset: 0,
        });
        info!(session = %name, "Session is now active");
        Ok(())
    }

    async fn back_up(&self, name: &str) {
        let path = self.store.path_for(name);
        let backup = backup_path(&path);
        debug!(from = %path.display(), to = %backup.display(), "Backing up session");
        match self.store.rename(&path, &backup).await {
            Ok(()) => info!(backup = %backup.display(), "Session backup created"),
            Err(e) => warn!(session = %name, error = %e, "Failed to create session backup"),
        }
    }

    async fn attach(&self, stored: StoredSession) -> Result<()> {
        let mut conversation = self.conversation.write().await;
        if stored.messages.is_empty() {
            if !conversation.is_empty() {
                self.store.sync(&stored.name, 0, &conversation).await?;
            }
        } else {
            debug!(
                session = %stored.name,
                messages = stored.messages.len(),
                "Restoring conversation from session"
            );
            conversation.restore(stored.messages, stored.state);
        }
        Ok(())
    }

    /// Detach the active session. Stored data is left untouched.
    pub async fn deactivate(&self) {
        match self.active.write().await.take() {
            Some(active) => info!(session = %active.handle.name, "Deactivated session"),
            None => debug!("No active session to deactivate"),
        }
    }

    /// Permanently remove a stored session. Returns `false` when it does not
    /// exist. The active session is deactivated first.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        validate_session_name(name)?;
        {
            let mut active = self.active.write().await;
            if active.as_ref().is_some_and(|a| a.handle.name == name) {
                *active = None;
                info!(session = %name, "Deactivated session before delete");
            }
        }

        let path = self.store.path_for(name);
        if !self.list_sessions().await?.iter().any(|n| n == name) {
            warn!(session = %name, "Session not found");
            return Ok(false);
        }
        self.store.remove(&path).await?;
        info!(session = %name, "Deleted session");
        Ok(true)
    }

    /// Stored session names, sorted. Backups appear under their suffixed names.
    pub async fn list_sessions(&self) -> Result<Vec<String>> {
        self.store.list().await
    }

    /// Activate `name` only if it is already stored.
    pub async fn load(&self, name: &str) -> Result<bool> {
        if !self.list_sessions().await?.iter().any(|n| n == name) {
            warn!(session = %name, home = %self.store.home().display(), "Session not found");
            return Ok(false);
        }
        self.deactivate().await;
        self.activate(name).await?;
        Ok(self.is_active().await)
    }

    /// Clear the live conversation. Stored data is left untouched: later
    /// saves and appends go after the messages already stored.
    pub async fn clear_in_memory(&self) {
        let mut active = self.active.write().await;
        let mut conversation = self.conversation.write().await;
        let cleared = conversation.len();
        conversation.clear();
        match active.as_mut() {
            Some(active) => {
                active.stored_offset += cleared;
                info!(
                    session = %active.handle.name,
                    stored_offset = active.stored_offset,
                    "Cleared conversation, stored session left intact"
                );
            }
            None => debug!("Cleared conversation"),
        }
    }

    /// Write the live conversation to the active session.
    pub async fn save(&self) -> Result<()> {
        let active = self.active.read().await;
        let Some(active) = active.as_ref() else {
            debug!("Session inactive, nothing to save");
            return Ok(());
        };
        let conversation = self.conversation.read().await;
        self.store
            .sync(&active.handle.name, active.stored_offset, &conversation)
            .await?;
        info!(
            session = %active.handle.name,
            messages = conversation.len(),
            "Saved session"
        );
        Ok(())
    }

    /// Push a message onto the live conversation and persist it when active.
    pub async fn append_message(&self, message: Message) -> Result<()> {
        let active = self.active.read().await;
        let mut conversation = self.conversation.write().await;
        if let Some(active) = active.as_ref() {
            let index = active.stored_offset + conversation.len();
            self.store.append(&active.handle.name, index, &message).await?;
            debug!(session = %active.handle.name, index, "Appended message");
        }
        conversation.push(message);
        Ok(())
    }

    pub async fn info(&self) -> Result<SessionInfo> {
        let session_id = self.current_session_id().await;
        Ok(SessionInfo {
            is_active: session_id.is_some(),
            session_id,
            sessions_home: self.store.home().to_path_buf(),
            available_sessions: self.list_sessions().await?,
        })
    }
}

impl std::fmt::Debug for SessionDelegator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionDelegator")
            .field("home", &self.store.home())
            .field("strategy", &self.strategy.kind())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::FileBackingStore;
    use tempfile::TempDir;

    fn window() -> ConversationStrategy {
        ConversationStrategy::SlidingWindow {
            window_size: 20,
            truncate_results: false,
        }
    }

    fn delegator(dir: &TempDir, strategy: ConversationStrategy) -> SessionDelegator {
        SessionDelegator::new(Arc::new(FileBackingStore::new(dir.path())), strategy)
    }

    #[tokio::test]
    async fn test_starts_inactive() {
        let dir = TempDir::new().unwrap();
        let sessions = delegator(&dir, window());
        assert!(!sessions.is_active().await);
        assert_eq!(sessions.current_session_id().await, None);
        sessions.save().await.unwrap();
    }

    #[tokio::test]
    async fn test_activate_and_deactivate() {
        let dir = TempDir::new().unwrap();
        let sessions = delegator(&dir, window());

        sessions.activate("s1").await.unwrap();
        assert!(sessions.is_active().await);
        assert_eq!(sessions.current_session_id().await.as_deref(), Some("s1"));
        assert_eq!(
            sessions.active_session().await.unwrap().path,
            dir.path().join("session_s1")
        );

        sessions.deactivate().await;
        assert!(!sessions.is_active().await);
        assert_eq!(sessions.list_sessions().await.unwrap(), vec!["s1"]);
    }

    #[tokio::test]
    async fn test_activate_pushes_live_conversation_into_new_session() {
        let dir = TempDir::new().unwrap();
        let sessions = delegator(&dir, window());
        sessions.append_message(Message::user("before")).await.unwrap();

        sessions.activate("s1").await.unwrap();

        let other = delegator(&dir, window());
        other.activate("s1").await.unwrap();
        let conversation = other.conversation();
        assert_eq!(conversation.read().await.messages(), &[Message::user("before")]);
    }

    #[tokio::test]
    async fn test_append_persists_while_active() {
        let dir = TempDir::new().unwrap();
        let sessions = delegator(&dir, window());
        sessions.activate("s1").await.unwrap();
        sessions.append_message(Message::user("one")).await.unwrap();
        sessions.append_message(Message::assistant("two")).await.unwrap();

        let reloaded = delegator(&dir, window());
        assert!(reloaded.load("s1").await.unwrap());
        assert_eq!(reloaded.conversation().read().await.len(), 2);
    }

    #[tokio::test]
    async fn test_load_missing_session() {
        let dir = TempDir::new().unwrap();
        let sessions = delegator(&dir, window());
        assert!(!sessions.load("ghost").await.unwrap());
        assert!(!sessions.is_active().await);
    }

    #[tokio::test]
    async fn test_delete_active_session() {
        let dir = TempDir::new().unwrap();
        let sessions = delegator(&dir, window());
        sessions.activate("s1").await.unwrap();

        assert!(sessions.delete("s1").await.unwrap());
        assert!(!sessions.is_active().await);
        assert!(sessions.list_sessions().await.unwrap().is_empty());
        assert!(!sessions.delete("s1").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_other_session_keeps_active() {
        let dir = TempDir::new().unwrap();
        let sessions = delegator(&dir, window());
        sessions.activate("s1").await.unwrap();
        sessions.activate("s2").await.unwrap();

        assert!(sessions.delete("s1").await.unwrap());
        assert_eq!(sessions.current_session_id().await.as_deref(), Some("s2"));
    }

    #[tokio::test]
    async fn test_clear_in_memory_keeps_store() {
        let dir = TempDir::new().unwrap();
        let sessions = delegator(&dir, window());
        sessions.activate("s1").await.unwrap();
        sessions.append_message(Message::user("keep me")).await.unwrap();

        sessions.clear_in_memory().await;
        assert!(sessions.conversation().read().await.is_empty());
        assert!(sessions.is_active().await);
        assert_eq!(sessions.list_sessions().await.unwrap(), vec!["s1"]);

        let reloaded = delegator(&dir, window());
        reloaded.activate("s1").await.unwrap();
        assert_eq!(reloaded.conversation().read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_save_after_clear_keeps_stored_messages() {
        let dir = TempDir::new().unwrap();
        let sessions = delegator(&dir, window());
        sessions.activate("s1").await.unwrap();
        sessions.append_message(Message::user("one")).await.unwrap();
        sessions.append_message(Message::assistant("two")).await.unwrap();

        sessions.clear_in_memory().await;
        sessions.save().await.unwrap();

        let reloaded = delegator(&dir, window());
        assert!(reloaded.load("s1").await.unwrap());
        assert_eq!(reloaded.conversation().read().await.len(), 2);
    }

    #[tokio::test]
    async fn test_append_after_clear_goes_after_stored_messages() {
        let dir = TempDir::new().unwrap();
        let sessions = delegator(&dir, window());
        sessions.activate("s1").await.unwrap();
        sessions.append_message(Message::user("one")).await.unwrap();
        sessions.append_message(Message::assistant("two")).await.unwrap();

        sessions.clear_in_memory().await;
        sessions.append_message(Message::user("new")).await.unwrap();
        sessions.save().await.unwrap();
        assert_eq!(sessions.conversation().read().await.len(), 1);

        let reloaded = delegator(&dir, window());
        reloaded.activate("s1").await.unwrap();
        let conversation = reloaded.conversation();
        let contents: Vec<String> = conversation
            .read()
            .await
            .messages()
            .iter()
            .map(|m| m.content.clone())
            .collect();
        assert_eq!(contents, vec!["one", "two", "new"]);
    }

    #[tokio::test]
    async fn test_rejects_path_like_names() {
        let dir = TempDir::new().unwrap();
        let sessions = delegator(&dir, window());
        assert!(sessions.activate("x/../../y").await.is_err());
        assert!(!sessions.is_active().await);
        assert!(sessions.delete("../outside").await.is_err());
    }

    #[tokio::test]
    async fn test_conflict_backs_up_and_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let first = delegator(&dir, window());
        first.activate("s1").await.unwrap();
        first.append_message(Message::user("old")).await.unwrap();

        let second = delegator(&dir, ConversationStrategy::Null);
        second.activate("s1").await.unwrap();

        assert!(second.is_active().await);
        assert!(second.conversation().read().await.is_empty());
        let names = second.list_sessions().await.unwrap();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"s1".to_string()));
        assert!(names.iter().any(|n| n.starts_with("s1.backup.")));
    }

    #[tokio::test]
    async fn test_info() {
        let dir = TempDir::new().unwrap();
        let sessions = delegator(&dir, window());
        sessions.activate("s1").await.unwrap();

        let info = sessions.info().await.unwrap();
        assert_eq!(info.session_id.as_deref(), Some("s1"));
        assert!(info.is_active);
        assert_eq!(info.sessions_home, dir.path());
        assert_eq!(info.available_sessions, vec!["s1"]);
    }

    #[test]
    fn test_backup_paths_are_unique() {
        let path = Path::new("/tmp/sessions/session_s1");
        let a = backup_path(path);
        let b = backup_path(path);
        assert_ne!(a, b);
        assert!(a
            .to_string_lossy()
            .starts_with("/tmp/sessions/session_s1.backup."));
    }
}
