//! Session backing stores.
//!
//! [`BackingStore`] is the seam between the session delegator and the
//! storage medium. [`FileBackingStore`] keeps one directory per session:
//!
//! ```text
//! <home>/session_<name>/
//!     session.json
//!     agents/agent_default/agent.json          conversation state
//!     agents/agent_default/messages/message_<n>.json
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ForgeError, Result};

use super::conversation::{Conversation, ConversationState, ConversationStrategy};
use super::types::Message;

/// Directory prefix of every stored session.
pub const SESSION_DIR_PREFIX: &str = "session_";

const SESSION_FILE: &str = "session.json";
const AGENT_ID: &str = "default";

/// Contents of a backing store after `open`.
#[derive(Debug, Clone)]
pub struct StoredSession {
    pub name: String,
    pub path: PathBuf,
    pub messages: Vec<Message>,
    pub state: ConversationState,
    /// `true` when `open` created the store.
    pub created: bool,
}

/// Persistent storage for named sessions.
///
/// `open` reports [`ForgeError::SessionConflict`] when the stored state was
/// written by a different strategy. Every other failure is
/// [`ForgeError::SessionStore`].
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Directory that holds every session.
    fn home(&self) -> &Path;

    /// Location of the named session.
    fn path_for(&self, name: &str) -> PathBuf;

    /// Open the named session, creating it when missing.
    async fn open(&self, name: &str, strategy: &ConversationStrategy) -> Result<StoredSession>;

    /// Create the named session, replacing whatever is stored under that name.
    async fn create(&self, name: &str, strategy: &ConversationStrategy) -> Result<StoredSession>;

    /// Write the conversation starting at message index `offset`.
    ///
    /// Messages stored below `offset` are kept; stored messages past the end
    /// of the conversation are removed.
    async fn sync(&self, name: &str, offset: usize, conversation: &Conversation) -> Result<()>;

    /// Write one message at `index`.
    async fn append(&self, name: &str, index: usize, message: &Message) -> Result<()>;

    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    async fn remove(&self, path: &Path) -> Result<()>;

    /// Session names, sorted.
    async fn list(&self) -> Result<Vec<String>>;
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionRecord {
    session_id: String,
    session_type: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AgentRecord {
    agent_id: String,
    conversation_manager_state: ConversationState,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MessageRecord {
    message_id: usize,
    message: Message,
    created_at: DateTime<Utc>,
}

/// File-system backing store.
#[derive(Debug, Clone)]
pub struct FileBackingStore {
    home: PathBuf,
}

impl FileBackingStore {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    fn agent_dir(&self, name: &str) -> PathBuf {
        self.path_for(name)
            .join("agents")
            .join(format!("agent_{}", AGENT_ID))
    }

    fn messages_dir(&self, name: &str) -> PathBuf {
        self.agent_dir(name).join("messages")
    }

    async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
        let content = serde_json::to_string_pretty(value)?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| store_error("write", path, e))
    }

    async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| store_error("read", path, e))?;
        serde_json::from_str(&content).map_err(|e| {
            ForgeError::SessionStore(format!("Cannot parse '{}': {}", path.display(), e))
        })
    }

    async fn read_messages(&self, name: &str) -> Result<Vec<Message>> {
        let dir = self.messages_dir(name);
        let mut indexed = Vec::new();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(store_error("list", &dir, e)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| store_error("list", &dir, e))?
        {
            let path = entry.path();
            let Some(index) = message_index(&path) else {
                continue;
            };
            let record: MessageRecord = Self::read_json(&path).await?;
            indexed.push((index, record.message));
        }
        indexed.sort_by_key(|(index, _)| *index);
        Ok(indexed.into_iter().map(|(_, m)| m).collect())
    }

    async fn write_agent(
        &self,
        name: &str,
        state: &ConversationState,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        let record = AgentRecord {
            agent_id: AGENT_ID.to_string(),
            conversation_manager_state: state.clone(),
            created_at,
            updated_at: Utc::now(),
        };
        Self::write_json(&self.agent_dir(name).join("agent.json"), &record).await
    }
}

/// Reject names that would escape the sessions home.
///
/// ```
/// use agentforge::session::validate_session_name;
///
/// assert!(validate_session_name("work-2024").is_ok());
/// assert!(validate_session_name("x/../../y").is_err());
/// ```
pub fn validate_session_name(name: &str) -> Result<()> {
    let invalid = name.trim().is_empty()
        || name.contains(['/', '\\', '\0'])
        || name.contains("..");
    if invalid {
        return Err(ForgeError::Session(format!("Invalid session name '{}'", name)));
    }
    Ok(())
}

fn store_error(action: &str, path: &Path, e: std::io::Error) -> ForgeError {
    ForgeError::SessionStore(format!("Cannot {} '{}': {}", action, path.display(), e))
}

fn message_index(path: &Path) -> Option<usize> {
    path.file_name()?
        .to_str()?
        .strip_prefix("message_")?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

#[async_trait]
impl BackingStore for FileBackingStore {
    fn home(&self) -> &Path {
        &self.home
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.home.join(format!("{}{}", SESSION_DIR_PREFIX, name))
    }

    async fn open(&self, name: &str, strategy: &ConversationStrategy) -> Result<StoredSession> {
        validate_session_name(name)?;
        let path = self.path_for(name);
        if !tokio::fs::try_exists(path.join(SESSION_FILE))
            .await
            .map_err(|e| store_error("inspect", &path, e))?
        {
            return self.create(name, strategy).await;
        }

        let agent: AgentRecord = Self::read_json(&self.agent_dir(name).join("agent.json")).await?;
        let state = agent.conversation_manager_state;
        if !strategy.accepts(&state) {
            return Err(ForgeError::SessionConflict(format!(
                "session '{}' was written by the {} strategy, current strategy is {}",
                name,
                state.strategy,
                strategy.kind()
            )));
        }

        let messages = self.read_messages(name).await?;
        debug!(session = %name, messages = messages.len(), "Opened session store");
        Ok(StoredSession {
            name: name.to_string(),
            path,
            messages,
            state,
            created: false,
        })
    }

    async fn create(&self, name: &str, strategy: &ConversationStrategy) -> Result<StoredSession> {
        validate_session_name(name)?;
        let path = self.path_for(name);
        if tokio::fs::try_exists(&path)
            .await
            .map_err(|e| store_error("inspect", &path, e))?
        {
            self.remove(&path).await?;
        }
        let messages_dir = self.messages_dir(name);
        tokio::fs::create_dir_all(&messages_dir)
            .await
            .map_err(|e| store_error("create", &messages_dir, e))?;

        let now = Utc::now();
        let record = SessionRecord {
            session_id: name.to_string(),
            session_type: "AGENT".to_string(),
            created_at: now,
            updated_at: now,
        };
        Self::write_json(&path.join(SESSION_FILE), &record).await?;

        let state = ConversationState::new(strategy.kind());
        self.write_agent(name, &state, now).await?;

        info!(session = %name, path = %path.display(), "Created session store");
        Ok(StoredSession {
            name: name.to_string(),
            path,
            messages: Vec::new(),
            state,
            created: true,
        })
    }

    async fn sync(&self, name: &str, offset: usize, conversation: &Conversation) -> Result<()> {
        let session_file = self.path_for(name).join(SESSION_FILE);
        let mut session: SessionRecord = Self::read_json(&session_file).await?;
        session.updated_at = Utc::now();
        Self::write_json(&session_file, &session).await?;

        self.write_agent(name, conversation.state(), session.created_at)
            .await?;

        let dir = self.messages_dir(name);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| store_error("create", &dir, e))?;
        for (index, message) in conversation.messages().iter().enumerate() {
            self.append(name, offset + index, message).await?;
        }

        let count = offset + conversation.len();
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| store_error("list", &dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| store_error("list", &dir, e))?
        {
            let path = entry.path();
            if message_index(&path).is_some_and(|index| index >= count) {
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(|e| store_error("remove", &path, e))?;
            }
        }

        debug!(session = %name, messages = count, "Synced session store");
        Ok(())
    }

    async fn append(&self, name: &str, index: usize, message: &Message) -> Result<()> {
        let record = MessageRecord {
            message_id: index,
            message: message.clone(),
            created_at: Utc::now(),
        };
        let path = self.messages_dir(name).join(format!("message_{}.json", index));
        Self::write_json(&path, &record).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        tokio::fs::rename(from, to)
            .await
            .map_err(|e| store_error("rename", from, e))
    }

    async fn remove(&self, path: &Path) -> Result<()> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| store_error("inspect", path, e))?;
        let removed = if meta.is_dir() {
            tokio::fs::remove_dir_all(path).await
        } else {
            tokio::fs::remove_file(path).await
        };
        removed.map_err(|e| store_error("remove", path, e))
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.home).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(store_error("list", &self.home, e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| store_error("list", &self.home, e))?
        {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            if let Some(name) = entry
                .file_name()
                .to_str()
                .and_then(|n| n.strip_prefix(SESSION_DIR_PREFIX))
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConversationManagerKind;
    use tempfile::TempDir;

    fn window() -> ConversationStrategy {
        ConversationStrategy::SlidingWindow {
            window_size: 10,
            truncate_results: false,
        }
    }

    #[tokio::test]
    async fn test_open_creates_layout() {
        let dir = TempDir::new().unwrap();
        let store = FileBackingStore::new(dir.path());

        let stored = store.open("s1", &window()).await.unwrap();
        assert!(stored.created);
        assert!(stored.messages.is_empty());
        assert_eq!(stored.path, dir.path().join("session_s1"));
        assert!(stored.path.join("session.json").exists());
        assert!(stored
            .path
            .join("agents/agent_default/agent.json")
            .exists());
        assert!(stored.path.join("agents/agent_default/messages").is_dir());
    }

    #[tokio::test]
    async fn test_sync_and_reopen() {
        let dir = TempDir::new().unwrap();
        let store = FileBackingStore::new(dir.path());
        store.open("s1", &window()).await.unwrap();

        let mut conversation = window().new_conversation();
        conversation.push(Message::user("hello"));
        conversation.push(Message::assistant("hi"));
        store.sync("s1", 0, &conversation).await.unwrap();

        let stored = store.open("s1", &window()).await.unwrap();
        assert!(!stored.created);
        assert_eq!(stored.messages, conversation.messages());
    }

    #[tokio::test]
    async fn test_sync_removes_stale_messages() {
        let dir = TempDir::new().unwrap();
        let store = FileBackingStore::new(dir.path());
        store.open("s1", &window()).await.unwrap();

        let mut conversation = window().new_conversation();
        for i in 0..3 {
            conversation.push(Message::user(&format!("m{}", i)));
        }
        store.sync("s1", 0, &conversation).await.unwrap();
        conversation.clear();
        conversation.push(Message::user("only"));
        store.sync("s1", 0, &conversation).await.unwrap();

        let stored = store.open("s1", &window()).await.unwrap();
        assert_eq!(stored.messages, vec![Message::user("only")]);
    }

    #[tokio::test]
    async fn test_sync_with_offset_keeps_earlier_messages() {
        let dir = TempDir::new().unwrap();
        let store = FileBackingStore::new(dir.path());
        store.open("s1", &window()).await.unwrap();

        let mut conversation = window().new_conversation();
        conversation.push(Message::user("one"));
        conversation.push(Message::assistant("two"));
        store.sync("s1", 0, &conversation).await.unwrap();

        conversation.clear();
        store.sync("s1", 2, &conversation).await.unwrap();
        assert_eq!(store.open("s1", &window()).await.unwrap().messages.len(), 2);

        conversation.push(Message::user("three"));
        store.sync("s1", 2, &conversation).await.unwrap();
        let contents: Vec<String> = store
            .open("s1", &window())
            .await
            .unwrap()
            .messages
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_rejects_names_outside_home() {
        let dir = TempDir::new().unwrap();
        let store = FileBackingStore::new(dir.path().join("sessions"));

        for name in ["x/../../y", "..", "a\\b", "", "  "] {
            let err = store.open(name, &window()).await.unwrap_err();
            assert!(matches!(err, ForgeError::Session(_)), "{:?}", name);
            assert!(store.create(name, &window()).await.is_err());
        }
        assert!(!dir.path().join("y").exists());
        assert!(!dir.path().join("sessions").exists());
    }

    #[tokio::test]
    async fn test_open_with_other_strategy_conflicts() {
        let dir = TempDir::new().unwrap();
        let store = FileBackingStore::new(dir.path());
        store.open("s1", &window()).await.unwrap();

        let err = store
            .open("s1", &ConversationStrategy::Null)
            .await
            .unwrap_err();
        assert!(err.is_session_conflict());
    }

    #[tokio::test]
    async fn test_corrupt_state_is_store_error() {
        let dir = TempDir::new().unwrap();
        let store = FileBackingStore::new(dir.path());
        let stored = store.open("s1", &window()).await.unwrap();
        std::fs::write(stored.path.join("agents/agent_default/agent.json"), "{oops").unwrap();

        let err = store.open("s1", &window()).await.unwrap_err();
        assert!(matches!(err, ForgeError::SessionStore(_)));
    }

    #[tokio::test]
    async fn test_create_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let store = FileBackingStore::new(dir.path());
        store.open("s1", &window()).await.unwrap();
        let mut conversation = window().new_conversation();
        conversation.push(Message::user("old"));
        store.sync("s1", 0, &conversation).await.unwrap();

        let fresh = store.create("s1", &ConversationStrategy::Null).await.unwrap();
        assert_eq!(fresh.state.strategy, ConversationManagerKind::Null);
        let reopened = store.open("s1", &ConversationStrategy::Null).await.unwrap();
        assert!(reopened.messages.is_empty());
    }

    #[tokio::test]
    async fn test_list_only_session_dirs() {
        let dir = TempDir::new().unwrap();
        let store = FileBackingStore::new(dir.path());
        store.open("beta", &window()).await.unwrap();
        store.open("alpha", &window()).await.unwrap();
        std::fs::create_dir(dir.path().join("scratch")).unwrap();
        std::fs::write(dir.path().join("session_file.json"), "{}").unwrap();

        assert_eq!(store.list().await.unwrap(), vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn test_list_missing_home_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileBackingStore::new(dir.path().join("nope"));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[test]
    fn test_message_index() {
        assert_eq!(message_index(Path::new("/x/message_12.json")), Some(12));
        assert_eq!(message_index(Path::new("/x/message_a.json")), None);
        assert_eq!(message_index(Path::new("/x/session.json")), None);
    }
}
