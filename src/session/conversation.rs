//! Conversation history and the strategies that bound it.
//!
//! Three strategies are supported:
//!
//! - **null**: history grows without limit.
//! - **sliding_window**: drop the oldest messages once the window is full.
//!   The window never starts on a tool result, so a result is never separated
//!   from the call that produced it.
//! - **summarizing**: fold the oldest share of history into one summary
//!   message, keeping the most recent messages verbatim.
//!
//! The strategy writes a small [`ConversationState`] that the session store
//! persists next to the messages. A session written under one strategy
//! cannot be resumed under another.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{ConversationConfig, ConversationManagerKind};
use crate::error::Result;
use crate::utils::string::{preview, truncate_with_marker};

use super::types::{Message, Role};

/// Prefix of the message that replaces folded history.
pub const SUMMARY_PREFIX: &str = "[Conversation Summary]";

/// Tool results larger than this are truncated by the sliding window.
pub const MAX_TOOL_RESULT_CHARS: usize = 8_000;

const DEFAULT_SUMMARIZATION_PROMPT: &str = "Summarize the following conversation so that it \
can replace the original messages. Keep facts, decisions, tool results and open questions.";

/// Persisted strategy state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Strategy that produced this state
    pub strategy: ConversationManagerKind,
    /// Messages dropped or folded so far
    #[serde(default)]
    pub removed_message_count: usize,
    /// Latest summary text (summarizing only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl ConversationState {
    pub fn new(strategy: ConversationManagerKind) -> Self {
        Self {
            strategy,
            removed_message_count: 0,
            summary: None,
        }
    }
}

/// The live, in-memory conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    messages: Vec<Message>,
    state: ConversationState,
}

impl Conversation {
    pub fn new(strategy: ConversationManagerKind) -> Self {
        Self {
            messages: Vec::new(),
            state: ConversationState::new(strategy),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop every message and reset strategy bookkeeping.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.state = ConversationState::new(self.state.strategy);
    }

    /// Replace history and state with persisted values.
    pub fn restore(&mut self, messages: Vec<Message>, state: ConversationState) {
        self.messages = messages;
        self.state = state;
    }
}

/// Produces summary text for folded history.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, messages: &[Message], prompt: &str) -> Result<String>;
}

/// History strategy built from [`ConversationConfig`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationStrategy {
    Null,
    SlidingWindow {
        window_size: usize,
        truncate_results: bool,
    },
    Summarizing {
        threshold: usize,
        summary_ratio: f64,
        preserve_recent: usize,
        prompt: Option<String>,
    },
}

impl ConversationStrategy {
    /// Build a strategy. `prompt` is the resolved summarization prompt.
    pub fn from_config(config: &ConversationConfig, prompt: Option<String>) -> Self {
        match config.manager {
            ConversationManagerKind::Null => Self::Null,
            ConversationManagerKind::SlidingWindow => Self::SlidingWindow {
                window_size: config.sliding_window_size.max(1),
                truncate_results: config.should_truncate_results,
            },
            ConversationManagerKind::Summarizing => Self::Summarizing {
                threshold: config.sliding_window_size.max(2),
                summary_ratio: config.summary_ratio.clamp(0.1, 0.8),
                preserve_recent: config.preserve_recent_messages,
                prompt,
            },
        }
    }

    pub fn kind(&self) -> ConversationManagerKind {
        match self {
            Self::Null => ConversationManagerKind::Null,
            Self::SlidingWindow { .. } => ConversationManagerKind::SlidingWindow,
            Self::Summarizing { .. } => ConversationManagerKind::Summarizing,
        }
    }

    /// Whether persisted state can be resumed by this strategy.
    pub fn accepts(&self, state: &ConversationState) -> bool {
        state.strategy == self.kind()
    }

    /// A fresh conversation owned by this strategy.
    pub fn new_conversation(&self) -> Conversation {
        Conversation::new(self.kind())
    }

    /// Bound the conversation. Returns the number of messages removed.
    ///
    /// Without a summarizer the summarizing strategy writes a plain digest
    /// of the folded messages.
    pub async fn reduce(
        &self,
        conversation: &mut Conversation,
        summarizer: Option<&dyn Summarizer>,
    ) -> Result<usize> {
        match self {
            Self::Null => Ok(0),
            Self::SlidingWindow {
                window_size,
                truncate_results,
            } => Ok(apply_window(conversation, *window_size, *truncate_results)),
            Self::Summarizing {
                threshold,
                summary_ratio,
                preserve_recent,
                prompt,
            } => {
                if conversation.len() <= *threshold {
                    return Ok(0);
                }
                let count =
                    fold_count(&conversation.messages, *summary_ratio, *preserve_recent);
                if count == 0 {
                    debug!(
                        messages = conversation.len(),
                        preserve_recent, "Nothing old enough to summarize"
                    );
                    return Ok(0);
                }

                let folded = &conversation.messages[..count];
                let prompt = prompt.as_deref().unwrap_or(DEFAULT_SUMMARIZATION_PROMPT);
                let text = match summarizer {
                    Some(s) => match s.summarize(folded, prompt).await {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, "Summarizer failed, using plain digest");
                            digest(folded)
                        }
                    },
                    None => digest(folded),
                };

                let summary = Message::user(&format!("{}\n{}", SUMMARY_PREFIX, text));
                conversation.messages.drain(..count);
                conversation.messages.insert(0, summary);
                conversation.state.removed_message_count += count;
                conversation.state.summary = Some(text);
                info!(folded = count, remaining = conversation.len(), "Summarized conversation");
                Ok(count)
            }
        }
    }
}

fn apply_window(
    conversation: &mut Conversation,
    window_size: usize,
    truncate_results: bool,
) -> usize {
    let messages = &mut conversation.messages;

    if truncate_results {
        let recent_start = messages.len().saturating_sub(2);
        for msg in messages[..recent_start].iter_mut() {
            if msg.role == Role::Tool && msg.content.chars().count() > MAX_TOOL_RESULT_CHARS {
                msg.content = truncate_with_marker(&msg.content, MAX_TOOL_RESULT_CHARS);
            }
        }
    }

    if messages.len() <= window_size {
        return 0;
    }

    let mut start = messages.len() - window_size;
    while start < messages.len() && messages[start].role == Role::Tool {
        start += 1;
    }

    messages.drain(..start);
    conversation.state.removed_message_count += start;
    debug!(removed = start, kept = messages.len(), "Trimmed conversation window");
    start
}

/// Number of leading messages to fold. The remainder never starts on a tool
/// result and keeps at least `preserve_recent` messages.
fn fold_count(messages: &[Message], ratio: f64, preserve_recent: usize) -> usize {
    let len = messages.len();
    let max_fold = len.saturating_sub(preserve_recent);
    let mut count = ((len as f64 * ratio) as usize).max(1).min(max_fold);
    while count > 0 && count < len && messages[count].role == Role::Tool {
        count += 1;
    }
    if count > max_fold {
        return 0;
    }
    count
}

fn digest(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role, preview(&m.content, 120)))
        .collect::<Vec<_>>()
        .join("\n")
}
