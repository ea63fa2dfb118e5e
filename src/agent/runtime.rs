//! Model runtime seam.
//!
//! The agent never talks to a model API directly. A [`ModelRuntime`] takes
//! the history and the tool definitions and answers with text and/or tool
//! calls. [`EchoRuntime`] ships for offline use and tests.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::session::{Message, Role, Summarizer, ToolCall};
use crate::tools::ToolDefinition;

/// One model turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeReply {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl RuntimeReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// The model collaborator behind an assembled agent.
#[async_trait]
pub trait ModelRuntime: Send + Sync {
    /// Runtime name for logs.
    fn name(&self) -> &str;

    async fn respond(
        &self,
        system_prompt: Option<&str>,
        history: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<RuntimeReply>;

    /// Summarize folded history. Defaults to one `respond` turn with the
    /// prompt as system prompt and no tools.
    async fn summarize(&self, messages: &[Message], prompt: &str) -> Result<String> {
        Ok(self.respond(Some(prompt), messages, &[]).await?.content)
    }
}

/// Adapts a runtime to the conversation [`Summarizer`] seam.
pub(crate) struct RuntimeSummarizer<'a>(pub &'a dyn ModelRuntime);

#[async_trait]
impl Summarizer for RuntimeSummarizer<'_> {
    async fn summarize(&self, messages: &[Message], prompt: &str) -> Result<String> {
        self.0.summarize(messages, prompt).await
    }
}

/// Prefix that makes [`EchoRuntime`] request a tool call.
pub const ECHO_TOOL_PREFIX: &str = "!tool ";

/// Offline runtime.
///
/// Repeats the latest user message. A user message of the form
/// `!tool <name> <json args>` becomes a call to that tool when it is
/// available, and the tool's output is then echoed back.
#[derive(Debug, Clone, Default)]
pub struct EchoRuntime;

impl EchoRuntime {
    pub fn new() -> Self {
        Self
    }

    fn requested_call(text: &str, tools: &[ToolDefinition], turn: usize) -> Option<ToolCall> {
        let rest = text.strip_prefix(ECHO_TOOL_PREFIX)?.trim();
        let (name, args) = match rest.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (rest, "{}"),
        };
        if !tools.iter().any(|t| t.name == name) {
            return None;
        }
        let args = serde_json::from_str::<Value>(args)
            .map(|v| v.to_string())
            .unwrap_or_else(|_| args.to_string());
        Some(ToolCall::new(&format!("echo_call_{}", turn), name, &args))
    }
}

#[async_trait]
impl ModelRuntime for EchoRuntime {
    fn name(&self) -> &str {
        "echo"
    }

    async fn respond(
        &self,
        _system_prompt: Option<&str>,
        history: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<RuntimeReply> {
        let Some(last) = history.last() else {
            return Ok(RuntimeReply::default());
        };

        if last.role == Role::Tool {
            return Ok(RuntimeReply::text(last.content.clone()));
        }

        if last.role == Role::User {
            if let Some(call) = Self::requested_call(&last.content, tools, history.len()) {
                return Ok(RuntimeReply {
                    content: String::new(),
                    tool_calls: vec![call],
                });
            }
        }

        Ok(RuntimeReply::text(last.content.clone()))
    }

    async fn summarize(&self, messages: &[Message], _prompt: &str) -> Result<String> {
        Ok(format!("{} earlier message(s)", messages.len()))
    }
}
