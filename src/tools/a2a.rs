//! Peer-agent (A2A) tool provider.
//!
//! Opening the provider fetches the agent card of every known URL. The
//! connection then exposes three capabilities: discover another agent, list
//! the agents discovered so far, and send a message to one of them over
//! JSON-RPC `message/send`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{ForgeError, Result};
use crate::tools::remote::{Connection, RemoteTransport};
use crate::tools::types::{CapabilityDescriptor, ProviderKind, ToolOutput};

pub const DISCOVER_AGENT: &str = "a2a_discover_agent";
pub const LIST_DISCOVERED_AGENTS: &str = "a2a_list_discovered_agents";
pub const SEND_MESSAGE: &str = "a2a_send_message";

const AGENT_CARD_PATH: &str = ".well-known/agent.json";

/// Published description of a peer agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCard {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// RPC endpoint; defaults to the URL the card was fetched from
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub skills: Vec<AgentSkill>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSkill {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Known peer agents. Inert until opened.
#[derive(Debug, Clone)]
pub struct PeerAgentTransport {
    provider_id: String,
    urls: Vec<String>,
    timeout: Duration,
    webhook_url: Option<String>,
    webhook_token: Option<String>,
}

impl PeerAgentTransport {
    pub fn new(provider_id: impl Into<String>, urls: Vec<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            urls,
            timeout: Duration::from_secs(300),
            webhook_url: None,
            webhook_token: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_webhook(mut self, url: Option<String>, token: Option<String>) -> Self {
        self.webhook_url = url;
        self.webhook_token = token;
        self
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }
}

#[async_trait]
impl RemoteTransport for PeerAgentTransport {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::PeerAgent
    }

    async fn open(&self) -> Result<Arc<dyn Connection>> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ForgeError::Activation(format!("HTTP client: {}", e)))?;

        let connection = PeerAgentConnection {
            provider_id: self.provider_id.clone(),
            client,
            agents: RwLock::new(BTreeMap::new()),
            webhook_url: self.webhook_url.clone(),
            webhook_token: self.webhook_token.clone(),
        };

        let mut errors = Vec::new();
        for url in &self.urls {
            if let Err(e) = connection.discover(url).await {
                warn!(
                    provider = %self.provider_id,
                    url = %url,
                    error = %e,
                    "Agent card unavailable"
                );
                errors.push(format!("{}: {}", url, e));
            }
        }

        if connection.agents.read().await.is_empty() {
            return Err(ForgeError::Activation(format!(
                "No peer agent reachable for '{}' ({})",
                self.provider_id,
                errors.join("; ")
            )));
        }

        info!(
            provider = %self.provider_id,
            agents = self.urls.len() - errors.len(),
            "Peer agents discovered"
        );
        Ok(Arc::new(connection))
    }
}

/// Live peer-agent client.
pub struct PeerAgentConnection {
    provider_id: String,
    client: reqwest::Client,
    /// Base URL -> card
    agents: RwLock<BTreeMap<String, AgentCard>>,
    webhook_url: Option<String>,
    webhook_token: Option<String>,
}

impl PeerAgentConnection {
    async fn discover(&self, url: &str) -> Result<AgentCard> {
        let base = url.trim_end_matches('/');
        let response = self
            .client
            .get(format!("{}/{}", base, AGENT_CARD_PATH))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ForgeError::PeerAgent(format!(
                "agent card request returned HTTP {}",
                response.status()
            )));
        }
        let card: AgentCard = response.json().await?;
        self.agents
            .write()
            .await
            .insert(base.to_string(), card.clone());
        Ok(card)
    }

    /// Find an agent by base URL or by card name.
    async fn resolve_endpoint(&self, target: &str) -> Option<String> {
        let agents = self.agents.read().await;
        let target = target.trim_end_matches('/');
        agents
            .iter()
            .find(|(base, card)| base.as_str() == target || card.name == target)
            .map(|(base, card)| card.url.clone().unwrap_or_else(|| base.clone()))
    }

    fn message_request(&self, text: &str) -> Value {
        let mut params = json!({
            "message": {
                "kind": "message",
                "role": "user",
                "messageId": uuid::Uuid::new_v4().to_string(),
                "parts": [{"kind": "text", "text": text}],
            }
        });
        if let Some(url) = &self.webhook_url {
            let mut push = json!({ "url": url });
            if let Some(token) = &self.webhook_token {
                push["token"] = json!(token);
            }
            params["configuration"] = json!({ "pushNotificationConfig": push });
        }
        json!({
            "jsonrpc": "2.0",
            "id": uuid::Uuid::new_v4().to_string(),
            "method": "message/send",
            "params": params,
        })
    }

    async fn send_message(&self, args: &Value) -> Result<ToolOutput> {
        let Some(text) = args.get("message_text").and_then(Value::as_str) else {
            return Ok(ToolOutput::error("Missing required argument 'message_text'"));
        };
        let Some(target) = args.get("target_agent_url").and_then(Value::as_str) else {
            return Ok(ToolOutput::error(
                "Missing required argument 'target_agent_url'",
            ));
        };

        let endpoint = match self.resolve_endpoint(target).await {
            Some(endpoint) => endpoint,
            None => {
                // Unknown agents are discovered on first contact
                let card = self.discover(target).await?;
                card.url.unwrap_or_else(|| target.trim_end_matches('/').to_string())
            }
        };

        let response: Value = self
            .client
            .post(&endpoint)
            .json(&self.message_request(text))
            .send()
            .await?
            .json()
            .await?;

        if let Some(err) = response.get("error") {
            return Ok(ToolOutput::error(format!("Peer agent error: {}", err)));
        }
        let result = response.get("result").cloned().unwrap_or(Value::Null);
        Ok(ToolOutput::text(extract_text(&result).unwrap_or_else(|| result.to_string())))
    }
}

/// Collect text parts from a message or task result.
fn extract_text(result: &Value) -> Option<String> {
    let mut texts = Vec::new();
    let mut collect = |parts: &Value| {
        if let Some(parts) = parts.as_array() {
            texts.extend(
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(Value::as_str))
                    .map(str::to_string),
            );
        }
    };

    collect(&result["parts"]);
    if let Some(artifacts) = result["artifacts"].as_array() {
        for artifact in artifacts {
            collect(&artifact["parts"]);
        }
    }
    collect(&result["status"]["message"]["parts"]);

    if texts.is_empty() {
        None
    } else {
        Some(texts.join("\n"))
    }
}

#[async_trait]
impl Connection for PeerAgentConnection {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    async fn list_capabilities(&self) -> Result<Vec<CapabilityDescriptor>> {
        Ok(vec![
            CapabilityDescriptor::new(
                DISCOVER_AGENT,
                "Discover a peer agent by URL and fetch its agent card",
                json!({
                    "type": "object",
                    "properties": {"url": {"type": "string", "description": "Base URL of the agent"}},
                    "required": ["url"]
                }),
            ),
            CapabilityDescriptor::new(
                LIST_DISCOVERED_AGENTS,
                "List every peer agent discovered so far",
                json!({"type": "object", "properties": {}}),
            ),
            CapabilityDescriptor::new(
                SEND_MESSAGE,
                "Send a message to a peer agent and return its reply",
                json!({
                    "type": "object",
                    "properties": {
                        "message_text": {"type": "string"},
                        "target_agent_url": {"type": "string", "description": "Agent URL or card name"}
                    },
                    "required": ["message_text", "target_agent_url"]
                }),
            ),
        ])
    }

    async fn invoke(&self, name: &str, args: Value) -> Result<ToolOutput> {
        match name {
            DISCOVER_AGENT => {
                let Some(url) = args.get("url").and_then(Value::as_str) else {
                    return Ok(ToolOutput::error("Missing required argument 'url'"));
                };
                match self.discover(url).await {
                    Ok(card) => Ok(ToolOutput::text(serde_json::to_string_pretty(&card)?)),
                    Err(e) => Ok(ToolOutput::error(format!("Discovery of {} failed: {}", url, e))),
                }
            }
            LIST_DISCOVERED_AGENTS => {
                let agents = self.agents.read().await;
                let listing: Vec<Value> = agents
                    .iter()
                    .map(|(url, card)| {
                        json!({"url": url, "name": card.name, "description": card.description})
                    })
                    .collect();
                Ok(ToolOutput::text(serde_json::to_string_pretty(&listing)?))
            }
            SEND_MESSAGE => self.send_message(&args).await,
            other => Err(ForgeError::NotFound(format!(
                "Peer agent provider '{}' has no capability '{}'",
                self.provider_id, other
            ))),
        }
    }

    async fn close(&self) -> Result<()> {
        self.agents.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(webhook: Option<&str>, token: Option<&str>) -> PeerAgentConnection {
        PeerAgentConnection {
            provider_id: "peers".to_string(),
            client: reqwest::Client::new(),
            agents: RwLock::new(BTreeMap::new()),
            webhook_url: webhook.map(str::to_string),
            webhook_token: token.map(str::to_string),
        }
    }

    #[test]
    fn test_agent_card_parsing() {
        let card: AgentCard = serde_json::from_value(json!({
            "name": "planner",
            "description": "Plans trips",
            "url": "http://planner:9000/rpc",
            "skills": [{"id": "plan", "name": "Plan", "description": "Make a plan"}],
            "version": "1.0"
        }))
        .unwrap();
        assert_eq!(card.name, "planner");
        assert_eq!(card.skills.len(), 1);
    }

    #[test]
    fn test_message_request_with_webhook() {
        let conn = connection(Some("http://me/hook"), Some("secret"));
        let req = conn.message_request("hello");
        assert_eq!(req["method"], "message/send");
        assert_eq!(req["params"]["message"]["parts"][0]["text"], "hello");
        assert_eq!(
            req["params"]["configuration"]["pushNotificationConfig"]["url"],
            "http://me/hook"
        );
        assert_eq!(
            req["params"]["configuration"]["pushNotificationConfig"]["token"],
            "secret"
        );

        let plain = connection(None, None).message_request("hi");
        assert!(plain["params"].get("configuration").is_none());
    }

    #[test]
    fn test_extract_text_from_task() {
        let result = json!({
            "kind": "task",
            "artifacts": [{"parts": [{"kind": "text", "text": "answer"}]}],
            "status": {"message": {"parts": [{"kind": "text", "text": "done"}]}}
        });
        assert_eq!(extract_text(&result).as_deref(), Some("answer\ndone"));
        assert!(extract_text(&json!({"kind": "task"})).is_none());
    }

    #[tokio::test]
    async fn test_resolve_endpoint_by_name_or_url() {
        let conn = connection(None, None);
        conn.agents.write().await.insert(
            "http://planner:9000".to_string(),
            AgentCard {
                name: "planner".to_string(),
                description: String::new(),
                url: None,
                skills: vec![],
            },
        );
        assert_eq!(
            conn.resolve_endpoint("planner").await.as_deref(),
            Some("http://planner:9000")
        );
        assert_eq!(
            conn.resolve_endpoint("http://planner:9000/").await.as_deref(),
            Some("http://planner:9000")
        );
        assert!(conn.resolve_endpoint("other").await.is_none());
    }

    #[tokio::test]
    async fn test_capabilities_and_unknown_invoke() {
        let conn = connection(None, None);
        let caps = conn.list_capabilities().await.unwrap();
        let names: Vec<_> = caps.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec![DISCOVER_AGENT, LIST_DISCOVERED_AGENTS, SEND_MESSAGE]);

        let listed = conn.invoke(LIST_DISCOVERED_AGENTS, json!({})).await.unwrap();
        assert_eq!(listed.content, "[]");
        assert!(conn.invoke("teleport", json!({})).await.is_err());

        let missing = conn.invoke(SEND_MESSAGE, json!({})).await.unwrap();
        assert!(missing.is_error);
    }

    #[tokio::test]
    async fn test_open_with_no_reachable_agent_fails() {
        let transport = PeerAgentTransport::new("peers", vec!["http://127.0.0.1:1".to_string()])
            .with_timeout(Duration::from_secs(2));
        let err = transport.open().await.err().unwrap();
        assert!(matches!(err, ForgeError::Activation(_)));
    }
}
