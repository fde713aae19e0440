//! Chat model abstraction.
//!
//! Conversation turns are typed as [`Message`] values with a [`Role`] and
//! role-specific fields, and model replies are validated into
//! [`AssistantReply`] at this boundary. Everything past this module works
//! with concrete types instead of raw JSON maps.
//!
//! Implementations:
//! - **[`OllamaChat`]** — `POST /api/chat` with `stream = false` and an
//!   optional tool catalog.
//! - **[`StubChat`]** — deterministic placeholder in the structured answer
//!   format, for running the pipeline without a model server.
//!
//! Use [`create_chat_model`] to pick one from configuration.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::LlmConfig;
use crate::tools::ToolDefinition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One conversation turn.
///
/// `tool_calls` is only populated on assistant turns and `tool_name` only on
/// tool turns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(rename = "name", skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content.into())
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content.into())
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls,
            tool_name: None,
        }
    }

    pub fn tool(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_name: Some(name.into()),
        }
    }

    fn plain(role: Role, content: String) -> Self {
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            tool_name: None,
        }
    }
}

/// A model-issued request to run one tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl ToolCallRequest {
    /// Build from a wire entry shaped `{function: {name, arguments}}`.
    ///
    /// `arguments` may be a map or JSON-encoded text; anything that does not
    /// end up as a map becomes an empty map.
    pub fn from_wire(entry: &Value) -> Self {
        let function = entry.get("function").unwrap_or(entry);
        let name = function
            .get("name")
            .and_then(|n| n.as_str())
            .unwrap_or_default()
            .to_string();
        let arguments = parse_arguments(function.get("arguments"));
        Self { name, arguments }
    }
}

impl Serialize for ToolCallRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Function<'a> {
            name: &'a str,
            arguments: &'a Map<String, Value>,
        }
        #[derive(Serialize)]
        struct Wire<'a> {
            function: Function<'a>,
        }

        Wire {
            function: Function {
                name: &self.name,
                arguments: &self.arguments,
            },
        }
        .serialize(serializer)
    }
}

/// Normalise tool arguments to a map, defaulting to empty.
pub fn parse_arguments(raw: Option<&Value>) -> Map<String, Value> {
    match raw {
        Some(Value::Object(map)) => map.clone(),
        Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                debug!(arguments = %other, "tool arguments are not an object, using empty map");
                Map::new()
            }
            Err(e) => {
                debug!(error = %e, "tool arguments are not valid JSON, using empty map");
                Map::new()
            }
        },
        Some(Value::Null) | None => Map::new(),
        Some(other) => {
            debug!(arguments = %other, "tool arguments are not an object, using empty map");
            Map::new()
        }
    }
}

/// The model's next step: tool calls to run, or a final answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssistantReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl AssistantReply {
    pub fn answer(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn calls(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls,
        }
    }
}

#[derive(Deserialize)]
struct WireChatResponse {
    message: WireAssistantMessage,
}

#[derive(Deserialize)]
struct WireAssistantMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<Value>>,
}

/// Parse a `/api/chat` response body into an [`AssistantReply`].
pub fn parse_chat_response(body: Value) -> Result<AssistantReply> {
    let wire: WireChatResponse = serde_json::from_value(body)
        .map_err(|e| anyhow!("Invalid chat response: {}", e))?;

    Ok(AssistantReply {
        content: wire.message.content,
        tool_calls: wire
            .message
            .tool_calls
            .unwrap_or_default()
            .iter()
            .map(ToolCallRequest::from_wire)
            .collect(),
    })
}

/// A language model that can take the next conversation step.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Identifier recorded with each analysis.
    fn model_name(&self) -> &str;

    /// Send the full history and tool catalog, returning the next reply.
    async fn chat(&self, messages: &[Message], tools: &[ToolDefinition])
        -> Result<AssistantReply>;
}

pub struct OllamaChat {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<AssistantReply> {
        let mut payload = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
        });
        if !tools.is_empty() {
            let wire_tools: Vec<Value> = tools.iter().map(ToolDefinition::to_chat_tool).collect();
            payload["tools"] = Value::Array(wire_tools);
        }

        let response = self
            .client
            .post(format!("{}/api/chat", self.url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| anyhow!("Chat request to {} failed: {}", self.url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Chat API error {}: {}", status, body.trim());
        }

        parse_chat_response(response.json().await?)
    }
}

/// Placeholder model that always answers immediately.
pub struct StubChat;

impl StubChat {
    pub const REPLY: &'static str = "[STUB - model not connected]\n\
Set llm.stub_mode = false and start the model service to get real responses.\n\n\
**ANALYSIS:**\n\
This is a placeholder. The agent pipeline is working end-to-end.\n\n\
**CONFIDENCE:** 0%\n\n\
**SUGGESTED ACTIONS:**\n\
1. Start the model service and pull a model (e.g. llama3.2)\n\
2. Set llm.stub_mode = false in the agent configuration\n\
3. Re-trigger the analysis\n";
}

#[async_trait]
impl ChatModel for StubChat {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn chat(
        &self,
        _messages: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<AssistantReply> {
        Ok(AssistantReply::answer(Self::REPLY))
    }
}

pub fn create_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    if config.stub_mode {
        return Ok(Arc::new(StubChat));
    }
    Ok(Arc::new(OllamaChat::new(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arguments_as_map() {
        let call = ToolCallRequest::from_wire(&json!({
            "function": { "name": "get_telemetry", "arguments": { "vessel_id": "vessel_001" } }
        }));
        assert_eq!(call.name, "get_telemetry");
        assert_eq!(call.arguments["vessel_id"], "vessel_001");
    }

    #[test]
    fn test_arguments_as_json_text() {
        let call = ToolCallRequest::from_wire(&json!({
            "function": { "name": "get_events", "arguments": "{\"acknowledged\": false}" }
        }));
        assert_eq!(call.arguments["acknowledged"], false);
    }

    #[test]
    fn test_malformed_arguments_default_to_empty() {
        for raw in [json!("not json"), json!("[1, 2]"), json!(42), Value::Null] {
            let call = ToolCallRequest::from_wire(&json!({
                "function": { "name": "get_events", "arguments": raw }
            }));
            assert!(call.arguments.is_empty());
        }
    }

    #[test]
    fn test_message_wire_shape() {
        let call = ToolCallRequest {
            name: "get_events".to_string(),
            arguments: Map::new(),
        };
        let value = serde_json::to_value(Message::assistant("", vec![call])).unwrap();
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["tool_calls"][0]["function"]["name"], "get_events");
        assert!(value.get("name").is_none());

        let tool = serde_json::to_value(Message::tool("get_events", "{}")).unwrap();
        assert_eq!(tool["role"], "tool");
        assert_eq!(tool["name"], "get_events");
        assert!(tool.get("tool_calls").is_none());
    }

    #[test]
    fn test_parse_chat_response_final_answer() {
        let reply = parse_chat_response(json!({
            "message": { "role": "assistant", "content": "done" }
        }))
        .unwrap();
        assert_eq!(reply.content.as_deref(), Some("done"));
        assert!(reply.tool_calls.is_empty());
    }

    #[test]
    fn test_parse_chat_response_tool_calls() {
        let reply = parse_chat_response(json!({
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    { "function": { "name": "a", "arguments": {} } },
                    { "function": { "name": "b", "arguments": "{}" } }
                ]
            }
        }))
        .unwrap();
        let names: Vec<&str> = reply.tool_calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_parse_chat_response_requires_message() {
        assert!(parse_chat_response(json!({ "error": "model not found" })).is_err());
    }
}
