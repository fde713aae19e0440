//! Conversation orchestrator.
//!
//! Drives one bounded tool-calling conversation with the chat model:
//!
//! ```text
//! seed [system, user]
//!   └─▶ model ──▶ no tool calls ──▶ final answer
//!         │
//!         └─▶ tool calls ──▶ append assistant turn
//!                           ──▶ run each tool in order, append result
//!                           ──▶ model (again)
//! ```
//!
//! At most `max_tool_calls + 1` model calls are made. If the model is still
//! asking for tools on the last one, the run ends with
//! [`EXHAUSTED_ANSWER`] instead of an error.
//!
//! Each tool call is checked before it reaches the gateway: the name must be
//! in this run's catalog and the arguments must satisfy its input schema.
//! Rejected calls are answered with an `{"error": ...}` tool message so the
//! model can react to them.

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

use crate::llm::{ChatModel, Message, ToolCallRequest};
use crate::models::Event;
use crate::tools::{error_result, validate_arguments, ToolDefinition, ToolGateway};

/// Final text when the model keeps requesting tools past the budget.
pub const EXHAUSTED_ANSWER: &str =
    "Analysis incomplete: maximum tool calls reached without a final answer.";

/// Final text when the model's answer has no content.
pub const EMPTY_ANSWER: &str = "No analysis generated.";

pub struct Orchestrator {
    model: Arc<dyn ChatModel>,
    gateway: Arc<dyn ToolGateway>,
    max_tool_calls: usize,
}

impl Orchestrator {
    pub fn new(
        model: Arc<dyn ChatModel>,
        gateway: Arc<dyn ToolGateway>,
        max_tool_calls: usize,
    ) -> Self {
        Self {
            model,
            gateway,
            max_tool_calls,
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Run the conversation for one event and return the final answer text.
    ///
    /// Errors only when a model call fails.
    pub async fn run(
        &self,
        event: &Event,
        context: &str,
        tools: &[ToolDefinition],
    ) -> Result<String> {
        let mut messages = vec![
            Message::system(system_prompt(context)),
            Message::user(user_message(event)),
        ];

        let max_rounds = self.max_tool_calls + 1;
        for round in 1..=max_rounds {
            let reply = self.model.chat(&messages, tools).await?;

            if reply.tool_calls.is_empty() {
                debug!(event_id = event.id, round, "model returned final answer");
                return Ok(match reply.content {
                    Some(content) if !content.trim().is_empty() => content,
                    _ => EMPTY_ANSWER.to_string(),
                });
            }

            if round == max_rounds {
                break;
            }

            info!(
                event_id = event.id,
                round,
                calls = reply.tool_calls.len(),
                "model requested tools"
            );

            messages.push(Message::assistant(
                reply.content.unwrap_or_default(),
                reply.tool_calls.clone(),
            ));

            for call in &reply.tool_calls {
                let result = self.execute(call, tools).await;
                messages.push(Message::tool(call.name.clone(), result));
            }
        }

        info!(
            event_id = event.id,
            max_tool_calls = self.max_tool_calls,
            "tool budget exhausted"
        );
        Ok(EXHAUSTED_ANSWER.to_string())
    }

    async fn execute(&self, call: &ToolCallRequest, tools: &[ToolDefinition]) -> String {
        let Some(tool) = tools.iter().find(|t| t.name == call.name) else {
            debug!(tool = %call.name, "model requested a tool outside the catalog");
            return error_result(&format!("Unknown tool: {}", call.name));
        };

        match validate_arguments(&tool.input_schema, &call.arguments) {
            Ok(arguments) => {
                debug!(tool = %call.name, "calling tool");
                self.gateway.call_tool(&call.name, &arguments).await
            }
            Err(e) => {
                debug!(tool = %call.name, error = %e, "rejected tool arguments");
                error_result(&format!("Invalid arguments for {}: {}", call.name, e))
            }
        }
    }
}

/// Instructions for the model, with retrieved documentation when present.
pub fn system_prompt(context: &str) -> String {
    let mut prompt = String::from(
        "You are a maritime telemetry analysis agent.\n\
         You have access to tools that query live vessel data. \
         Use them to gather additional context before forming your conclusion \
         (e.g. fetch recent sensor history or check for related events).\n",
    );

    if !context.is_empty() {
        prompt.push_str("\nRelevant documentation:\n");
        prompt.push_str(context);
        prompt.push('\n');
    }

    prompt.push_str(
        "\nAfter gathering enough information, respond in this exact format:\n\n\
         **ANALYSIS:**\n\
         [Explain why this event likely occurred and what it means for vessel operations]\n\n\
         **CONFIDENCE:** [0-100]%\n\n\
         **SUGGESTED ACTIONS:**\n\
         1. [First action]\n\
         2. [Second action]\n\
         3. [Third action]\n",
    );
    prompt
}

/// Event description that opens the conversation.
pub fn user_message(event: &Event) -> String {
    format!(
        "An anomaly has been detected on vessel {}:\n\
         \x20 - Event type : {}\n\
         \x20 - Sensor     : {}\n\
         \x20 - Severity   : {}\n\
         \x20 - Details    : {}\n\
         \x20 - Timestamp  : {}\n\n\
         Please analyse this event and provide your findings.",
        event.vessel_id,
        event.event_type,
        event.sensor_name,
        event.severity,
        event.details.as_deref().unwrap_or("none"),
        event.timestamp.to_rfc3339(),
    )
}
