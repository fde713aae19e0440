//! Tool gateway client and argument validation.
//!
//! The gateway is an HTTP service that publishes a tool catalog at
//! `GET {url}/tools` and executes tools at `POST {url}/tools/call`.
//!
//! Neither operation surfaces an error to the caller. An unreachable catalog
//! yields an empty tool list; a failed call yields `{"error": "..."}` as the
//! result text, which the model sees as ordinary tool output.
//!
//! # Argument validation
//!
//! [`validate_arguments`] checks model-supplied arguments against a tool's
//! `inputSchema` before anything is sent to the gateway:
//!
//! - required properties are present
//! - declared `type` matches (a single name, or an array such as
//!   `["string", "null"]`)
//! - `enum` membership
//! - numeric `minimum` / `maximum`
//! - absent optional properties with a `default` are filled in

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ToolsConfig;

/// One entry of the gateway's tool catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema", default = "empty_object_schema")]
    pub input_schema: Value,
}

fn empty_object_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

impl ToolDefinition {
    /// The shape chat models expect in their `tools` list.
    pub fn to_chat_tool(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.input_schema,
            }
        })
    }
}

/// Discovers and executes tools on behalf of the orchestrator.
#[async_trait]
pub trait ToolGateway: Send + Sync {
    /// The current catalog. Empty when the gateway cannot be reached.
    async fn list_tools(&self) -> Vec<ToolDefinition>;

    /// Execute one tool, returning its JSON result as text. Failures are
    /// returned as `{"error": "..."}` text.
    async fn call_tool(&self, name: &str, arguments: &Map<String, Value>) -> String;
}

pub struct HttpToolGateway {
    client: reqwest::Client,
    url: String,
    list_timeout: Duration,
    call_timeout: Duration,
}

impl HttpToolGateway {
    pub fn new(config: &ToolsConfig) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            url: config.url.trim_end_matches('/').to_string(),
            list_timeout: Duration::from_secs(config.list_timeout_secs),
            call_timeout: Duration::from_secs(config.call_timeout_secs),
        })
    }

    async fn fetch_catalog(&self) -> Result<Vec<ToolDefinition>> {
        let response = self
            .client
            .get(format!("{}/tools", self.url))
            .timeout(self.list_timeout)
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response.json().await?;
        let entries = match body.get("tools").and_then(|t| t.as_array()) {
            Some(entries) => entries,
            None => bail!("catalog response has no 'tools' array"),
        };

        let mut tools = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_value::<ToolDefinition>(entry.clone()) {
                Ok(tool) => tools.push(tool),
                Err(e) => warn!(error = %e, "skipping malformed tool definition"),
            }
        }
        Ok(tools)
    }

    async fn execute(&self, name: &str, arguments: &Map<String, Value>) -> Result<Value> {
        let response = self
            .client
            .post(format!("{}/tools/call", self.url))
            .timeout(self.call_timeout)
            .json(&json!({ "name": name, "arguments": arguments }))
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }
}

#[async_trait]
impl ToolGateway for HttpToolGateway {
    async fn list_tools(&self) -> Vec<ToolDefinition> {
        match self.fetch_catalog().await {
            Ok(tools) => {
                debug!(count = tools.len(), "fetched tool catalog");
                tools
            }
            Err(e) => {
                warn!(url = %self.url, error = %e, "could not fetch tool catalog, continuing without tools");
                Vec::new()
            }
        }
    }

    async fn call_tool(&self, name: &str, arguments: &Map<String, Value>) -> String {
        match self.execute(name, arguments).await {
            Ok(result) => result.to_string(),
            Err(e) => {
                warn!(tool = name, error = %e, "tool call failed");
                error_result(&e.to_string())
            }
        }
    }
}

/// Tool result text reporting a failure to the model.
pub fn error_result(message: &str) -> String {
    json!({ "error": message }).to_string()
}

/// Validate arguments against a tool's input schema.
///
/// Returns the arguments with defaults filled in, or an error describing the
/// first violation.
pub fn validate_arguments(schema: &Value, arguments: &Map<String, Value>) -> Result<Map<String, Value>> {
    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .cloned()
        .unwrap_or_default();

    let required: Vec<&str> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    for field in &required {
        if !arguments.contains_key(*field) {
            bail!("missing required parameter: {}", field);
        }
    }

    let mut result = arguments.clone();

    for (prop_name, prop_schema) in &properties {
        let Some(value) = arguments.get(prop_name) else {
            if let Some(default) = prop_schema.get("default") {
                result.insert(prop_name.clone(), default.clone());
            }
            continue;
        };

        let allowed_types = declared_types(prop_schema);
        if !allowed_types.is_empty() && !allowed_types.iter().any(|t| type_matches(t, value)) {
            bail!(
                "parameter '{}' must be of type '{}', got {}",
                prop_name,
                allowed_types.join("' or '"),
                json_type_name(value)
            );
        }

        if let Some(enum_values) = prop_schema.get("enum").and_then(|e| e.as_array()) {
            if !enum_values.contains(value) {
                let allowed: Vec<String> = enum_values.iter().map(|v| v.to_string()).collect();
                bail!(
                    "parameter '{}' must be one of [{}], got {}",
                    prop_name,
                    allowed.join(", "),
                    value
                );
            }
        }

        if let Some(number) = value.as_f64() {
            if let Some(min) = prop_schema.get("minimum").and_then(|m| m.as_f64()) {
                if number < min {
                    bail!("parameter '{}' must be >= {}, got {}", prop_name, min, value);
                }
            }
            if let Some(max) = prop_schema.get("maximum").and_then(|m| m.as_f64()) {
                if number > max {
                    bail!("parameter '{}' must be <= {}, got {}", prop_name, max, value);
                }
            }
        }
    }

    Ok(result)
}

fn declared_types(prop_schema: &Value) -> Vec<&str> {
    match prop_schema.get("type") {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(types)) => types.iter().filter_map(|t| t.as_str()).collect(),
        _ => Vec::new(),
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn telemetry_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "vessel_id": { "type": "string" },
                "sensor_name": { "type": "string" },
                "minutes_back": { "type": "integer", "default": 60, "minimum": 1, "maximum": 1440 }
            },
            "required": ["vessel_id", "sensor_name"]
        })
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_defaults_filled_in() {
        let out = validate_arguments(
            &telemetry_schema(),
            &args(json!({ "vessel_id": "vessel_001", "sensor_name": "engine_temp" })),
        )
        .unwrap();
        assert_eq!(out["minutes_back"], 60);
    }

    #[test]
    fn test_missing_required() {
        let err = validate_arguments(&telemetry_schema(), &args(json!({ "vessel_id": "v" })))
            .unwrap_err();
        assert!(err.to_string().contains("sensor_name"));
    }

    #[test]
    fn test_wrong_type() {
        let err = validate_arguments(
            &telemetry_schema(),
            &args(json!({ "vessel_id": 7, "sensor_name": "engine_temp" })),
        )
        .unwrap_err();
        assert!(err.to_string().contains("must be of type 'string'"));
    }

    #[test]
    fn test_range_enforced() {
        let err = validate_arguments(
            &telemetry_schema(),
            &args(json!({ "vessel_id": "v", "sensor_name": "s", "minutes_back": 5000 })),
        )
        .unwrap_err();
        assert!(err.to_string().contains("<= 1440"));

        let err = validate_arguments(
            &telemetry_schema(),
            &args(json!({ "vessel_id": "v", "sensor_name": "s", "minutes_back": 0 })),
        )
        .unwrap_err();
        assert!(err.to_string().contains(">= 1"));
    }

    #[test]
    fn test_nullable_type_array() {
        let schema = json!({
            "type": "object",
            "properties": {
                "vessel_id": { "type": ["string", "null"] },
                "acknowledged": { "type": ["boolean", "null"] }
            }
        });
        assert!(validate_arguments(&schema, &args(json!({ "vessel_id": null }))).is_ok());
        assert!(validate_arguments(&schema, &args(json!({ "acknowledged": false }))).is_ok());
        assert!(validate_arguments(&schema, &args(json!({ "acknowledged": "no" }))).is_err());
        assert!(validate_arguments(&schema, &Map::new()).is_ok());
    }

    #[test]
    fn test_enum_enforced() {
        let schema = json!({
            "properties": { "severity": { "type": "string", "enum": ["low", "high"] } }
        });
        assert!(validate_arguments(&schema, &args(json!({ "severity": "high" }))).is_ok());
        assert!(validate_arguments(&schema, &args(json!({ "severity": "medium" }))).is_err());
    }

    #[test]
    fn test_chat_tool_shape() {
        let tool = ToolDefinition {
            name: "get_events".to_string(),
            description: "Fetch recent anomaly events.".to_string(),
            input_schema: json!({ "type": "object", "properties": {} }),
        };
        let wire = tool.to_chat_tool();
        assert_eq!(wire["type"], "function");
        assert_eq!(wire["function"]["name"], "get_events");
        assert_eq!(wire["function"]["parameters"]["type"], "object");
    }

    #[test]
    fn test_catalog_entry_deserializes() {
        let tool: ToolDefinition = serde_json::from_value(json!({
            "name": "get_analysis",
            "description": "Fetch stored analyses.",
            "inputSchema": { "type": "object", "properties": { "event_id": { "type": "integer" } } },
            "outputSchema": { "type": "object" }
        }))
        .unwrap();
        assert_eq!(tool.name, "get_analysis");
        assert_eq!(tool.input_schema["properties"]["event_id"]["type"], "integer");
    }

    #[test]
    fn test_error_result_is_json() {
        let text = error_result("connection refused");
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["error"], "connection refused");
    }
}
