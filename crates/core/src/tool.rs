//! Tool domain types and the `ToolSession` backend contract.
//!
//! Tools are what give the model the ability to act in the world. Three kinds
//! of backend produce them: long-lived subprocess sessions (stdio RPC),
//! in-process virtual tools, and stored webhook definitions. All three expose
//! the same descriptor shape; the registry merges them into one catalog.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ToolError;

/// A tool descriptor as surfaced to the model.
///
/// Owned by whichever backend produced it; the registry only holds a merged
/// read-only view, rebuilt once per turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique name within the merged catalog.
    pub name: String,

    /// Description of what the tool does (sent to the model).
    pub description: String,

    /// JSON-Schema-like object describing the tool's parameters.
    #[serde(default)]
    pub input_schema: serde_json::Value,
}

/// A tool invocation parsed from model output.
///
/// Transient — exists only within one loop iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool to invoke.
    pub tool: String,

    /// Arguments as parsed from the model's JSON object.
    #[serde(default)]
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

impl ToolCall {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            arguments: serde_json::Map::new(),
        }
    }

    /// Canonical signature for repetition detection: tool name plus the
    /// arguments re-serialized with sorted keys.
    pub fn signature(&self) -> String {
        let mut keys: Vec<&String> = self.arguments.keys().collect();
        keys.sort();
        let mut canon = String::new();
        for key in keys {
            canon.push_str(key);
            canon.push('=');
            canon.push_str(&self.arguments[key].to_string());
            canon.push(';');
        }
        format!("{}::{canon}", self.tool)
    }

    pub fn arguments_value(&self) -> serde_json::Value {
        serde_json::Value::Object(self.arguments.clone())
    }
}

/// The result of a backend tool call.
///
/// Matches the collaborator contract: `{content: [{text: string}]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolOutput {
    #[serde(default)]
    pub content: Vec<TextBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![TextBlock { text: text.into() }],
        }
    }

    /// Concatenated text of all content blocks.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The backend contract every tool session satisfies.
///
/// Any subprocess speaking this contract over a bidirectional stdio channel
/// can be registered; implementations must tolerate concurrent `call_tool`
/// invocations (request/response correlation, not a shared cursor).
#[async_trait]
pub trait ToolSession: Send + Sync {
    /// A stable name for this session (used in routing and logs).
    fn name(&self) -> &str;

    /// List the tools this backend exposes.
    async fn list_tools(&self) -> std::result::Result<Vec<ToolDescriptor>, ToolError>;

    /// Invoke a tool by name.
    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolOutput, ToolError>;
}

/// A stored webhook tool definition (collaborator-owned config).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookToolDef {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// HTTP method, e.g. "GET" or "POST".
    #[serde(default = "default_method")]
    pub method: String,

    pub url: String,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default)]
    pub input_schema: serde_json::Value,

    /// When present, the webhook response is filtered down to these keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,

    /// `"report"` marks a tool whose output is auto-indexed and throttled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_type: Option<String>,
}

fn default_method() -> String {
    "POST".into()
}

impl WebhookToolDef {
    pub fn is_report(&self) -> bool {
        self.tool_type.as_deref() == Some("report")
    }

    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call_with(args: serde_json::Value) -> ToolCall {
        ToolCall {
            tool: "search_messages".into(),
            arguments: args.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn signature_is_key_order_independent() {
        let a = call_with(json!({"query": "invoices", "limit": 5}));
        let b = call_with(json!({"limit": 5, "query": "invoices"}));
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn signature_distinguishes_arguments() {
        let a = call_with(json!({"query": "invoices"}));
        let b = call_with(json!({"query": "receipts"}));
        assert_ne!(a.signature(), b.signature());
    }

    #[test]
    fn tool_output_joins_blocks() {
        let out = ToolOutput {
            content: vec![
                TextBlock { text: "one".into() },
                TextBlock { text: "two".into() },
            ],
        };
        assert_eq!(out.joined_text(), "one\ntwo");
    }

    #[test]
    fn webhook_def_report_detection() {
        let def: WebhookToolDef = serde_json::from_value(json!({
            "name": "usage_report",
            "url": "https://hooks.example.com/usage",
            "tool_type": "report"
        }))
        .unwrap();
        assert!(def.is_report());
        assert_eq!(def.method, "POST");
    }

    #[test]
    fn webhook_def_descriptor_carries_schema() {
        let def: WebhookToolDef = serde_json::from_value(json!({
            "name": "lookup",
            "description": "Look something up",
            "url": "https://hooks.example.com/lookup",
            "input_schema": {"type": "object", "properties": {"q": {"type": "string"}}}
        }))
        .unwrap();
        let desc = def.descriptor();
        assert_eq!(desc.name, "lookup");
        assert_eq!(desc.input_schema["properties"]["q"]["type"], "string");
    }
}
