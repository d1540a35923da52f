//! Engine-level streaming events.
//!
//! `EngineEvent` is the observability overlay over the loop: every side
//! effect is emitted as one of these before the loop continues. The gateway
//! forwards them to clients over SSE as `data: {"type": ...}` lines.

use serde::{Deserialize, Serialize};

/// Events emitted by the engine while a request runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Coarse progress marker ("thinking", "executing tools", ...).
    Status { message: String },

    /// The model's raw reply for a turn, before parsing.
    Thinking { content: String },

    /// A tool call is about to be dispatched.
    ToolExecution {
        tool: String,
        arguments: serde_json::Value,
    },

    /// A dispatch completed (successfully or with a corrective note).
    ToolResult {
        tool: String,
        summary: String,
        success: bool,
    },

    /// The final answer for the request.
    Response {
        content: String,
        intent: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_name: Option<String>,
    },

    /// An error occurred mid-request.
    Error { message: String },

    /// The request is complete — final metadata.
    Done {
        session_id: String,
        turns: usize,
        tools_used: Vec<String>,
    },
}

impl EngineEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Thinking { .. } => "thinking",
            Self::ToolExecution { .. } => "tool_execution",
            Self::ToolResult { .. } => "tool_result",
            Self::Response { .. } => "response",
            Self::Error { .. } => "error",
            Self::Done { .. } => "done",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_status() {
        let event = EngineEvent::Status {
            message: "thinking".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"status""#));
        assert!(json.contains(r#""message":"thinking""#));
    }

    #[test]
    fn event_serialization_tool_execution() {
        let event = EngineEvent::ToolExecution {
            tool: "search_messages".into(),
            arguments: serde_json::json!({"query": "invoices"}),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"tool_execution""#));
        assert!(json.contains(r#""tool":"search_messages""#));
    }

    #[test]
    fn event_serialization_response_skips_empty_fields() {
        let event = EngineEvent::Response {
            content: "done".into(),
            intent: "conversation".into(),
            data: None,
            tool_name: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"response""#));
        assert!(!json.contains("tool_name"));
        assert!(!json.contains("data"));
    }

    #[test]
    fn event_serialization_done() {
        let event = EngineEvent::Done {
            session_id: "s1".into(),
            turns: 3,
            tools_used: vec!["collect_data".into()],
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"done""#));
        assert!(json.contains(r#""turns":3"#));
    }

    #[test]
    fn event_type_matches_serialized_tag() {
        let event = EngineEvent::Error {
            message: "boom".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(&format!(r#""type":"{}""#, event.event_type())));
    }
}
