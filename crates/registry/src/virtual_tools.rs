//! Virtual (always-on) tools — in-process, no backend I/O.
//!
//! These are appended to every catalog regardless of the active agent's
//! allow-list: infrastructure tools must never be opt-in.

use serde_json::json;
use toolflow_core::ToolDescriptor;

/// Tools that bypass the allow-list check entirely at dispatch time.
pub const ALWAYS_ALLOWED: &[&str] = &[
    "get_current_session_context",
    "clear_session_context",
    "query_past_conversations",
    "decide_search_or_analyze",
    "search_embedded_report",
];

/// Tools executed in-process by the dispatcher, never via network.
pub const INTERNAL_TOOLS: &[&str] = &[
    "get_current_session_context",
    "clear_session_context",
    "query_past_conversations",
    "decide_search_or_analyze",
    "embed_report_for_exploration",
    "search_embedded_report",
];

/// Descriptors of the always-on virtual tools.
pub fn virtual_descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: "get_current_session_context".into(),
            description: "Return the identifiers and context values remembered for this session."
                .into(),
            input_schema: json!({"type": "object", "properties": {}}),
        },
        ToolDescriptor {
            name: "clear_session_context".into(),
            description: "Forget remembered session context. Scope: 'all' wipes everything \
                          including embedded report data, 'transient' keeps facility/location, \
                          'ids_only' removes only identifier keys."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "scope": {"type": "string", "enum": ["all", "transient", "ids_only"]}
                }
            }),
        },
        ToolDescriptor {
            name: "query_past_conversations".into(),
            description: "Search earlier conversations and tool executions for relevant context."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "limit": {"type": "integer", "default": 5}
                },
                "required": ["query"]
            }),
        },
        ToolDescriptor {
            name: "decide_search_or_analyze".into(),
            description: "Advise whether a question about the last report needs semantic search \
                          over embedded chunks or can be answered from the in-context summary."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {"question": {"type": "string"}},
                "required": ["question"]
            }),
        },
        ToolDescriptor {
            name: "search_embedded_report".into(),
            description: "Semantic search over report rows embedded for this session.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "n": {"type": "integer", "default": 5}
                },
                "required": ["query"]
            }),
        },
    ]
}

/// Descriptor for `embed_report_for_exploration`, force-included for analysis
/// agents (it is internal but not always-on).
pub fn embed_report_descriptor() -> ToolDescriptor {
    ToolDescriptor {
        name: "embed_report_for_exploration".into(),
        description: "Chunk and embed the rows of a report so they can be searched semantically."
            .into(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "report_type": {"type": "string"},
                "chunk_size": {"type": "integer", "default": 50}
            }
        }),
    }
}
