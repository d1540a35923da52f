//! Two-stage parser for model replies.
//!
//! Grammar (the only contract the model must honor): exactly one JSON object
//! `{"tool": "<name>", "arguments": {...}}` with no surrounding prose, or
//! free text for a final answer. In practice models wrap the object in code
//! fences or trailing explanation, so parsing is two-stage:
//!
//! 1. strip code-fence markers, then attempt a strict JSON parse;
//! 2. on failure, extract the first balanced `{...}` object by scanning
//!    (string- and escape-aware), and parse that.
//!
//! An object containing a `tool` or `name` key is a tool call. Any other
//! valid JSON, or text without a `{` at all, is a final answer. Braces that
//! never parse are `Malformed` — the loop appends a corrective note and
//! retries rather than terminating.

use toolflow_core::ToolCall;

/// The outcome of parsing one model reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    /// A structured tool invocation.
    Call(ToolCall),

    /// A final natural-language (or non-tool JSON) answer.
    Final(String),

    /// Braces present but no parseable object — corrective retry.
    Malformed,
}

/// Parse one raw model completion.
pub fn parse_reply(raw: &str) -> ModelReply {
    let cleaned = strip_code_fences(raw);
    let trimmed = cleaned.trim();

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        return classify(value, trimmed);
    }

    if !trimmed.contains('{') {
        return ModelReply::Final(trimmed.to_string());
    }

    match extract_balanced_object(trimmed) {
        Some(value) => classify(value, trimmed),
        None => ModelReply::Malformed,
    }
}

fn classify(value: serde_json::Value, original: &str) -> ModelReply {
    let Some(object) = value.as_object() else {
        return ModelReply::Final(original.to_string());
    };

    let tool = object
        .get("tool")
        .or_else(|| object.get("name"))
        .and_then(|v| v.as_str());
    let Some(tool) = tool else {
        // Valid JSON without a tool key is an answer, not an error.
        return ModelReply::Final(original.to_string());
    };

    let arguments = object
        .get("arguments")
        .or_else(|| object.get("args"))
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_default();

    ModelReply::Call(ToolCall {
        tool: tool.to_string(),
        arguments,
    })
}

/// Remove markdown code-fence lines, keeping the fenced content.
fn strip_code_fences(raw: &str) -> String {
    if !raw.contains("```") {
        return raw.to_string();
    }
    raw.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extract the first balanced `{...}` object and parse it.
///
/// Tracks string and escape state so braces inside string literals don't
/// confuse the depth count. Tolerates trailing prose after the object.
fn extract_balanced_object(text: &str) -> Option<serde_json::Value> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &text[start..=start + offset];
                    return serde_json::from_str(candidate).ok();
                }
            }
            _ => {}
        }
    }

    None
}
