//! Prompt construction for the loop controller.
//!
//! The system prompt is rebuilt every turn from the merged catalog and the
//! session's current state; sticky context reaches the model here, never by
//! silently merging values into tool arguments.

use chrono::Utc;

use toolflow_core::Message;
use toolflow_registry::Catalog;
use toolflow_session::SessionSnapshot;

/// Build the system prompt for one turn.
///
/// The report reminder is freshness-gated: stale report metadata is ignored
/// for injection, not deleted.
pub fn system_prompt(
    catalog: &Catalog,
    snapshot: &SessionSnapshot,
    rag_freshness_secs: i64,
) -> String {
    let mut prompt = String::with_capacity(4096);

    prompt.push_str(
        "You are a tool-using assistant. To call a tool, reply with exactly one \
         JSON object {\"tool\": \"<name>\", \"arguments\": {...}} and nothing else. \
         To answer the user directly, reply with plain text and no JSON object.\n\n",
    );
    prompt.push_str(&format!("Current time: {}\n\n", Utc::now().to_rfc3339()));

    prompt.push_str("Available tools:\n");
    for descriptor in catalog.descriptors() {
        prompt.push_str(&format!(
            "- {}: {} (parameters: {})\n",
            descriptor.name, descriptor.description, descriptor.input_schema
        ));
    }

    if !snapshot.fields.is_empty() {
        prompt.push_str("\nKnown session context (reuse these values when relevant):\n");
        let mut keys: Vec<&String> = snapshot.fields.keys().collect();
        keys.sort();
        for key in keys {
            prompt.push_str(&format!("- {}: {}\n", key, snapshot.fields[key]));
        }
    }

    if let Some(report) = &snapshot.last_report_context {
        let age = Utc::now()
            .signed_duration_since(report.timestamp)
            .num_seconds();
        if age >= 0 && age <= rag_freshness_secs {
            prompt.push_str(&format!(
                "\nActive report data: '{}' ({} rows) is embedded for this session. \
                 Use search_embedded_report to retrieve specifics instead of re-running \
                 the report.\n",
                report.report_type, report.row_count
            ));
        }
    }

    prompt
}

/// Cap the active prompt so `system_len + prompt` stays within `cap` chars.
///
/// Overflow is removed from the RIGHT of the active prompt (oldest context
/// sits at the front and carries the user request).
pub fn cap_prompt(system_len: usize, prompt: String, cap: usize) -> String {
    let budget = cap.saturating_sub(system_len);
    truncate_chars(&prompt, budget)
}

/// Cap a message set so `system_len` plus the message contents stay within
/// `cap` chars. Messages are kept left to right; the one that crosses the
/// budget is right-truncated and anything after it is dropped.
pub fn cap_messages(system_len: usize, messages: Vec<Message>, cap: usize) -> Vec<Message> {
    let mut budget = cap.saturating_sub(system_len);
    let mut capped = Vec::with_capacity(messages.len());
    for mut message in messages {
        let len = message.content.chars().count();
        if len <= budget {
            budget -= len;
            capped.push(message);
        } else {
            if budget > 0 {
                message.content = truncate_chars(&message.content, budget);
                capped.push(message);
            }
            break;
        }
    }
    capped
}

/// Char-boundary-safe right truncation.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.chars().take(max_chars).collect()
}
