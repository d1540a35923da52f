//! Per-request repetition ledger.
//!
//! Invariant: no identical (tool, canonicalized arguments) signature executes
//! more than once within a single request. The ledger is created fresh per
//! request and never shared.

use std::collections::HashMap;

use toolflow_core::ToolCall;

#[derive(Debug, Default)]
pub struct RepetitionLedger {
    counts: HashMap<String, u32>,
}

impl RepetitionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an attempted call. Returns `true` if this exact signature has
    /// already been recorded in this request.
    pub fn record(&mut self, call: &ToolCall) -> bool {
        let count = self.counts.entry(call.signature()).or_insert(0);
        *count += 1;
        *count > 1
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(tool: &str, args: serde_json::Value) -> ToolCall {
        ToolCall {
            tool: tool.into(),
            arguments: args.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn first_occurrence_passes_second_blocks() {
        let mut ledger = RepetitionLedger::new();
        let c = call("list_x", json!({}));
        assert!(!ledger.record(&c));
        assert!(ledger.record(&c));
    }

    #[test]
    fn different_arguments_are_distinct() {
        let mut ledger = RepetitionLedger::new();
        assert!(!ledger.record(&call("search", json!({"q": "a"}))));
        assert!(!ledger.record(&call("search", json!({"q": "b"}))));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn key_order_does_not_defeat_the_guard() {
        let mut ledger = RepetitionLedger::new();
        assert!(!ledger.record(&call("search", json!({"a": 1, "b": 2}))));
        assert!(ledger.record(&call("search", json!({"b": 2, "a": 1}))));
    }
}
