//! Long-term memory log — best-effort record of tool executions and
//! completed exchanges, searchable by keyword.
//!
//! Recording must never fail a surrounding tool call; callers treat every
//! operation here as advisory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

/// An entry in the memory log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub session_id: String,
    pub content: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub score: f32,
}

#[derive(Default)]
pub struct MemoryLog {
    entries: RwLock<Vec<MemoryRecord>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, session_id: &str, content: impl Into<String>, tags: Vec<String>) {
        let mut entries = self.entries.write().await;
        entries.push(MemoryRecord {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            content: content.into(),
            tags,
            created_at: Utc::now(),
            score: 0.0,
        });
    }

    /// Record a tool execution summary. Swallows nothing today, but callers
    /// still treat it as best-effort.
    pub async fn record_tool_execution(&self, session_id: &str, tool: &str, summary: &str) {
        self.record(
            session_id,
            format!("Tool '{tool}' executed: {summary}"),
            vec!["tool-execution".into(), tool.to_string()],
        )
        .await;
    }

    /// Keyword search across all sessions, scored by occurrence density.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<MemoryRecord> {
        let entries = self.entries.read().await;
        let query_lower = query.to_lowercase();

        let mut results: Vec<MemoryRecord> = entries
            .iter()
            .filter(|e| e.content.to_lowercase().contains(&query_lower))
            .cloned()
            .map(|mut e| {
                let occurrences = e.content.to_lowercase().matches(&query_lower).count();
                e.score = occurrences as f32 / (e.content.len() as f32 / 100.0).max(1.0);
                e
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        results
    }

    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }
}
