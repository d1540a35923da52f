//! Bounded rolling transcript per (session, agent) pair.
//!
//! One `Exchange` is written per completed request and read back to seed the
//! next request's first turn. Capacity is fixed; the oldest exchange is
//! evicted when full.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

/// One completed request: what the user asked, what the assistant answered,
/// and which tools ran along the way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exchange {
    pub user: String,
    pub assistant: String,
    pub tools_used: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Default)]
pub struct TranscriptStore {
    capacity: usize,
    transcripts: RwLock<HashMap<(String, String), VecDeque<Exchange>>>,
}

impl TranscriptStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            transcripts: RwLock::new(HashMap::new()),
        }
    }

    pub async fn append(
        &self,
        session_id: &str,
        agent_id: &str,
        user: impl Into<String>,
        assistant: impl Into<String>,
        tools_used: Vec<String>,
    ) {
        let mut transcripts = self.transcripts.write().await;
        let deque = transcripts
            .entry((session_id.to_string(), agent_id.to_string()))
            .or_default();
        if deque.len() >= self.capacity {
            deque.pop_front();
        }
        deque.push_back(Exchange {
            user: user.into(),
            assistant: assistant.into(),
            tools_used,
            timestamp: Utc::now(),
        });
    }

    /// Oldest-to-newest history for the pair; empty if never written.
    pub async fn history(&self, session_id: &str, agent_id: &str) -> Vec<Exchange> {
        let transcripts = self.transcripts.read().await;
        transcripts
            .get(&(session_id.to_string(), agent_id.to_string()))
            .map(|d| d.iter().cloned().collect())
            .unwrap_or_default()
    }
}
