//! Session state store — sticky identifiers and report context per session.
//!
//! State is created lazily on first reference to a session id and lives for
//! the process lifetime. Sticky capture never injects prior values into new
//! calls; context is surfaced to the model via the prompt instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Keys that survive a `transient` clear.
const PERSISTENT_KEYS: &[&str] = &["facility_id", "location"];

/// Metadata about the most recent report embedded for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportContext {
    pub report_type: String,
    pub row_count: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
struct SessionState {
    fields: HashMap<String, serde_json::Value>,
    last_report_context: Option<ReportContext>,
}

/// A read-only copy of one session's state, for prompt injection.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSnapshot {
    pub fields: HashMap<String, serde_json::Value>,
    pub last_report_context: Option<ReportContext>,
}

/// Which keys a `clear_session_context` call removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearScope {
    /// Every key, plus the session's embedding namespace.
    All,
    /// Everything except persistent keys; embeddings are wiped too.
    Transient,
    /// Only ID-shaped keys (`_id`/`Id` suffix).
    IdsOnly,
}

impl ClearScope {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "all" => Some(Self::All),
            "transient" => Some(Self::Transient),
            "ids_only" => Some(Self::IdsOnly),
            _ => None,
        }
    }

    /// Whether this scope also wipes the session's embedded chunks.
    pub fn wipes_embeddings(&self) -> bool {
        matches!(self, Self::All | Self::Transient)
    }
}

/// ID-shaped key: `_id`/`Id` suffix, or exactly `id`/`uuid`.
fn is_id_key(key: &str) -> bool {
    key.ends_with("_id") || key.ends_with("Id") || key == "id" || key == "uuid"
}

fn is_scalar(value: &serde_json::Value) -> bool {
    value.is_string() || value.is_number() || value.is_boolean()
}

/// The process-lifetime store of per-session state.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionState>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of the session's current fields (empty if never touched).
    pub async fn snapshot(&self, session_id: &str) -> SessionSnapshot {
        let sessions = self.sessions.read().await;
        match sessions.get(session_id) {
            Some(state) => SessionSnapshot {
                fields: state.fields.clone(),
                last_report_context: state.last_report_context.clone(),
            },
            None => SessionSnapshot::default(),
        }
    }

    /// Record newly-seen scalar arguments for future prompt injection.
    ///
    /// Prior values are NOT merged into the call — the arguments pass through
    /// unchanged.
    pub async fn apply_sticky(
        &self,
        session_id: &str,
        tool_name: &str,
        arguments: &serde_json::Map<String, serde_json::Value>,
    ) {
        let mut sessions = self.sessions.write().await;
        let state = sessions.entry(session_id.to_string()).or_default();
        for (key, value) in arguments {
            if is_scalar(value) {
                state.fields.insert(key.clone(), value.clone());
            }
        }
        debug!(session = session_id, tool = tool_name, "sticky args recorded");
    }

    /// Harvest ID-shaped fields from a tool's raw JSON output.
    ///
    /// Recurses through nested objects; only the FIRST element of any array
    /// is inspected, to avoid ambiguity when a list of results is returned.
    /// Malformed JSON is swallowed — extraction is best-effort and must never
    /// fail the surrounding tool call. Idempotent: re-running on the same
    /// output writes the same values.
    pub async fn extract_ids(&self, session_id: &str, tool_name: &str, raw_output: &str) {
        let Ok(parsed) = serde_json::from_str::<serde_json::Value>(raw_output) else {
            return;
        };
        let mut harvested: HashMap<String, serde_json::Value> = HashMap::new();
        collect_ids(&parsed, &mut harvested);
        if harvested.is_empty() {
            return;
        }
        let count = harvested.len();
        let mut sessions = self.sessions.write().await;
        let state = sessions.entry(session_id.to_string()).or_default();
        for (key, value) in harvested {
            state.fields.insert(key, value);
        }
        debug!(
            session = session_id,
            tool = tool_name,
            count, "harvested ids from tool output"
        );
    }

    /// Remove keys per the scope; returns the exact list of removed keys.
    pub async fn clear(&self, session_id: &str, scope: ClearScope) -> Vec<String> {
        let mut sessions = self.sessions.write().await;
        let Some(state) = sessions.get_mut(session_id) else {
            return Vec::new();
        };
        let removed: Vec<String> = state
            .fields
            .keys()
            .filter(|key| match scope {
                ClearScope::All => true,
                ClearScope::Transient => !PERSISTENT_KEYS.contains(&key.as_str()),
                ClearScope::IdsOnly => key.ends_with("_id") || key.ends_with("Id"),
            })
            .cloned()
            .collect();
        for key in &removed {
            state.fields.remove(key);
        }
        if scope.wipes_embeddings() {
            state.last_report_context = None;
        }
        removed
    }

    pub async fn set_report_context(&self, session_id: &str, context: ReportContext) {
        let mut sessions = self.sessions.write().await;
        let state = sessions.entry(session_id.to_string()).or_default();
        state.last_report_context = Some(context);
    }

    pub async fn report_context(&self, session_id: &str) -> Option<ReportContext> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .and_then(|s| s.last_report_context.clone())
    }
}

fn collect_ids(value: &serde_json::Value, out: &mut HashMap<String, serde_json::Value>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map {
                match val {
                    v if is_scalar(v) => {
                        if is_id_key(key) {
                            out.insert(key.clone(), v.clone());
                        }
                    }
                    serde_json::Value::Object(_) => collect_ids(val, out),
                    serde_json::Value::Array(items) => {
                        // First element only, by design.
                        if let Some(first) = items.first() {
                            collect_ids(first, out);
                        }
                    }
                    _ => {}
                }
            }
        }
        serde_json::Value::Array(items) => {
            if let Some(first) = items.first() {
                collect_ids(first, out);
            }
        }
        _ => {}
    }
}
