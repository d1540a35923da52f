//! Catalog aggregation — the merged, per-turn view of every tool.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::warn;

use toolflow_core::{AgentProfile, AgentType, ToolDescriptor, ToolSession, WebhookToolDef};

use crate::virtual_tools::{embed_report_descriptor, virtual_descriptors};

/// Where a catalog entry is executed.
#[derive(Clone)]
pub enum Route {
    /// A subprocess tool session, by registered session name.
    Session(String),
    /// In-process, no I/O.
    Virtual,
    /// A stored webhook definition, executed as one HTTP request.
    Webhook(WebhookToolDef),
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Route::Session(name) => write!(f, "Session({name})"),
            Route::Virtual => write!(f, "Virtual"),
            Route::Webhook(def) => write!(f, "Webhook({})", def.name),
        }
    }
}

/// The merged read-only catalog for one turn.
#[derive(Debug, Default)]
pub struct Catalog {
    descriptors: Vec<ToolDescriptor>,
    routes: HashMap<String, Route>,
    allowed: Option<HashSet<String>>,
}

impl Catalog {
    /// All descriptors, in aggregation order (sessions, virtual, webhooks).
    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.descriptors
    }

    pub fn route(&self, tool: &str) -> Option<&Route> {
        self.routes.get(tool)
    }

    /// Allow-list check. `None` allowed set means the agent declared "all".
    /// Always-allowed virtual tools are handled by the dispatcher before this.
    pub fn is_allowed(&self, tool: &str) -> bool {
        match &self.allowed {
            None => true,
            Some(set) => set.contains(tool),
        }
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Unique names, last writer wins.
    fn insert(&mut self, descriptor: ToolDescriptor, route: Route) {
        if self.routes.contains_key(&descriptor.name) {
            self.descriptors.retain(|d| d.name != descriptor.name);
        }
        self.routes.insert(descriptor.name.clone(), route);
        self.descriptors.push(descriptor);
    }
}

/// Build the merged catalog for one turn.
///
/// Aggregation order: subprocess sessions, then the always-on virtual tools,
/// then stored webhook/custom tools. A custom tool can therefore shadow a
/// same-named infra tool — documented as-is, not changed. A session that
/// fails `list_tools` is skipped and logged; aggregation continues.
pub async fn aggregate(
    sessions: &HashMap<String, Arc<dyn ToolSession>>,
    agent: &AgentProfile,
    custom_tools: &[WebhookToolDef],
) -> Catalog {
    let mut catalog = Catalog::default();

    for (name, session) in sessions {
        match session.list_tools().await {
            Ok(descriptors) => {
                for descriptor in descriptors {
                    catalog.insert(descriptor, Route::Session(name.clone()));
                }
            }
            Err(e) => {
                warn!(session = %name, error = %e, "session failed to list tools; skipping");
            }
        }
    }

    for descriptor in virtual_descriptors() {
        catalog.insert(descriptor, Route::Virtual);
    }
    if agent.agent_type == AgentType::Analysis {
        catalog.insert(embed_report_descriptor(), Route::Virtual);
    }

    for def in custom_tools {
        catalog.insert(def.descriptor(), Route::Webhook(def.clone()));
    }

    catalog.allowed = if agent.allowed_tools.allows_all() {
        None
    } else {
        let mut set: HashSet<String> = match &agent.allowed_tools {
            toolflow_core::AllowList::Named(names) => names.iter().cloned().collect(),
        };
        // Infrastructure tools are never opt-in.
        set.insert("collect_data".into());
        if agent.agent_type == AgentType::Analysis {
            set.insert("embed_report_for_exploration".into());
            set.insert("search_embedded_report".into());
        }
        Some(set)
    };

    catalog
}
