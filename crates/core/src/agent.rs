//! Agent profiles — which tools a given agent may call.
//!
//! Agents are declarative: a name, a type, and a tool allow-list. The
//! registry and dispatcher enforce the allow-list; infrastructure tools are
//! force-included regardless (they must never be opt-in).

use serde::{Deserialize, Serialize};

/// The allow-list of tools an agent may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AllowList {
    /// Explicit tool names.
    Named(Vec<String>),
}

impl AllowList {
    /// `["all"]` means every tool is allowed.
    pub fn allows_all(&self) -> bool {
        match self {
            AllowList::Named(names) => names.iter().any(|n| n == "all"),
        }
    }

    pub fn contains(&self, tool: &str) -> bool {
        match self {
            AllowList::Named(names) => self.allows_all() || names.iter().any(|n| n == tool),
        }
    }

    pub fn all() -> Self {
        AllowList::Named(vec!["all".into()])
    }
}

impl Default for AllowList {
    fn default() -> Self {
        Self::all()
    }
}

/// Agent category; "analysis" agents get the RAG tools force-included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    #[default]
    General,
    Analysis,
}

/// A declared agent: identity plus tool policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, rename = "type")]
    pub agent_type: AgentType,

    #[serde(default)]
    pub allowed_tools: AllowList,
}

impl AgentProfile {
    /// The default agent: every tool allowed.
    pub fn unrestricted(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            agent_type: AgentType::General,
            allowed_tools: AllowList::all(),
        }
    }
}

impl Default for AgentProfile {
    fn default() -> Self {
        Self::unrestricted("default")
    }
}
