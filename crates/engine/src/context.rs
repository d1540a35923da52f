//! The process-lifetime orchestrator context.
//!
//! Constructed once at startup and injected into every request handler —
//! there are no global registries. Owns the provider, the long-lived
//! subprocess sessions, and all per-session state stores.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use toolflow_config::AppConfig;
use toolflow_core::{AgentProfile, Provider, ToolSession};
use toolflow_indexer::{ReportIndexer, reconfigure};
use toolflow_session::{MemoryLog, SessionStore, TranscriptStore};

pub struct OrchestratorContext {
    pub provider: Arc<dyn Provider>,

    /// Long-lived subprocess tool sessions, shared by all requests.
    pub sessions: HashMap<String, Arc<dyn ToolSession>>,

    pub config: AppConfig,
    pub state: SessionStore,
    pub transcripts: TranscriptStore,
    pub memory: MemoryLog,
    pub indexer: ReportIndexer,
    pub http: reqwest::Client,

    /// Raw rows of the most recent report per session, kept so
    /// `embed_report_for_exploration` can re-chunk without a new webhook call.
    report_rows: RwLock<HashMap<String, (String, Vec<serde_json::Value>)>>,
}

impl OrchestratorContext {
    pub fn new(
        provider: Arc<dyn Provider>,
        sessions: HashMap<String, Arc<dyn ToolSession>>,
        config: AppConfig,
    ) -> Self {
        let embedder = reconfigure(&config.embedding, config.api_key.as_deref());
        let indexer = ReportIndexer::new(embedder, config.engine.chunk_size);
        let transcripts = TranscriptStore::new(config.engine.transcript_capacity);
        Self {
            provider,
            sessions,
            config,
            state: SessionStore::new(),
            transcripts,
            memory: MemoryLog::new(),
            indexer,
            http: reqwest::Client::new(),
            report_rows: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve the active agent: a declared profile by id, or the
    /// unrestricted default.
    pub fn agent(&self, agent_id: Option<&str>) -> AgentProfile {
        let id = agent_id.unwrap_or("default");
        self.config
            .agents
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .unwrap_or_else(|| AgentProfile::unrestricted(id))
    }

    pub async fn remember_report_rows(
        &self,
        session_id: &str,
        report_type: &str,
        rows: Vec<serde_json::Value>,
    ) {
        self.report_rows
            .write()
            .await
            .insert(session_id.to_string(), (report_type.to_string(), rows));
    }

    pub async fn recall_report_rows(
        &self,
        session_id: &str,
    ) -> Option<(String, Vec<serde_json::Value>)> {
        self.report_rows.read().await.get(session_id).cloned()
    }

    pub async fn forget_report_rows(&self, session_id: &str) {
        self.report_rows.write().await.remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use toolflow_core::error::ProviderError;
    use toolflow_core::{AgentType, AllowList, ProviderRequest, ProviderResponse};

    struct NullProvider;

    #[async_trait]
    impl Provider for NullProvider {
        fn name(&self) -> &str {
            "null"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            Err(ProviderError::NotConfigured("null".into()))
        }
    }

    fn context_with_agents(agents: Vec<AgentProfile>) -> OrchestratorContext {
        let config = AppConfig {
            agents,
            ..Default::default()
        };
        OrchestratorContext::new(Arc::new(NullProvider), HashMap::new(), config)
    }

    #[test]
    fn unknown_agent_falls_back_to_unrestricted() {
        let ctx = context_with_agents(vec![]);
        let agent = ctx.agent(Some("nope"));
        assert!(agent.allowed_tools.allows_all());
    }

    #[test]
    fn declared_agent_is_resolved_by_id() {
        let ctx = context_with_agents(vec![AgentProfile {
            id: "analyst".into(),
            name: "Analyst".into(),
            agent_type: AgentType::Analysis,
            allowed_tools: AllowList::Named(vec!["collect_data".into()]),
        }]);
        let agent = ctx.agent(Some("analyst"));
        assert_eq!(agent.agent_type, AgentType::Analysis);
        assert!(!agent.allowed_tools.allows_all());
    }

    #[tokio::test]
    async fn report_rows_round_trip() {
        let ctx = context_with_agents(vec![]);
        ctx.remember_report_rows("s1", "usage", vec![serde_json::json!({"kwh": 10})])
            .await;
        let (report_type, rows) = ctx.recall_report_rows("s1").await.unwrap();
        assert_eq!(report_type, "usage");
        assert_eq!(rows.len(), 1);
        ctx.forget_report_rows("s1").await;
        assert!(ctx.recall_report_rows("s1").await.is_none());
    }
}
