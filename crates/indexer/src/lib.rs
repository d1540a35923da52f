//! Report Indexer — RAG over oversized tool outputs.
//!
//! When a report-typed webhook tool returns more data than fits the model's
//! context, the rows are chunked and embedded per session. The model gets a
//! compact summary in context and retrieves specifics later through
//! `search_embedded_report`. `decide_search_or_analyze` is a pure heuristic
//! that advises which path to take; it never touches the embeddings.

pub mod decide;
pub mod embedder;
pub mod store;
pub mod summary;

pub use decide::{Decision, Mode, decide_search_or_analyze};
pub use embedder::{Embedder, HttpEmbedder, LocalEmbedder, reconfigure};
pub use store::{ChunkStore, EmbeddedChunk};
pub use summary::summarize_report;

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// The indexer: an atomically-swappable embedding provider plus the
/// per-session chunk store.
pub struct ReportIndexer {
    embedder: RwLock<Arc<dyn Embedder>>,
    store: ChunkStore,
    chunk_size: usize,
}

impl ReportIndexer {
    pub fn new(embedder: Arc<dyn Embedder>, chunk_size: usize) -> Self {
        Self {
            embedder: RwLock::new(embedder),
            store: ChunkStore::new(),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Swap in a freshly-built provider. Providers are immutable; settings
    /// changes go through `embedder::reconfigure`, never in-place mutation.
    pub async fn swap_embedder(&self, embedder: Arc<dyn Embedder>) {
        *self.embedder.write().await = embedder;
    }

    /// Chunk `rows` into groups of `chunk_size` and embed each group under
    /// the session's namespace. Returns the number of chunks embedded.
    pub async fn embed_report(
        &self,
        session_id: &str,
        report_type: &str,
        rows: &[serde_json::Value],
        chunk_size: Option<usize>,
    ) -> Result<usize, toolflow_core::error::ToolError> {
        let chunk_size = chunk_size.unwrap_or(self.chunk_size).max(1);
        let texts: Vec<String> = rows
            .chunks(chunk_size)
            .map(|group| {
                group
                    .iter()
                    .map(|row| row.to_string())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .collect();
        if texts.is_empty() {
            return Ok(0);
        }

        let embedder = self.embedder.read().await.clone();
        let embeddings = embedder.embed(&texts).await.map_err(|e| {
            toolflow_core::error::ToolError::ExecutionFailed {
                tool_name: "embed_report_for_exploration".into(),
                reason: e.to_string(),
            }
        })?;

        let chunks: Vec<EmbeddedChunk> = texts
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(index, (chunk_text, embedding))| EmbeddedChunk {
                session_id: session_id.to_string(),
                chunk_text,
                chunk_index: index,
                report_type: report_type.to_string(),
                embedding,
            })
            .collect();

        let count = chunks.len();
        self.store.replace(session_id, report_type, chunks).await;
        info!(
            session = session_id,
            report_type, chunks = count, "report embedded"
        );
        Ok(count)
    }

    /// Cosine-ranked search over the session's embedded chunks.
    pub async fn search(
        &self,
        session_id: &str,
        query: &str,
        n: usize,
    ) -> Result<Vec<EmbeddedChunk>, toolflow_core::error::ToolError> {
        let embedder = self.embedder.read().await.clone();
        let query_embedding = embedder
            .embed(std::slice::from_ref(&query.to_string()))
            .await
            .map_err(|e| toolflow_core::error::ToolError::ExecutionFailed {
                tool_name: "search_embedded_report".into(),
                reason: e.to_string(),
            })?
            .into_iter()
            .next()
            .unwrap_or_default();
        Ok(self.store.search(session_id, &query_embedding, n).await)
    }

    /// Drop every chunk in the session's namespace.
    pub async fn clear_session(&self, session_id: &str) {
        self.store.clear_session(session_id).await;
    }

    pub async fn chunk_count(&self, session_id: &str) -> usize {
        self.store.count(session_id).await
    }
}
