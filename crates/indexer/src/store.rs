//! Per-session embedded chunk store with cosine-ranked search.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// One embedded group of report rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedChunk {
    pub session_id: String,
    pub chunk_text: String,
    pub chunk_index: usize,
    pub report_type: String,
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 for mismatched lengths, empty, or zero-norm vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

#[derive(Default)]
pub struct ChunkStore {
    namespaces: RwLock<HashMap<String, Vec<EmbeddedChunk>>>,
}

impl ChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the session's chunks for one report type; other report types
    /// in the same session are kept.
    pub async fn replace(&self, session_id: &str, report_type: &str, chunks: Vec<EmbeddedChunk>) {
        let mut namespaces = self.namespaces.write().await;
        let entry = namespaces.entry(session_id.to_string()).or_default();
        entry.retain(|c| c.report_type != report_type);
        entry.extend(chunks);
    }

    pub async fn search(
        &self,
        session_id: &str,
        query_embedding: &[f32],
        limit: usize,
    ) -> Vec<EmbeddedChunk> {
        let namespaces = self.namespaces.read().await;
        let Some(chunks) = namespaces.get(session_id) else {
            return Vec::new();
        };

        let mut scored: Vec<(f32, &EmbeddedChunk)> = chunks
            .iter()
            .map(|c| (cosine_similarity(&c.embedding, query_embedding), c))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(limit)
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub async fn clear_session(&self, session_id: &str) {
        self.namespaces.write().await.remove(session_id);
    }

    pub async fn count(&self, session_id: &str) -> usize {
        self.namespaces
            .read()
            .await
            .get(session_id)
            .map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(session: &str, report: &str, index: usize, embedding: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            session_id: session.into(),
            chunk_text: format!("chunk {index}"),
            chunk_index: index,
            report_type: report.into(),
            embedding,
        }
    }

    #[test]
    fn cosine_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[tokio::test]
    async fn search_ranks_by_similarity() {
        let store = ChunkStore::new();
        store
            .replace(
                "s1",
                "usage",
                vec![
                    chunk("s1", "usage", 0, vec![0.0, 1.0]),
                    chunk("s1", "usage", 1, vec![1.0, 0.0]),
                    chunk("s1", "usage", 2, vec![0.7, 0.7]),
                ],
            )
            .await;

        let results = store.search("s1", &[1.0, 0.0], 2).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk_index, 1);
        assert_eq!(results[1].chunk_index, 2);
    }

    #[tokio::test]
    async fn replace_keeps_other_report_types() {
        let store = ChunkStore::new();
        store
            .replace("s1", "usage", vec![chunk("s1", "usage", 0, vec![1.0])])
            .await;
        store
            .replace("s1", "billing", vec![chunk("s1", "billing", 0, vec![1.0])])
            .await;
        assert_eq!(store.count("s1").await, 2);

        // Re-embedding "usage" replaces only its own chunks.
        store
            .replace(
                "s1",
                "usage",
                vec![
                    chunk("s1", "usage", 0, vec![1.0]),
                    chunk("s1", "usage", 1, vec![1.0]),
                ],
            )
            .await;
        assert_eq!(store.count("s1").await, 3);
    }
}
