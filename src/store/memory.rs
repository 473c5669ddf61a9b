//! In-memory [`VectorSearchProvider`] for tests and connectivity probes.
//!
//! Brute-force cosine similarity over chunks held behind a `RwLock`.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::RetrievalError;
use crate::models::{DocumentChunk, RetrievedChunk};

use super::VectorSearchProvider;

/// In-memory store. Chunks are loaded up front via [`insert`](Self::insert).
pub struct InMemoryStore {
    chunks: RwLock<Vec<DocumentChunk>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
        }
    }

    pub fn insert(&self, chunk: DocumentChunk) {
        self.chunks.write().unwrap().push(chunk);
    }

    pub fn len(&self) -> usize {
        self.chunks.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

#[async_trait]
impl VectorSearchProvider for InMemoryStore {
    async fn search(
        &self,
        embedding: &[f32],
        k: usize,
        collections: Option<&[String]>,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let chunks = self.chunks.read().unwrap();
        let mut results: Vec<RetrievedChunk> = chunks
            .iter()
            .filter(|c| match collections {
                Some(wanted) => wanted.iter().any(|w| *w == c.collection),
                None => true,
            })
            .map(|c| RetrievedChunk {
                chunk: c.clone(),
                score: cosine_sim(embedding, &c.embedding) as f64,
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(k);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, collection: &str, embedding: Vec<f32>) -> DocumentChunk {
        DocumentChunk {
            id: id.to_string(),
            text: format!("text of {id}"),
            source_work: "Hamlet".to_string(),
            speaker: None,
            collection: collection.to_string(),
            sequence: None,
            embedding,
        }
    }

    #[tokio::test]
    async fn returns_nearest_first() {
        let store = InMemoryStore::new();
        store.insert(chunk("a", "plays", vec![1.0, 0.0]));
        store.insert(chunk("b", "plays", vec![0.0, 1.0]));

        let results = store.search(&[1.0, 0.1], 2, None).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.id, "a");
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn collection_filter_applies() {
        let store = InMemoryStore::new();
        store.insert(chunk("a", "plays", vec![1.0, 0.0]));
        store.insert(chunk("b", "sonnets", vec![1.0, 0.0]));

        let wanted = vec!["sonnets".to_string()];
        let results = store.search(&[1.0, 0.0], 10, Some(&wanted)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, "b");
    }

    #[tokio::test]
    async fn fewer_than_k_returns_all() {
        let store = InMemoryStore::new();
        store.insert(chunk("a", "plays", vec![1.0, 0.0]));

        let results = store.search(&[1.0, 0.0], 5, None).await.unwrap();
        assert_eq!(results.len(), 1);
    }
}
