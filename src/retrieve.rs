//! Retriever: deterministic ordering over raw vector-search results.
//!
//! Backends only promise "at most k chunks, higher score is better".
//! The [`Retriever`] re-sorts descending by score with ties broken by
//! ascending chunk id, so retrieval is reproducible across backends
//! and test runs.

use std::sync::Arc;

use crate::error::RetrievalError;
use crate::models::RetrievedChunk;
use crate::store::VectorSearchProvider;

pub struct Retriever {
    store: Arc<dyn VectorSearchProvider>,
}

impl Retriever {
    pub fn new(store: Arc<dyn VectorSearchProvider>) -> Self {
        Self { store }
    }

    /// Run a similarity search and return at most `k` chunks, sorted
    /// descending by score, ties by ascending id.
    ///
    /// Fails with [`RetrievalError::InvalidK`] for `k == 0`. A store
    /// holding fewer than `k` matches returns everything it has.
    pub async fn search(
        &self,
        embedding: &[f32],
        k: usize,
        collections: Option<&[String]>,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        if k == 0 {
            return Err(RetrievalError::InvalidK(k));
        }

        let mut results = self.store.search(embedding, k, collections).await?;

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        results.truncate(k);

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentChunk;
    use async_trait::async_trait;

    /// Store stub that replays a fixed result set in insertion order.
    struct FixedStore {
        results: Vec<RetrievedChunk>,
    }

    #[async_trait]
    impl VectorSearchProvider for FixedStore {
        async fn search(
            &self,
            _embedding: &[f32],
            k: usize,
            _collections: Option<&[String]>,
        ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
            let mut out = self.results.clone();
            out.truncate(k);
            Ok(out)
        }
    }

    fn scored(id: &str, score: f64) -> RetrievedChunk {
        RetrievedChunk {
            chunk: DocumentChunk {
                id: id.to_string(),
                text: String::new(),
                source_work: "Macbeth".to_string(),
                speaker: None,
                collection: "plays".to_string(),
                sequence: None,
                embedding: Vec::new(),
            },
            score,
        }
    }

    fn retriever(results: Vec<RetrievedChunk>) -> Retriever {
        Retriever::new(Arc::new(FixedStore { results }))
    }

    #[tokio::test]
    async fn zero_k_is_an_error() {
        let r = retriever(vec![]);
        let err = r.search(&[0.0], 0, None).await.unwrap_err();
        assert!(matches!(err, RetrievalError::InvalidK(0)));
    }

    #[tokio::test]
    async fn sorts_descending_by_score() {
        let r = retriever(vec![scored("a", 0.2), scored("b", 0.9), scored("c", 0.5)]);
        let results = r.search(&[0.0], 3, None).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|c| c.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn ties_break_by_ascending_id() {
        let r = retriever(vec![scored("zeta", 0.5), scored("alpha", 0.5), scored("mid", 0.5)]);
        let results = r.search(&[0.0], 3, None).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|c| c.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "mid", "zeta"]);
    }

    #[tokio::test]
    async fn never_returns_more_than_k() {
        let r = retriever(vec![scored("a", 0.9), scored("b", 0.8), scored("c", 0.7)]);
        let results = r.search(&[0.0], 2, None).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.id, "a");
    }

    #[tokio::test]
    async fn fewer_than_k_is_not_an_error() {
        let r = retriever(vec![scored("a", 0.9)]);
        let results = r.search(&[0.0], 10, None).await.unwrap();
        assert_eq!(results.len(), 1);
    }
}
