//! Vector store abstraction.
//!
//! The [`VectorSearchProvider`] trait is the only view the bot has of
//! the vector store: a similarity query returning scored chunks.
//! Indexing and schema management live upstream; nothing here mutates
//! the store.

pub mod memory;
pub mod weaviate;

use async_trait::async_trait;

use crate::error::RetrievalError;
use crate::models::RetrievedChunk;

/// Similarity search over the indexed corpus.
///
/// Implementations return at most `k` chunks. Ordering is not part of
/// the contract — the [`Retriever`](crate::retrieve::Retriever)
/// re-sorts deterministically — but scores must be higher-is-better.
#[async_trait]
pub trait VectorSearchProvider: Send + Sync {
    /// Search for the `k` chunks nearest to `embedding`, optionally
    /// restricted to the named collections.
    ///
    /// A store with fewer than `k` matching chunks returns what it has.
    async fn search(
        &self,
        embedding: &[f32],
        k: usize,
        collections: Option<&[String]>,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError>;
}
