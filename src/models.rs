//! Core data types that flow through the turn pipeline.
//!
//! [`DocumentChunk`] is produced upstream by the (out-of-scope) corpus
//! ingestion pipeline and consumed read-only here. Everything else is
//! ephemeral per-turn state, except [`Turn`], which is immutable once
//! recorded into a conversation.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A minimal unit of indexed source text with its own embedding.
///
/// Immutable once indexed. `sequence` orders chunks within a work
/// (plays are chunked per dialogue line) and enables adjacent-chunk
/// merging during context assembly; poems and sonnets may not carry it.
#[derive(Debug, Clone)]
pub struct DocumentChunk {
    /// Stable chunk identifier.
    pub id: String,
    /// The passage text.
    pub text: String,
    /// Title of the work this chunk comes from (e.g. `"Hamlet"`).
    pub source_work: String,
    /// Speaker of the passage, for dialogue chunks.
    pub speaker: Option<String>,
    /// Corpus collection: `"plays"`, `"sonnets"`, or `"poems"`.
    pub collection: String,
    /// Position of the chunk within its work, when known.
    pub sequence: Option<i64>,
    /// Precomputed embedding vector.
    pub embedding: Vec<f32>,
}

/// A chunk returned from vector search, with its similarity score.
///
/// Higher score means more relevant. The score is whatever similarity
/// measure the backend uses and is not necessarily bounded to `[0, 1]`.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: DocumentChunk,
    pub score: f64,
}

/// One assembled block of context text, covering one or more merged
/// adjacent chunks.
///
/// The context unit is deliberately decoupled from the indexed chunk:
/// per-dialogue-line chunking produces fragments too small to stand
/// alone, so consecutive chunks from the same speaker coalesce into a
/// single unit. `chunk_ids` keeps the full id set for provenance.
#[derive(Debug, Clone)]
pub struct ContextUnit {
    /// Ids of every chunk merged into this unit, in sequence order.
    pub chunk_ids: Vec<String>,
    /// Combined passage text.
    pub text: String,
    /// Work the unit comes from.
    pub source_work: String,
    /// Speaker, when all merged chunks share one.
    pub speaker: Option<String>,
    /// Best (maximum) score among the merged chunks.
    pub score: f64,
}

impl ContextUnit {
    /// Size of this unit as counted against the context budget.
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// The budget-bounded context selected for one turn's prompt.
///
/// Invariant: `total_chars` never exceeds the budget it was assembled
/// under. May be empty when nothing fits; the prompt then carries an
/// explicit no-grounding marker instead.
#[derive(Debug, Clone, Default)]
pub struct AssembledContext {
    /// Selected units, in descending score order.
    pub units: Vec<ContextUnit>,
    /// Total characters of unit text (separators excluded).
    pub total_chars: usize,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Union of all chunk ids across units — the provenance set.
    pub fn chunk_ids(&self) -> BTreeSet<String> {
        self.units
            .iter()
            .flat_map(|u| u.chunk_ids.iter().cloned())
            .collect()
    }
}

/// One completed query/answer exchange. Immutable once created.
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    /// The user's question.
    pub query: String,
    /// The generated answer.
    pub answer: String,
    /// Ids of the chunks that grounded the answer.
    pub used_chunk_ids: BTreeSet<String>,
    /// When the turn completed.
    pub timestamp: DateTime<Utc>,
}

/// The fully assembled prompt sent to the generation model.
///
/// Derived fresh each turn and never mutated after construction; the
/// generation client only reads it. Keeping the four blocks as one
/// value means provenance is auditable from the Prompt alone.
#[derive(Debug, Clone)]
pub struct Prompt {
    /// Role and grounding rules for the model.
    pub system_instructions: String,
    /// Rendered retrieved passages, or the no-grounding marker.
    pub context_block: String,
    /// Rendered recent conversation history, possibly empty.
    pub history_block: String,
    /// The current question, verbatim.
    pub user_query: String,
}
