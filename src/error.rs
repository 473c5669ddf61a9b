//! Error taxonomy for the turn pipeline.
//!
//! Each subsystem gets its own error enum so callers can match on the
//! failure class without string inspection. The Coordinator wraps any
//! of them into a [`TurnError`] that names the pipeline [`Stage`] that
//! failed; that stage attribution is part of the public contract and
//! is what the tests assert on.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

/// Failures from an embedding provider.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The input text was empty or whitespace-only. Detected before
    /// any network call.
    #[error("cannot embed empty input")]
    EmptyInput,

    /// Network, HTTP, or serialization failure.
    #[error("embedding transport error: {0}")]
    Transport(String),

    /// The provider answered but returned no vector.
    #[error("embedding provider returned an empty response")]
    EmptyResponse,
}

/// Failures from vector search.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// `k` must be at least 1.
    #[error("invalid top-k value: {0}")]
    InvalidK(usize),

    /// The store was unreachable or refused the query.
    #[error("vector store error: {0}")]
    Store(String),

    /// The store answered with a payload that could not be decoded.
    #[error("malformed store response: {0}")]
    BadResponse(String),
}

/// Failures from the generation model.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Network, HTTP, or serialization failure.
    #[error("generation transport error: {0}")]
    Transport(String),

    /// Rate limit or quota exhaustion (HTTP 429). The only error the
    /// Coordinator retries.
    #[error("generation quota exceeded: {0}")]
    Quota(String),

    /// The model refused to answer on content-policy grounds.
    #[error("generation refused by content policy: {0}")]
    ContentPolicy(String),

    /// The model answered with no usable text.
    #[error("generation returned an empty completion")]
    EmptyCompletion,
}

impl GenerationError {
    /// Whether retrying the same request can plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GenerationError::Quota(_))
    }
}

/// Failure to route a query to corpus collections. Routing errors are
/// advisory: the Coordinator falls back to searching everything.
#[derive(Debug, Error)]
#[error("routing failed: {0}")]
pub struct RouteError(pub String);

/// The pipeline stage a turn failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Embedding,
    Retrieving,
    Assembling,
    Generating,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Embedding => "embedding",
            Stage::Retrieving => "retrieving",
            Stage::Assembling => "assembling",
            Stage::Generating => "generating",
        };
        f.write_str(name)
    }
}

/// A failed turn: which stage broke, and the underlying cause.
///
/// The conversation is guaranteed untouched when a turn ends in a
/// `TurnError`.
#[derive(Debug)]
pub struct TurnError {
    /// The stage that failed.
    pub stage: Stage,
    /// The subsystem error that caused the failure.
    pub source: Box<dyn StdError + Send + Sync>,
}

impl TurnError {
    pub fn new<E>(stage: Stage, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            stage,
            source: Box::new(source),
        }
    }

    /// A stage exceeded its timeout ceiling.
    pub fn timeout(stage: Stage, ceiling_secs: u64) -> Self {
        Self {
            stage,
            source: format!("timed out after {ceiling_secs}s").into(),
        }
    }
}

impl fmt::Display for TurnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "turn failed while {}: {}", self.stage, self.source)
    }
}

impl StdError for TurnError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.source.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_quota_is_retryable() {
        assert!(GenerationError::Quota("429".into()).is_retryable());
        assert!(!GenerationError::Transport("503".into()).is_retryable());
        assert!(!GenerationError::ContentPolicy("no".into()).is_retryable());
        assert!(!GenerationError::EmptyCompletion.is_retryable());
    }

    #[test]
    fn turn_error_names_the_stage() {
        let err = TurnError::new(Stage::Retrieving, RetrievalError::Store("down".into()));
        assert_eq!(err.stage, Stage::Retrieving);
        assert!(err.to_string().contains("retrieving"));
        assert!(err.to_string().contains("down"));
    }

    #[test]
    fn timeout_carries_the_ceiling() {
        let err = TurnError::timeout(Stage::Generating, 60);
        assert_eq!(err.stage, Stage::Generating);
        assert!(err.to_string().contains("60s"));
    }
}
