//! The Coordinator: one query in, one grounded answer out.
//!
//! [`Bot::answer`] drives a strictly sequential state machine per
//! turn — route (optional) → embed → retrieve → assemble → generate →
//! record — holding the session lock throughout. Each external call
//! runs under its own timeout; only a generation quota error is
//! retried, with exponential backoff. A failed turn returns a
//! [`TurnError`] naming the failing stage and leaves the conversation
//! untouched: the single `record` at the end is the only mutation, so
//! cancellation (dropping the future) at any await point also leaves
//! no partial turn behind.
//!
//! Keeping retrieval and generation inside one atomic state machine is
//! what makes provenance trustworthy: the chunk ids recorded with a
//! turn are exactly the ids of the context sent to the model.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::context::assemble;
use crate::conversation::SessionRegistry;
use crate::embedding::{create_embedder, EmbeddingProvider};
use crate::error::{GenerationError, Stage, TurnError};
use crate::generation::{create_generator, GenerationProvider};
use crate::models::Turn;
use crate::prompt::build_prompt;
use crate::retrieve::Retriever;
use crate::router::QueryRouter;
use crate::store::weaviate::WeaviateStore;
use crate::store::VectorSearchProvider;

/// The successful result of one turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The generated answer.
    pub answer_text: String,
    /// Ids of the chunks whose text was sent to the model.
    pub used_chunk_ids: BTreeSet<String>,
}

/// Tuning knobs for the turn pipeline, extracted from [`Config`].
#[derive(Debug, Clone)]
pub struct TurnPolicy {
    pub top_k: usize,
    pub budget_chars: usize,
    pub merge_adjacent: bool,
    pub max_history_turns: usize,
    pub embed_timeout_secs: u64,
    pub retrieve_timeout_secs: u64,
    pub generate_timeout_secs: u64,
    pub route_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for TurnPolicy {
    fn default() -> Self {
        Self {
            top_k: 12,
            budget_chars: 6000,
            merge_adjacent: true,
            max_history_turns: 3,
            embed_timeout_secs: 15,
            retrieve_timeout_secs: 15,
            generate_timeout_secs: 60,
            route_timeout_secs: 15,
            max_retries: 3,
            retry_backoff_ms: 1000,
        }
    }
}

impl From<&Config> for TurnPolicy {
    fn from(config: &Config) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            budget_chars: config.context.budget_chars,
            merge_adjacent: config.context.merge_adjacent,
            max_history_turns: config.history.max_turns,
            embed_timeout_secs: config.embedding.timeout_secs,
            retrieve_timeout_secs: config.store.timeout_secs,
            generate_timeout_secs: config.generation.timeout_secs,
            route_timeout_secs: config.router.timeout_secs,
            max_retries: config.generation.max_retries,
            retry_backoff_ms: config.generation.retry_backoff_ms,
        }
    }
}

pub struct Bot {
    embedder: Arc<dyn EmbeddingProvider>,
    retriever: Retriever,
    generator: Arc<dyn GenerationProvider>,
    router: Option<QueryRouter>,
    sessions: SessionRegistry,
    policy: TurnPolicy,
}

impl Bot {
    /// Assemble a bot from explicit providers. The seam used by tests
    /// and by anyone swapping in an alternative backend.
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorSearchProvider>,
        generator: Arc<dyn GenerationProvider>,
        policy: TurnPolicy,
        enable_router: bool,
    ) -> Self {
        let router = enable_router.then(|| QueryRouter::new(Arc::clone(&generator)));
        Self {
            embedder,
            retriever: Retriever::new(store),
            generator,
            router,
            sessions: SessionRegistry::new(),
            policy,
        }
    }

    /// Build the configured production bot: Weaviate store plus the
    /// configured embedding and generation providers.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let embedder: Arc<dyn EmbeddingProvider> = create_embedder(&config.embedding)?.into();
        let store: Arc<dyn VectorSearchProvider> = Arc::new(WeaviateStore::new(&config.store)?);
        let generator: Arc<dyn GenerationProvider> = create_generator(&config.generation)?.into();
        Ok(Self::new(
            embedder,
            store,
            generator,
            TurnPolicy::from(config),
            config.router.enabled,
        ))
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn policy(&self) -> &TurnPolicy {
        &self.policy
    }

    /// Run one turn for `session_id`.
    ///
    /// Turns within one session serialize on the session lock; turn N
    /// always sees turn N-1's recorded answer. On success exactly one
    /// [`Turn`] is appended; on failure none is.
    pub async fn answer(&self, session_id: &str, query: &str) -> Result<TurnOutcome, TurnError> {
        let handle = self.sessions.session(session_id);
        let mut state = handle.lock().await;

        // Routing narrows the collection filter but never fails a turn.
        let collections = match &self.router {
            Some(router) => {
                let route = tokio::time::timeout(
                    Duration::from_secs(self.policy.route_timeout_secs),
                    router.route(query),
                )
                .await;
                match route {
                    Ok(Ok(collections)) => Some(collections),
                    Ok(Err(e)) => {
                        warn!(error = %e, "routing failed; searching all collections");
                        None
                    }
                    Err(_) => {
                        warn!("routing timed out; searching all collections");
                        None
                    }
                }
            }
            None => None,
        };

        let embedding = staged(
            Stage::Embedding,
            self.policy.embed_timeout_secs,
            self.embedder.embed(query),
        )
        .await?;

        let ranked = staged(
            Stage::Retrieving,
            self.policy.retrieve_timeout_secs,
            self.retriever
                .search(&embedding, self.policy.top_k, collections.as_deref()),
        )
        .await?;
        debug!(candidates = ranked.len(), "retrieval complete");

        let context = assemble(&ranked, self.policy.budget_chars, self.policy.merge_adjacent);
        if context.is_empty() {
            warn!("no retrieved chunk fit the context budget");
        }

        let prompt = build_prompt(query, &context, state.history(self.policy.max_history_turns));

        let answer_text = self.generate_with_retry(&prompt).await?;

        let used_chunk_ids = context.chunk_ids();
        state.record(Turn {
            query: query.to_string(),
            answer: answer_text.clone(),
            used_chunk_ids: used_chunk_ids.clone(),
            timestamp: Utc::now(),
        });

        info!(
            session = session_id,
            turns = state.len(),
            chunks = used_chunk_ids.len(),
            "turn recorded"
        );

        Ok(TurnOutcome {
            answer_text,
            used_chunk_ids,
        })
    }

    /// Call the generation model, retrying quota errors with
    /// exponential backoff up to `max_retries` extra attempts. All
    /// other errors, including a timeout, end the turn immediately.
    async fn generate_with_retry(&self, prompt: &crate::models::Prompt) -> Result<String, TurnError> {
        let ceiling = Duration::from_secs(self.policy.generate_timeout_secs);
        let mut last_err: Option<GenerationError> = None;

        for attempt in 0..=self.policy.max_retries {
            if attempt > 0 {
                // 1x, 2x, 4x, ... the base delay, capped at 32x.
                let delay = self.policy.retry_backoff_ms << (attempt - 1).min(5);
                debug!(attempt, delay_ms = delay, "retrying after quota error");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            match tokio::time::timeout(ceiling, self.generator.complete(prompt)).await {
                Ok(Ok(text)) => return Ok(text),
                Ok(Err(e)) if e.is_retryable() => {
                    last_err = Some(e);
                }
                Ok(Err(e)) => return Err(TurnError::new(Stage::Generating, e)),
                Err(_) => {
                    return Err(TurnError::timeout(
                        Stage::Generating,
                        self.policy.generate_timeout_secs,
                    ))
                }
            }
        }

        Err(TurnError::new(
            Stage::Generating,
            last_err.unwrap_or(GenerationError::EmptyCompletion),
        ))
    }
}

/// Run a stage's external call under its timeout ceiling, translating
/// both the call's own error and a timeout into a [`TurnError`].
async fn staged<T, E, F>(stage: Stage, ceiling_secs: u64, fut: F) -> Result<T, TurnError>
where
    E: std::error::Error + Send + Sync + 'static,
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(Duration::from_secs(ceiling_secs), fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(TurnError::new(stage, e)),
        Err(_) => Err(TurnError::timeout(stage, ceiling_secs)),
    }
}
