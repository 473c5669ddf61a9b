//! End-to-end turn pipeline tests against fake providers.
//!
//! The Coordinator is exercised with a scripted generation client, a
//! deterministic embedder, and the in-memory vector store, so every
//! scenario here is reproducible without network access.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use folio::bot::{Bot, TurnPolicy};
use folio::embedding::EmbeddingProvider;
use folio::error::{EmbeddingError, GenerationError, RetrievalError, Stage};
use folio::generation::GenerationProvider;
use folio::models::{DocumentChunk, Prompt, RetrievedChunk};
use folio::store::memory::InMemoryStore;
use folio::store::VectorSearchProvider;

/// Embedder that hashes the text into a tiny deterministic vector.
struct FakeEmbedder;

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    fn model_name(&self) -> &str {
        "fake-embed"
    }

    fn dims(&self) -> usize {
        2
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        let len = text.len() as f32;
        Ok(vec![1.0, len / (len + 1.0)])
    }
}

/// Generation client that replays a script of results and records
/// every prompt it was sent.
struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<String, GenerationError>>>,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedGenerator {
    fn new(script: Vec<Result<String, GenerationError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerationProvider for ScriptedGenerator {
    fn model_name(&self) -> &str {
        "fake-gen"
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(GenerationError::Transport("script exhausted".to_string())))
    }
}

/// Generator whose first call never completes; later calls answer.
#[derive(Default)]
struct StallingGenerator {
    calls: AtomicUsize,
}

#[async_trait]
impl GenerationProvider for StallingGenerator {
    fn model_name(&self) -> &str {
        "fake-stall"
    }

    async fn complete(&self, _prompt: &Prompt) -> Result<String, GenerationError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            std::future::pending::<()>().await;
        }
        Ok("Recovered.".to_string())
    }
}

/// Store whose search always fails, for stage-attribution tests.
struct BrokenStore;

#[async_trait]
impl VectorSearchProvider for BrokenStore {
    async fn search(
        &self,
        _embedding: &[f32],
        _k: usize,
        _collections: Option<&[String]>,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        Err(RetrievalError::Store("connection refused".to_string()))
    }
}

fn chunk(id: &str, text: &str, collection: &str) -> DocumentChunk {
    DocumentChunk {
        id: id.to_string(),
        text: text.to_string(),
        source_work: "Hamlet".to_string(),
        speaker: Some("HAMLET".to_string()),
        collection: collection.to_string(),
        sequence: None,
        embedding: vec![1.0, 0.9],
    }
}

fn seeded_store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    store.insert(chunk("ham-1", "To be, or not to be, that is the question", "plays"));
    store.insert(chunk("ham-2", "Whether 'tis nobler in the mind to suffer", "plays"));
    store.insert(chunk("son-18", "Shall I compare thee to a summer's day?", "sonnets"));
    store
}

fn bot_with(
    store: Arc<dyn VectorSearchProvider>,
    generator: Arc<dyn GenerationProvider>,
    enable_router: bool,
) -> Bot {
    Bot::new(
        Arc::new(FakeEmbedder),
        store,
        generator,
        TurnPolicy::default(),
        enable_router,
    )
}

#[tokio::test]
async fn successful_turn_records_provenance() {
    let generator = Arc::new(ScriptedGenerator::new(vec![Ok("An answer.".to_string())]));
    let bot = bot_with(seeded_store(), generator.clone(), false);

    let outcome = bot.answer("s1", "What does Hamlet say about death?").await.unwrap();

    assert_eq!(outcome.answer_text, "An answer.");
    assert!(!outcome.used_chunk_ids.is_empty());

    // Every provenance id must appear in the prompt's context block.
    let prompt = generator.prompts().pop().unwrap();
    assert!(prompt.context_block.contains("To be, or not to be"));

    let handle = bot.sessions().session("s1");
    let state = handle.lock().await;
    assert_eq!(state.len(), 1);
    assert_eq!(state.history(1)[0].used_chunk_ids, outcome.used_chunk_ids);
}

#[tokio::test]
async fn failed_generation_leaves_history_untouched() {
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Ok("First answer.".to_string()),
        Err(GenerationError::Transport("boom".to_string())),
    ]));
    let bot = bot_with(seeded_store(), generator.clone(), false);

    bot.answer("s1", "first question").await.unwrap();

    let err = bot.answer("s1", "second question").await.unwrap_err();
    assert_eq!(err.stage, Stage::Generating);

    let handle = bot.sessions().session("s1");
    let state = handle.lock().await;
    assert_eq!(state.len(), 1, "failed turn must not be recorded");
    assert_eq!(state.history(10)[0].query, "first question");
}

#[tokio::test(start_paused = true)]
async fn quota_errors_retry_then_succeed() {
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Err(GenerationError::Quota("limit".to_string())),
        Err(GenerationError::Quota("limit".to_string())),
        Ok("Third time lucky.".to_string()),
    ]));
    let bot = bot_with(seeded_store(), generator.clone(), false);

    let outcome = bot.answer("s1", "a patient question").await.unwrap();
    assert_eq!(outcome.answer_text, "Third time lucky.");
    assert_eq!(generator.calls(), 3);

    let handle = bot.sessions().session("s1");
    assert_eq!(handle.lock().await.len(), 1, "exactly one turn recorded");
}

#[tokio::test(start_paused = true)]
async fn quota_errors_exhaust_retries() {
    let script = std::iter::repeat_with(|| Err(GenerationError::Quota("limit".to_string())))
        .take(10)
        .collect();
    let generator = Arc::new(ScriptedGenerator::new(script));
    let bot = bot_with(seeded_store(), generator.clone(), false);

    let err = bot.answer("s1", "question").await.unwrap_err();
    assert_eq!(err.stage, Stage::Generating);
    // Initial attempt plus max_retries.
    assert_eq!(generator.calls(), 1 + TurnPolicy::default().max_retries as usize);

    let handle = bot.sessions().session("s1");
    assert!(handle.lock().await.is_empty());
}

#[tokio::test]
async fn non_quota_errors_do_not_retry() {
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Err(GenerationError::ContentPolicy("refused".to_string())),
        Ok("never reached".to_string()),
    ]));
    let bot = bot_with(seeded_store(), generator.clone(), false);

    let err = bot.answer("s1", "question").await.unwrap_err();
    assert_eq!(err.stage, Stage::Generating);
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn empty_query_fails_in_embedding_stage() {
    let generator = Arc::new(ScriptedGenerator::new(vec![Ok("unused".to_string())]));
    let bot = bot_with(seeded_store(), generator.clone(), false);

    let err = bot.answer("s1", "   ").await.unwrap_err();
    assert_eq!(err.stage, Stage::Embedding);
    assert_eq!(generator.calls(), 0);

    let handle = bot.sessions().session("s1");
    assert!(handle.lock().await.is_empty());
}

#[tokio::test]
async fn store_failure_fails_in_retrieving_stage() {
    let generator = Arc::new(ScriptedGenerator::new(vec![Ok("unused".to_string())]));
    let bot = bot_with(Arc::new(BrokenStore), generator.clone(), false);

    let err = bot.answer("s1", "question").await.unwrap_err();
    assert_eq!(err.stage, Stage::Retrieving);
    assert_eq!(generator.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn dropped_turn_leaves_no_partial_state() {
    let generator = Arc::new(StallingGenerator::default());
    let bot = bot_with(seeded_store(), generator.clone(), false);

    // Abandon the turn while the generation call is in flight.
    let abandoned =
        tokio::time::timeout(Duration::from_secs(5), bot.answer("s1", "first question")).await;
    assert!(abandoned.is_err(), "turn should still be in flight");
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);

    {
        let handle = bot.sessions().session("s1");
        assert!(
            handle.lock().await.is_empty(),
            "abandoned turn must not be recorded"
        );
    }

    // The session lock was released on drop; the next turn completes.
    let outcome = bot.answer("s1", "second question").await.unwrap();
    assert_eq!(outcome.answer_text, "Recovered.");

    let handle = bot.sessions().session("s1");
    let state = handle.lock().await;
    assert_eq!(state.len(), 1);
    assert_eq!(state.history(10)[0].query, "second question");
}

#[tokio::test]
async fn later_turns_see_earlier_answers() {
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Ok("Hamlet broods on mortality.".to_string()),
        Ok("A follow-up answer.".to_string()),
    ]));
    let bot = bot_with(seeded_store(), generator.clone(), false);

    bot.answer("s1", "What troubles Hamlet?").await.unwrap();
    bot.answer("s1", "And what does he resolve?").await.unwrap();

    let prompts = generator.prompts();
    assert!(prompts[0].history_block.is_empty());
    assert!(prompts[1].history_block.contains("USER: What troubles Hamlet?"));
    assert!(prompts[1].history_block.contains("ASSISTANT: Hamlet broods on mortality."));
}

#[tokio::test]
async fn sessions_are_independent() {
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Ok("answer one".to_string()),
        Ok("answer two".to_string()),
    ]));
    let bot = bot_with(seeded_store(), generator.clone(), false);

    bot.answer("alice", "question").await.unwrap();
    bot.answer("bob", "question").await.unwrap();

    let alice = bot.sessions().session("alice");
    let bob = bot.sessions().session("bob");
    assert_eq!(alice.lock().await.len(), 1);
    assert_eq!(bob.lock().await.len(), 1);

    // Bob's prompt carries none of Alice's history.
    assert!(generator.prompts()[1].history_block.is_empty());
}

#[tokio::test]
async fn routing_failure_falls_back_to_all_collections() {
    // First scripted call feeds the router, second the real answer.
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Err(GenerationError::Transport("router down".to_string())),
        Ok("Still answered.".to_string()),
    ]));
    let bot = bot_with(seeded_store(), generator.clone(), true);

    let outcome = bot.answer("s1", "Compare the sonnets and the plays").await.unwrap();
    assert_eq!(outcome.answer_text, "Still answered.");
    assert_eq!(generator.calls(), 2);
}

#[tokio::test]
async fn routing_narrows_retrieval() {
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Ok("sonnets".to_string()),
        Ok("About a summer's day.".to_string()),
    ]));
    let bot = bot_with(seeded_store(), generator.clone(), true);

    let outcome = bot.answer("s1", "Show me sonnets about love").await.unwrap();

    // Only the sonnet chunk can ground the answer.
    assert!(outcome.used_chunk_ids.contains("son-18"));
    assert!(!outcome.used_chunk_ids.contains("ham-1"));

    let answer_prompt = &generator.prompts()[1];
    assert!(answer_prompt.context_block.contains("summer's day"));
    assert!(!answer_prompt.context_block.contains("To be, or not to be"));
}
