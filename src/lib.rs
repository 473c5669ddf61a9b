//! # Folio
//!
//! A retrieval-augmented chatbot core for Shakespeare's works.
//!
//! Folio answers natural-language questions about the plays, sonnets,
//! and poems by retrieving indexed passages from a vector store and
//! conditioning a generation model on them. This crate is the bot
//! orchestration layer: one query (plus prior conversation) in, one
//! grounded answer plus provenance out. Corpus ingestion, vector-store
//! bring-up, and any HTTP transport live outside it.
//!
//! ## Architecture
//!
//! ```text
//! query ──▶ route ──▶ embed ──▶ retrieve ──▶ assemble ──▶ generate ──▶ record
//!        (optional)  Ollama/    Weaviate     budgeted     OpenAI       answer +
//!                    OpenAI     nearVector   merge/dedup  chat         chunk ids
//! ```
//!
//! Every turn is one pass through that pipeline, executed atomically
//! per session: either a complete turn is recorded or nothing is.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy per subsystem |
//! | [`models`] | Chunks, context, turns, prompt |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector search provider abstraction |
//! | [`retrieve`] | Deterministic retrieval ordering |
//! | [`context`] | Budgeted context assembly |
//! | [`prompt`] | Prompt construction |
//! | [`generation`] | Generation model client |
//! | [`router`] | Collection routing |
//! | [`conversation`] | Sessions and turn history |
//! | [`bot`] | The per-turn Coordinator |

pub mod bot;
pub mod config;
pub mod context;
pub mod conversation;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod models;
pub mod prompt;
pub mod retrieve;
pub mod router;
pub mod store;
