//! Collection routing: pick which corpus partitions to search.
//!
//! The corpus is split into three collections (`plays`, `sonnets`,
//! `poems`) with very different retrieval characteristics, so a query
//! about Iago should not spend its candidate budget on sonnets. The
//! router asks the generation model for the relevant collection names
//! before embedding. Routing is best-effort: any failure or nonsense
//! answer falls back to searching everything, decided by the caller.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::RouteError;
use crate::generation::GenerationProvider;
use crate::models::Prompt;

/// The corpus partitions known to the router, and to the loader.
pub const COLLECTIONS: [&str; 3] = ["plays", "sonnets", "poems"];

const ROUTING_INSTRUCTIONS: &str = "\
You are a Shakespeare expert. Given a user's question about Shakespeare's \
works, determine which collection(s) would be most relevant to search.

Collections available:
- \"plays\": All 37 dramatic works (tragedies, comedies, histories) with characters, dialogue, scenes
- \"sonnets\": The 154 sonnets - love poetry, philosophical reflections, personal themes
- \"poems\": Other poetry (Venus and Adonis, Rape of Lucrece, Lover's Complaint) - narrative poems

Rules:
1. Return ONLY the collection name(s) that would contain the answer
2. Questions about specific plays, characters, scenes, or dialogue -> \"plays\"
3. Questions about sonnets, love poetry, or sonnet themes -> \"sonnets\"
4. Questions about narrative poems like Venus & Adonis -> \"poems\"
5. Return a comma-separated list if multiple collections are needed
6. Be conservative - prefer fewer, more focused searches

Respond with ONLY the collection name(s), nothing else.";

pub struct QueryRouter {
    generator: Arc<dyn GenerationProvider>,
}

impl QueryRouter {
    pub fn new(generator: Arc<dyn GenerationProvider>) -> Self {
        Self { generator }
    }

    /// Ask the model which collections to search for `query`.
    ///
    /// Fails with [`RouteError`] when the call fails or the answer
    /// names no known collection; the caller decides the fallback.
    pub async fn route(&self, query: &str) -> Result<Vec<String>, RouteError> {
        let prompt = Prompt {
            system_instructions: ROUTING_INSTRUCTIONS.to_string(),
            context_block: String::new(),
            history_block: String::new(),
            user_query: query.to_string(),
        };

        let answer = self
            .generator
            .complete(&prompt)
            .await
            .map_err(|e| RouteError(e.to_string()))?;

        let collections = parse_collections(&answer);
        if collections.is_empty() {
            warn!(%answer, "router named no known collection");
            return Err(RouteError(format!("unusable routing answer: {answer}")));
        }

        debug!(?collections, "routed query");
        Ok(collections)
    }
}

/// Extract known collection names from the model's answer.
///
/// Tolerates case, whitespace, quotes, and trailing punctuation;
/// unknown names are dropped and duplicates collapse.
fn parse_collections(answer: &str) -> Vec<String> {
    let mut out = Vec::new();
    for raw in answer.split(',') {
        let name = raw
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '.')
            .to_lowercase();
        if COLLECTIONS.contains(&name.as_str()) && !out.contains(&name) {
            out.push(name);
        }
    }
    out
}
