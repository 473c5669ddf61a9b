//! Conversation state and session management.
//!
//! [`ConversationState`] is an append-only record of completed turns
//! for one session. It is not safe for concurrent mutation, so the
//! [`SessionRegistry`] wraps each session in a `tokio::sync::Mutex`;
//! the Coordinator holds that lock for the whole turn, serializing
//! turns within a session while distinct sessions run in parallel.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::Mutex;

use crate::models::Turn;

/// One session's ordered turn record. Grows monotonically; a session
/// is discarded, never edited.
#[derive(Debug)]
pub struct ConversationState {
    session_id: String,
    turns: Vec<Turn>,
}

impl ConversationState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            turns: Vec::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Append a completed turn. O(1) amortized; the only mutation.
    pub fn record(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// The most recent `max_turns` turns, oldest first. Never more
    /// than exist.
    pub fn history(&self, max_turns: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(max_turns);
        &self.turns[start..]
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Write the full transcript to a text file.
    pub fn export(&self, path: &Path) -> Result<()> {
        let mut out = String::from("FOLIO - Conversation Export\n");
        out.push_str(&"=".repeat(60));
        out.push_str("\n\n");

        for turn in &self.turns {
            out.push_str(&format!("USER: {}\n\n", turn.query));
            out.push_str(&format!("FOLIO: {}\n\n", turn.answer));
            out.push_str(&"-".repeat(50));
            out.push_str("\n\n");
        }

        out.push_str(&format!(
            "Exported on: {}\n",
            Utc::now().format("%Y-%m-%d %H:%M:%S")
        ));

        std::fs::write(path, out)
            .with_context(|| format!("Failed to write transcript: {}", path.display()))
    }
}

/// Shared handle to one session's state.
pub type SessionHandle = Arc<Mutex<ConversationState>>;

/// Hands out per-session handles keyed by session id.
///
/// Sessions are created on first use and dropped explicitly when they
/// end; there is no persistence across process restarts.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Get or create the handle for `session_id`.
    pub fn session(&self, session_id: &str) -> SessionHandle {
        if let Some(handle) = self.sessions.read().unwrap().get(session_id) {
            return Arc::clone(handle);
        }
        let mut sessions = self.sessions.write().unwrap();
        Arc::clone(
            sessions
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(ConversationState::new(session_id)))),
        )
    }

    /// Discard a session. Outstanding handles stay usable but the
    /// registry forgets the id.
    pub fn end(&self, session_id: &str) {
        self.sessions.write().unwrap().remove(session_id);
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
