//! Prompt construction for the generation model.
//!
//! Builds the four-block [`Prompt`] from the assembled context, the
//! recent history window, and the current query. When nothing fits the
//! context budget, an explicit no-grounding marker takes the place of
//! the passages so the model never mistakes an empty retrieval for
//! licence to invent quotations.

use crate::models::{AssembledContext, Prompt, Turn};

/// Role and grounding rules sent as the system message every turn.
const SYSTEM_INSTRUCTIONS: &str = "\
You are a knowledgeable Shakespeare scholar and literary expert. Your task is \
to answer questions about Shakespeare's works using only the provided passages \
as evidence.

Guidelines:
- Base your answer strictly on the provided passages
- Be specific about which works, acts, scenes, or sonnets you're referencing
- If the passages don't fully answer the question, acknowledge what they do and don't reveal
- Maintain an engaging, scholarly tone
- Include relevant quotes when they strengthen your answer";

/// Marker used when retrieval produced no context within budget.
pub const NO_CONTEXT_MARKER: &str =
    "No grounding passages are available for this question. Say so plainly and \
     do not quote or attribute any text.";

/// Build the prompt for one turn. Never mutated after this.
pub fn build_prompt(query: &str, context: &AssembledContext, history: &[Turn]) -> Prompt {
    Prompt {
        system_instructions: SYSTEM_INSTRUCTIONS.to_string(),
        context_block: render_context(context),
        history_block: render_history(history),
        user_query: query.to_string(),
    }
}

/// Render assembled units as cited passages, best match first.
fn render_context(context: &AssembledContext) -> String {
    if context.is_empty() {
        return NO_CONTEXT_MARKER.to_string();
    }

    let mut blocks = Vec::with_capacity(context.units.len());
    for unit in &context.units {
        let header = match &unit.speaker {
            Some(speaker) => format!("**{}** ({})", unit.source_work, speaker),
            None => format!("**{}**", unit.source_work),
        };
        blocks.push(format!("{}\n{}", header, unit.text));
    }
    blocks.join("\n\n")
}

/// Render the recent history window as a labelled transcript,
/// oldest turn first. Empty when there is no prior history.
fn render_history(history: &[Turn]) -> String {
    let mut lines = Vec::with_capacity(history.len() * 2);
    for turn in history {
        lines.push(format!("USER: {}", turn.query));
        lines.push(format!("ASSISTANT: {}", turn.answer));
    }
    lines.join("\n")
}
