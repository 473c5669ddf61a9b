//! Context assembly: from ranked chunks to a budget-bounded context.
//!
//! Per-dialogue-line chunking makes chunk sizes highly uneven, so the
//! assembler is a greedy-by-rank knapsack rather than first-fit: a
//! chunk that would overflow the budget is skipped, not a stopping
//! point, which lets smaller relevant chunks behind it still land.
//!
//! Before budgeting, retrieved chunks from the same work and speaker
//! with consecutive sequence numbers are merged into a single
//! [`ContextUnit`], recovering the semantic unit the line-level index
//! fragments. Merged units keep every constituent chunk id so
//! provenance stays exact.

use std::collections::{HashMap, HashSet};

use crate::models::{AssembledContext, ContextUnit, RetrievedChunk};

/// Assemble ranked chunks into a context no larger than `budget` chars.
///
/// Pure and idempotent: the same input always yields the same output.
/// A budget of zero (or one smaller than every unit) yields an empty
/// context rather than an error.
pub fn assemble(
    ranked: &[RetrievedChunk],
    budget: usize,
    merge_adjacent: bool,
) -> AssembledContext {
    let deduped = dedup_by_id(ranked);

    let mut units = if merge_adjacent {
        merge_units(&deduped)
    } else {
        deduped.iter().map(|c| singleton_unit(c)).collect()
    };

    // Deterministic order: best score first, ties by leading chunk id.
    units.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_ids.cmp(&b.chunk_ids))
    });

    let mut selected = Vec::new();
    let mut total_chars = 0usize;

    for unit in units {
        let len = unit.len();
        if total_chars + len <= budget && !unit.is_empty() {
            total_chars += len;
            selected.push(unit);
        }
    }

    AssembledContext {
        units: selected,
        total_chars,
    }
}

/// Keep the first (highest-ranked) occurrence of each chunk id.
fn dedup_by_id(ranked: &[RetrievedChunk]) -> Vec<&RetrievedChunk> {
    let mut seen = HashSet::new();
    ranked
        .iter()
        .filter(|c| seen.insert(c.chunk.id.as_str()))
        .collect()
}

fn singleton_unit(c: &RetrievedChunk) -> ContextUnit {
    ContextUnit {
        chunk_ids: vec![c.chunk.id.clone()],
        text: c.chunk.text.clone(),
        source_work: c.chunk.source_work.clone(),
        speaker: c.chunk.speaker.clone(),
        score: c.score,
    }
}

/// Coalesce same-work, same-speaker chunks with consecutive sequence
/// numbers. Chunks without a speaker or sequence stay singletons.
fn merge_units(chunks: &[&RetrievedChunk]) -> Vec<ContextUnit> {
    let mut groups: HashMap<(String, String), Vec<&RetrievedChunk>> = HashMap::new();
    let mut units = Vec::new();

    for c in chunks {
        match (&c.chunk.speaker, c.chunk.sequence) {
            (Some(speaker), Some(_)) => {
                groups
                    .entry((c.chunk.source_work.clone(), speaker.clone()))
                    .or_default()
                    .push(c);
            }
            _ => units.push(singleton_unit(c)),
        }
    }

    for ((_, _), mut members) in groups {
        members.sort_by_key(|c| c.chunk.sequence);

        let mut run: Vec<&RetrievedChunk> = Vec::new();
        for c in members {
            let adjacent = run
                .last()
                .and_then(|prev| prev.chunk.sequence)
                .map(|prev_seq| c.chunk.sequence == Some(prev_seq + 1))
                .unwrap_or(false);

            if run.is_empty() || adjacent {
                run.push(c);
            } else {
                units.push(run_to_unit(&run));
                run = vec![c];
            }
        }
        if !run.is_empty() {
            units.push(run_to_unit(&run));
        }
    }

    units
}

fn run_to_unit(run: &[&RetrievedChunk]) -> ContextUnit {
    let text = run
        .iter()
        .map(|c| c.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let score = run
        .iter()
        .map(|c| c.score)
        .fold(f64::NEG_INFINITY, f64::max);

    ContextUnit {
        chunk_ids: run.iter().map(|c| c.chunk.id.clone()).collect(),
        text,
        source_work: run[0].chunk.source_work.clone(),
        speaker: run[0].chunk.speaker.clone(),
        score,
    }
}
