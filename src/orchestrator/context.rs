//! Per-session context assembly
//!
//! Builds the bounded prompt the agent receives on stdin: the batch, the
//! global progress counts, the newest category/global notes, the
//! dev-server port, and the instruction naming the first feature. Only the
//! newest [`CONTEXT_NOTE_LIMIT`] notes make it in; feature-scoped notes
//! are never bulk-injected, the agent pulls those on demand through
//! `get_notes`.

use std::fmt::Write as _;

use crate::store::{Feature, KanbanStats, Note};

/// Hard context budget for notes in the prompt.
pub const CONTEXT_NOTE_LIMIT: usize = 10;

pub struct SessionContext<'a> {
    pub batch: &'a [Feature],
    pub stats: &'a KanbanStats,
    /// Category + global notes, newest first
    pub notes: &'a [Note],
    pub port: u16,
}

/// Render the session prompt. `batch` must be non-empty.
pub fn assemble(ctx: &SessionContext<'_>) -> String {
    let first = &ctx.batch[0];
    let category = &first.category;
    let mut out = String::new();

    writeln!(out, "You are continuing autonomous work on this project.").unwrap();
    writeln!(out).unwrap();
    writeln!(out, "## Batch: category '{category}'").unwrap();
    for feature in ctx.batch {
        writeln!(out, "- #{} {}", feature.id, feature.name).unwrap();
        for step in &feature.steps {
            writeln!(out, "    verify: {step}").unwrap();
        }
    }

    writeln!(out).unwrap();
    writeln!(out, "## Progress").unwrap();
    writeln!(out, "{}", ctx.stats.totals).unwrap();

    writeln!(out).unwrap();
    writeln!(out, "## Recent notes").unwrap();
    if ctx.notes.is_empty() {
        writeln!(out, "(none)").unwrap();
    }
    for note in ctx.notes.iter().take(CONTEXT_NOTE_LIMIT) {
        writeln!(out, "- [session {} | {}] {}", note.session_id, note.scope(), note.content)
            .unwrap();
    }

    writeln!(out).unwrap();
    writeln!(out, "## Dev server").unwrap();
    writeln!(out, "The dev server is available on port {}.", ctx.port).unwrap();

    writeln!(out).unwrap();
    writeln!(
        out,
        "Begin with feature #{} ({}). Mark each feature in_progress before \
         starting it, work through its verification steps, and mark it \
         completed only once every step passes. If a feature cannot be \
         verified, set it back to pending and leave a note explaining why.",
        first.id, first.name
    )
    .unwrap();

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FeatureSpec, Note};
    use chrono::Utc;

    fn feature(id: i64, name: &str) -> Feature {
        FeatureSpec {
            id,
            name: name.into(),
            description: String::new(),
            category: "checkout".into(),
            steps: vec![format!("verify {name}")],
        }
        .into_feature(Utc::now())
    }

    fn note(id: i64, content: &str) -> Note {
        Note {
            id,
            feature_id: None,
            category: Some("checkout".into()),
            content: content.into(),
            session_id: 2,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn prompt_names_batch_and_first_feature() {
        let batch = vec![feature(4, "cart totals"), feature(5, "tax rules")];
        let stats = KanbanStats::default();
        let ctx = SessionContext {
            batch: &batch,
            stats: &stats,
            notes: &[],
            port: 3000,
        };

        let prompt = assemble(&ctx);
        assert!(prompt.contains("category 'checkout'"));
        assert!(prompt.contains("#4 cart totals"));
        assert!(prompt.contains("#5 tax rules"));
        assert!(prompt.contains("Begin with feature #4 (cart totals)"));
        assert!(prompt.contains("port 3000"));
        assert!(prompt.contains("(none)"));
    }

    #[test]
    fn note_budget_is_enforced() {
        let batch = vec![feature(1, "a")];
        let stats = KanbanStats::default();
        let notes: Vec<Note> = (1..=15).map(|i| note(i, &format!("note number {i}"))).collect();
        let ctx = SessionContext {
            batch: &batch,
            stats: &stats,
            notes: &notes,
            port: 3000,
        };

        let prompt = assemble(&ctx);
        assert!(prompt.contains("note number 10"));
        assert!(!prompt.contains("note number 11"));
    }

    #[test]
    fn verification_steps_are_listed_under_their_feature() {
        let batch = vec![feature(7, "signup")];
        let stats = KanbanStats::default();
        let ctx = SessionContext {
            batch: &batch,
            stats: &stats,
            notes: &[],
            port: 8080,
        };
        assert!(assemble(&ctx).contains("verify: verify signup"));
    }

    #[test]
    fn note_scope_shows_in_the_prompt() {
        let batch = vec![feature(1, "a")];
        let stats = KanbanStats::default();
        let notes = vec![note(1, "flaky fixture")];
        let ctx = SessionContext {
            batch: &batch,
            stats: &stats,
            notes: &notes,
            port: 3000,
        };
        let prompt = assemble(&ctx);
        assert!(prompt.contains("[session 2 | category checkout] flaky fixture"));
    }
}
