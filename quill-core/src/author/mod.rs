//! The AI author: outline construction, phase-2 drafting, and the
//! interactive revision protocol.
//!
//! Everything here plans work against a reconstructed project and
//! produces either prompts or staged patch records; nothing in this
//! module touches the log. Committing is the session's job, behind the
//! confirmation gate.

mod drafting;
mod outline_gen;
mod revision;

pub use drafting::{build_draft_request, preceding_context, select_pending};
pub use outline_gen::{create_outline, OutlineConstraints, OutlineError};
pub use revision::{
    plan_expand, plan_rewrite, suggest_edits, CandidatePatch, RevisionError,
};

use crate::generate::RetryPolicy;
use crate::outline::{ParagraphId, Project};
use crate::patch::ParagraphText;

/// Tunables shared by every generation-facing operation.
#[derive(Debug, Clone)]
pub struct AuthorConfig {
    /// Token ceiling per generation call.
    pub max_tokens: usize,

    /// Sampling temperature for prose calls.
    pub temperature: Option<f32>,

    /// How much immediately preceding prose to carry into a drafting or
    /// revision prompt, in words.
    pub context_window_words: usize,

    /// Token budget handed to the lorebook engine per call.
    pub lore_token_budget: usize,

    /// Retry policy for transient generation failures.
    pub retry: RetryPolicy,
}

impl Default for AuthorConfig {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: Some(0.8),
            context_window_words: 600,
            lore_token_budget: 800,
            retry: RetryPolicy::default(),
        }
    }
}

/// Split generated prose into paragraphs on blank lines.
pub(crate) fn split_paragraphs(text: &str) -> Vec<String> {
    text.split("\n\n")
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| p.to_string())
        .collect()
}

/// Assign fresh paragraph ids to generated prose, continuing from the
/// project's counter without consuming it. The ids become real only if
/// the patch carrying them is committed.
pub(crate) fn allocate_paragraphs(project: &Project, texts: Vec<String>) -> Vec<ParagraphText> {
    let mut next = project.counters.peek_paragraph().0;
    texts
        .into_iter()
        .map(|content| {
            let id = ParagraphId(next);
            next += 1;
            ParagraphText { id, content }
        })
        .collect()
}

/// The system prompt shared by prose-producing calls.
pub(crate) fn prose_system_prompt(project: &Project) -> String {
    let mut prompt = format!(
        "You are drafting a {} titled \"{}\".\n\nSynopsis: {}\n",
        project.metadata.kind.name(),
        project.metadata.title,
        project.metadata.synopsis,
    );
    if !project.characters.is_empty() {
        prompt.push_str("\nCharacters:\n");
        for character in &project.characters {
            prompt.push_str(&format!("- {}: {}\n", character.name, character.description));
        }
    }
    prompt.push_str(
        "\nWrite polished narrative prose. Separate paragraphs with blank lines. \
         Return only the prose itself, no headings or commentary.",
    );
    prompt
}
