//! Interactive revision protocol.
//!
//! Every operation follows the same two-phase shape: a plan step
//! gathers context, calls the generation collaborator, and stages the
//! result as a [`CandidatePatch`]; the commit step lives in the session
//! and appends exactly one patch per confirmed candidate. A rejected
//! candidate is dropped on the floor and never touches the log.

use super::{allocate_paragraphs, split_paragraphs, AuthorConfig};
use crate::author::drafting::preceding_context;
use crate::generate::{
    generate_with_retry, GenerateError, GenerationRequest, Generator, OperationKind,
};
use crate::lorebook::Lorebook;
use crate::outline::{Project, SceneId};
use crate::patch::{PatchOp, PatchOrigin, PatchRecord};
use thiserror::Error;

/// Errors from revision planning.
#[derive(Debug, Error)]
pub enum RevisionError {
    #[error("generation failed: {0}")]
    Generation(#[from] GenerateError),

    #[error("unknown or removed scene {0}")]
    UnknownScene(SceneId),

    #[error("the collaborator returned no usable prose")]
    EmptyGeneration,
}

/// A staged patch awaiting confirmation. Holds everything needed to
/// show the user what would change; committing or discarding it is the
/// caller's decision.
#[derive(Debug, Clone)]
pub struct CandidatePatch {
    pub record: PatchRecord,

    /// The generated prose, for display in the confirmation prompt.
    pub preview: String,
}

impl CandidatePatch {
    /// One-line description of what committing would do.
    pub fn describe(&self) -> String {
        format!("[{}] {}", self.record.origin, self.record.describe())
    }
}

/// Plan an expansion: request additional prose anchored at the end of
/// the scene's existing paragraphs. Existing paragraph ids are never
/// altered; the new prose gets fresh ids.
pub async fn plan_expand(
    generator: &dyn Generator,
    project: &Project,
    lorebook: &Lorebook,
    config: &AuthorConfig,
    scene_id: SceneId,
    target_words: usize,
    expected_seq: u64,
) -> Result<CandidatePatch, RevisionError> {
    let (chapter, scene) = live_scene(project, scene_id)?;
    let current_words = scene.word_count();
    let wanted = target_words.saturating_sub(current_words).max(100);

    let existing = scene_text(project, scene_id);
    let lore_query = format!("{} {} {existing}", chapter.summary, scene.summary);

    let mut prompt = String::new();
    if let Some(lore) = lorebook.context_block(&lore_query, config.lore_token_budget) {
        prompt.push_str(&lore);
        prompt.push('\n');
    }
    prompt.push_str(&format!(
        "## Scene\n{}\n\n## Current prose\n{existing}\n\n\
         Continue this scene with roughly {wanted} more words. Pick up exactly \
         where the current prose stops; do not repeat or rewrite it.",
        scene.summary
    ));

    let request = build_request(project, config, OperationKind::Expand, prompt);
    let text = generate_with_retry(generator, &request, &config.retry).await?;
    let paragraphs = split_paragraphs(&text);
    if paragraphs.is_empty() {
        return Err(RevisionError::EmptyGeneration);
    }

    let preview = paragraphs.join("\n\n");
    let payload = allocate_paragraphs(project, paragraphs);
    Ok(CandidatePatch {
        record: PatchRecord::new(
            expected_seq,
            PatchOrigin::Expand,
            PatchOp::Expand {
                scene: scene_id,
                paragraphs: payload,
            },
        ),
        preview,
    })
}

/// Plan a rewrite of a scene's prose. With `keep_prior` the existing
/// content is supplied as context to revise; without it (fresh rewrite)
/// only the summaries and surrounding narrative are supplied. Either
/// way the old paragraph ids are retired and the replacement gets fresh
/// ids, so provenance stays traceable.
pub async fn plan_rewrite(
    generator: &dyn Generator,
    project: &Project,
    lorebook: &Lorebook,
    config: &AuthorConfig,
    scene_id: SceneId,
    instructions: Option<&str>,
    keep_prior: bool,
    expected_seq: u64,
) -> Result<CandidatePatch, RevisionError> {
    let (chapter, scene) = live_scene(project, scene_id)?;
    let window = preceding_context(project, scene_id, config.context_window_words);

    let lore_query = format!("{} {} {window}", chapter.summary, scene.summary);
    let mut prompt = String::new();
    if let Some(lore) = lorebook.context_block(&lore_query, config.lore_token_budget) {
        prompt.push_str(&lore);
        prompt.push('\n');
    }
    prompt.push_str(&format!("## Chapter intent\n{}\n", chapter.summary));
    if !window.is_empty() {
        prompt.push_str(&format!("\n## The story so far\n{window}\n"));
    }
    prompt.push_str(&format!("\n## Scene\n{}\n", scene.summary));
    if keep_prior {
        prompt.push_str(&format!(
            "\n## Current prose\n{}\n",
            scene_text(project, scene_id)
        ));
    }
    if let Some(instructions) = instructions {
        prompt.push_str(&format!("\n## Instructions\n{instructions}\n"));
    }
    prompt.push_str(
        "\nWrite the complete replacement prose for this scene from the first \
         word to the last.",
    );

    let kind = if keep_prior {
        OperationKind::Rewrite
    } else {
        OperationKind::FreshRewrite
    };
    let request = build_request(project, config, kind, prompt);
    let text = generate_with_retry(generator, &request, &config.retry).await?;
    let paragraphs = split_paragraphs(&text);
    if paragraphs.is_empty() {
        return Err(RevisionError::EmptyGeneration);
    }

    let retire: Vec<_> = scene.paragraphs.iter().map(|p| p.id).collect();
    let preview = paragraphs.join("\n\n");
    let payload = allocate_paragraphs(project, paragraphs);
    let origin = if keep_prior {
        PatchOrigin::Rewrite
    } else {
        PatchOrigin::FreshRewrite
    };
    Ok(CandidatePatch {
        record: PatchRecord::new(
            expected_seq,
            origin,
            PatchOp::ReplaceContent {
                scene: scene_id,
                retire,
                paragraphs: payload,
            },
        ),
        preview,
    })
}

/// Analyze the full current manuscript and return a numbered list of
/// suggestions. Read-only: produces no patch; each suggestion can be
/// fed back into [`plan_rewrite`] as instructions.
pub async fn suggest_edits(
    generator: &dyn Generator,
    project: &Project,
    config: &AuthorConfig,
) -> Result<Vec<String>, RevisionError> {
    let mut manuscript = String::new();
    for chapter in project.live_chapters() {
        manuscript.push_str(&format!("# Chapter {}: {}\n\n", chapter.id.0, chapter.summary));
        for scene in chapter.live_scenes() {
            for paragraph in &scene.paragraphs {
                manuscript.push_str(&paragraph.content);
                manuscript.push_str("\n\n");
            }
        }
    }

    let prompt = format!(
        "## Manuscript\n{manuscript}\n\nRead the manuscript above and list the \
         most valuable concrete edits, one per line, numbered `1.`, `2.`, and so \
         on. Name the chapter or scene each edit applies to. Return only the list."
    );

    let request = GenerationRequest::new(
        OperationKind::SuggestEdits,
        super::prose_system_prompt(project),
        prompt,
    )
    .with_max_tokens(config.max_tokens);
    let text = generate_with_retry(generator, &request, &config.retry).await?;

    let suggestions = parse_numbered_list(&text);
    if suggestions.is_empty() {
        return Err(RevisionError::EmptyGeneration);
    }
    Ok(suggestions)
}

fn live_scene(
    project: &Project,
    scene_id: SceneId,
) -> Result<(&crate::outline::Chapter, &crate::outline::Scene), RevisionError> {
    if !project.scene_is_live(scene_id) {
        return Err(RevisionError::UnknownScene(scene_id));
    }
    project
        .scene(scene_id)
        .ok_or(RevisionError::UnknownScene(scene_id))
}

fn scene_text(project: &Project, scene_id: SceneId) -> String {
    project
        .scene(scene_id)
        .map(|(_, s)| {
            s.paragraphs
                .iter()
                .map(|p| p.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n")
        })
        .unwrap_or_default()
}

fn build_request(
    project: &Project,
    config: &AuthorConfig,
    kind: OperationKind,
    prompt: String,
) -> GenerationRequest {
    let mut request =
        GenerationRequest::new(kind, super::prose_system_prompt(project), prompt)
            .with_max_tokens(config.max_tokens);
    if let Some(temperature) = config.temperature {
        request = request.with_temperature(temperature);
    }
    request
}

/// Pull the items out of a numbered list, tolerating `1.`, `2)`, and
/// leading whitespace.
fn parse_numbered_list(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            let rest = line
                .strip_prefix(|c: char| c.is_ascii_digit())
                .map(|r| r.trim_start_matches(|c: char| c.is_ascii_digit()))
                .and_then(|r| r.strip_prefix(['.', ')']))?;
            let item = rest.trim();
            (!item.is_empty()).then(|| item.to_string())
        })
        .collect()
}
