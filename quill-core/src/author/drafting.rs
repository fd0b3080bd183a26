//! Phase-2 batch drafting.
//!
//! Selection and prompt assembly for the drafting pipeline. The session
//! drives the actual loop: one sequential generation call per pending
//! scene, one write-content patch appended as soon as each scene's
//! prose arrives, so a mid-run failure loses only the in-flight scene.

use super::AuthorConfig;
use crate::generate::{GenerationRequest, OperationKind};
use crate::lorebook::Lorebook;
use crate::outline::{ChapterId, Project, SceneId};

/// Every live scene whose paragraph set is empty, in document order.
pub fn select_pending(project: &Project) -> Vec<(ChapterId, SceneId)> {
    project
        .live_chapters()
        .flat_map(|chapter| {
            chapter
                .live_scenes()
                .filter(|scene| scene.is_empty())
                .map(move |scene| (chapter.id, scene.id))
        })
        .collect()
}

/// Prose immediately preceding a scene in the live reading order,
/// trimmed from the front to at most `max_words` words.
pub fn preceding_context(project: &Project, before: SceneId, max_words: usize) -> String {
    let mut paragraphs: Vec<&str> = Vec::new();
    'outer: for chapter in project.live_chapters() {
        for scene in chapter.live_scenes() {
            if scene.id == before {
                break 'outer;
            }
            for paragraph in &scene.paragraphs {
                paragraphs.push(&paragraph.content);
            }
        }
    }

    let mut window: Vec<&str> = Vec::new();
    let mut words = 0;
    for paragraph in paragraphs.into_iter().rev() {
        let count = paragraph.split_whitespace().count();
        if words + count > max_words && !window.is_empty() {
            break;
        }
        words += count;
        window.push(paragraph);
        if words >= max_words {
            break;
        }
    }
    window.reverse();
    window.join("\n\n")
}

/// Assemble the generation request for one pending scene: its summary,
/// its chapter's intent, a bounded window of preceding prose, and any
/// lorebook entries triggered by that context.
pub fn build_draft_request(
    project: &Project,
    lorebook: &Lorebook,
    config: &AuthorConfig,
    chapter: ChapterId,
    scene: SceneId,
) -> Option<GenerationRequest> {
    let chapter = project.chapter(chapter)?;
    let scene = chapter.scene(scene)?;

    let window = preceding_context(project, scene.id, config.context_window_words);
    let lore_query = format!("{} {} {window}", chapter.summary, scene.summary);
    let lore = lorebook.context_block(&lore_query, config.lore_token_budget);

    let mut prompt = String::new();
    if let Some(lore) = lore {
        prompt.push_str(&lore);
        prompt.push('\n');
    }
    prompt.push_str(&format!("## Chapter intent\n{}\n", chapter.summary));
    if !window.is_empty() {
        prompt.push_str(&format!("\n## The story so far\n{window}\n"));
    }
    prompt.push_str(&format!(
        "\n## This scene\n{}\n\nWrite the full prose for this scene, continuing \
         seamlessly from the story so far.",
        scene.summary
    ));

    let mut request = GenerationRequest::new(
        OperationKind::Draft,
        super::prose_system_prompt(project),
        prompt,
    )
    .with_max_tokens(config.max_tokens);
    if let Some(temperature) = config.temperature {
        request = request.with_temperature(temperature);
    }
    Some(request)
}
