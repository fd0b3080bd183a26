//! Outline construction.
//!
//! Asks the generation collaborator for a complete project skeleton as
//! JSON, validates it structurally, and retries with corrective
//! instructions when the structure comes back malformed. Identifiers
//! are assigned deterministically in document order once a sketch is
//! accepted.

use crate::generate::{
    generate_with_retry, GenerateError, GenerationRequest, Generator, OperationKind,
};
use crate::outline::{Chapter, Character, Metadata, Project, Scene, StoryKind};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from outline construction.
#[derive(Debug, Error)]
pub enum OutlineError {
    #[error("generation failed: {0}")]
    Generation(#[from] GenerateError),

    #[error("malformed outline after {attempts} attempt(s): {reason}")]
    MalformedOutline { attempts: u32, reason: String },
}

/// Structural requirements on a generated outline.
#[derive(Debug, Clone)]
pub struct OutlineConstraints {
    /// Minimum number of chapters the collaborator must produce.
    pub min_chapters: usize,

    /// Total attempts before a malformed outline becomes fatal.
    pub max_attempts: u32,
}

impl Default for OutlineConstraints {
    fn default() -> Self {
        Self {
            min_chapters: 3,
            max_attempts: 3,
        }
    }
}

impl OutlineConstraints {
    /// Defaults appropriate for the story form: short stories need only
    /// a single chapter-like section.
    pub fn for_kind(kind: StoryKind) -> Self {
        match kind {
            StoryKind::Novel => Self::default(),
            StoryKind::ShortStory => Self {
                min_chapters: 1,
                ..Self::default()
            },
        }
    }
}

/// The JSON shape the collaborator is asked to return.
#[derive(Debug, Deserialize)]
struct OutlineSketch {
    #[serde(default)]
    title: String,
    #[serde(default)]
    synopsis: String,
    #[serde(default)]
    characters: Vec<CharacterSketch>,
    #[serde(default)]
    chapters: Vec<ChapterSketch>,
}

#[derive(Debug, Deserialize)]
struct CharacterSketch {
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChapterSketch {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    scenes: Vec<SceneSketch>,
}

#[derive(Debug, Deserialize)]
struct SceneSketch {
    #[serde(default)]
    summary: String,
}

/// Produce a full project skeleton from an idea: metadata, roster, and
/// every chapter/scene summary, with zero paragraph content.
pub async fn create_outline(
    generator: &dyn Generator,
    idea: &str,
    kind: StoryKind,
    constraints: &OutlineConstraints,
    retry: &crate::generate::RetryPolicy,
) -> Result<Project, OutlineError> {
    let mut last_reason = String::new();

    for attempt in 1..=constraints.max_attempts {
        let prompt = if attempt == 1 {
            outline_prompt(idea, kind, constraints)
        } else {
            format!(
                "{}\n\n## Corrections\nYour previous outline was rejected: {last_reason}. \
                 Respond with only the corrected JSON object.",
                outline_prompt(idea, kind, constraints)
            )
        };

        let request = GenerationRequest::new(OperationKind::Outline, OUTLINE_SYSTEM, prompt)
            .with_max_tokens(8192);
        let response = generate_with_retry(generator, &request, retry).await?;

        match parse_sketch(&response, constraints) {
            Ok(sketch) => {
                debug!(attempt, chapters = sketch.chapters.len(), "outline accepted");
                return Ok(build_project(idea, kind, sketch));
            }
            Err(reason) => {
                warn!(attempt, %reason, "malformed outline");
                last_reason = reason;
            }
        }
    }

    Err(OutlineError::MalformedOutline {
        attempts: constraints.max_attempts,
        reason: last_reason,
    })
}

const OUTLINE_SYSTEM: &str = "You are a story architect. You design outlines for \
long-form fiction and respond with a single JSON object, nothing else.";

fn outline_prompt(idea: &str, kind: StoryKind, constraints: &OutlineConstraints) -> String {
    format!(
        r#"Design the outline for a {} based on this idea:

"{idea}"

Respond with ONLY a JSON object (no markdown fences, no commentary):
{{
  "title": "...",
  "synopsis": "one paragraph",
  "characters": [{{"name": "...", "description": "..."}}],
  "chapters": [
    {{"summary": "what this chapter accomplishes",
      "scenes": [{{"summary": "what happens in this scene"}}]}}
  ]
}}

Requirements: at least {} chapter(s); every chapter and scene must have a
non-empty summary; every chapter must contain at least one scene."#,
        kind.name(),
        constraints.min_chapters,
    )
}

fn parse_sketch(response: &str, constraints: &OutlineConstraints) -> Result<OutlineSketch, String> {
    let json = extract_json(response);
    let sketch: OutlineSketch =
        serde_json::from_str(json).map_err(|e| format!("invalid JSON: {e}"))?;
    validate_sketch(&sketch, constraints)?;
    Ok(sketch)
}

fn validate_sketch(sketch: &OutlineSketch, constraints: &OutlineConstraints) -> Result<(), String> {
    if sketch.title.trim().is_empty() {
        return Err("missing title".to_string());
    }
    if sketch.synopsis.trim().is_empty() {
        return Err("missing synopsis".to_string());
    }
    if sketch.chapters.len() < constraints.min_chapters {
        return Err(format!(
            "only {} chapter(s), need at least {}",
            sketch.chapters.len(),
            constraints.min_chapters
        ));
    }
    for (i, chapter) in sketch.chapters.iter().enumerate() {
        if chapter.summary.trim().is_empty() {
            return Err(format!("chapter {} has an empty summary", i + 1));
        }
        for (j, scene) in chapter.scenes.iter().enumerate() {
            if scene.summary.trim().is_empty() {
                return Err(format!(
                    "chapter {} scene {} has an empty summary",
                    i + 1,
                    j + 1
                ));
            }
        }
    }
    Ok(())
}

/// Turn an accepted sketch into a project, assigning chapter and scene
/// ids in document order. Chapters with no scenes get a single implicit
/// scene carrying the chapter summary.
fn build_project(idea: &str, kind: StoryKind, sketch: OutlineSketch) -> Project {
    let metadata = Metadata {
        title: sketch.title.trim().to_string(),
        synopsis: sketch.synopsis.trim().to_string(),
        idea: idea.to_string(),
        kind,
    };
    let characters = sketch
        .characters
        .into_iter()
        .map(|c| Character {
            name: c.name,
            description: c.description,
        })
        .collect();

    let mut project = Project::new(metadata, characters);
    for chapter_sketch in sketch.chapters {
        let id = project.counters.alloc_chapter();
        let mut chapter = Chapter::new(id, chapter_sketch.summary.trim());
        if chapter_sketch.scenes.is_empty() {
            let sc = project.counters.alloc_scene();
            chapter.scenes.push(Scene::new(sc, chapter.summary.clone()));
        } else {
            for scene_sketch in chapter_sketch.scenes {
                let sc = project.counters.alloc_scene();
                chapter
                    .scenes
                    .push(Scene::new(sc, scene_sketch.summary.trim()));
            }
        }
        project.chapters.push(chapter);
    }
    project
}

/// Extract JSON from a response that might wrap it in markdown fences.
fn extract_json(text: &str) -> &str {
    let text = text.trim();

    if let Some(start) = text.find("```json") {
        let content_start = start + 7;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        let content_start = start + 3;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::RetryPolicy;
    use crate::outline::{ChapterId, SceneId};
    use crate::testing::MockAuthor;

    const GOOD_OUTLINE: &str = r#"{
        "title": "Emberline",
        "synopsis": "A courier carries fire through a frozen pass.",
        "characters": [{"name": "Senna", "description": "The courier."}],
        "chapters": [
            {"summary": "Setting out", "scenes": [{"summary": "Leaving the lowlands"}]},
            {"summary": "The pass", "scenes": [
                {"summary": "First night"}, {"summary": "The crevasse"}]},
            {"summary": "Arrival", "scenes": []}
        ]
    }"#;

    #[test]
    fn test_extract_json_plain_and_fenced() {
        assert_eq!(extract_json(r#"{"a": 1}"#), r#"{"a": 1}"#);
        assert_eq!(extract_json("```json\n{\"a\": 1}\n```"), r#"{"a": 1}"#);
        assert_eq!(extract_json("```\n{\"a\": 1}\n```"), r#"{"a": 1}"#);
    }

    #[tokio::test]
    async fn test_outline_ids_assigned_in_document_order() {
        let generator = MockAuthor::new().reply(GOOD_OUTLINE);
        let project = create_outline(
            &generator,
            "fire courier",
            StoryKind::Novel,
            &OutlineConstraints::default(),
            &RetryPolicy::default(),
        )
        .await
        .expect("outline");

        assert_eq!(project.metadata.title, "Emberline");
        assert_eq!(project.chapters.len(), 3);
        let chapter_ids: Vec<_> = project.chapters.iter().map(|c| c.id).collect();
        assert_eq!(
            chapter_ids,
            vec![ChapterId(1), ChapterId(2), ChapterId(3)]
        );
        let scene_ids: Vec<_> = project
            .chapters
            .iter()
            .flat_map(|c| c.scenes.iter().map(|s| s.id))
            .collect();
        assert_eq!(
            scene_ids,
            vec![SceneId(1), SceneId(2), SceneId(3), SceneId(4)]
        );
        // The scene-less chapter got an implicit scene from its summary.
        assert_eq!(project.chapters[2].scenes[0].summary, "Arrival");
        // Outline phase writes no prose.
        assert_eq!(project.word_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_outline_retried_with_corrections() {
        let generator = MockAuthor::new()
            .reply(r#"{"title": "", "synopsis": "x", "chapters": []}"#)
            .reply(GOOD_OUTLINE);

        let project = create_outline(
            &generator,
            "fire courier",
            StoryKind::Novel,
            &OutlineConstraints::default(),
            &RetryPolicy::default(),
        )
        .await
        .expect("second attempt accepted");

        assert_eq!(project.chapters.len(), 3);
        assert_eq!(generator.calls(), 2);
        // The retry prompt carried the rejection reason.
        let second_prompt = generator.prompt(1);
        assert!(second_prompt.contains("Corrections"));
        assert!(second_prompt.contains("missing title"));
    }

    #[tokio::test]
    async fn test_malformed_outline_bounded() {
        let generator = MockAuthor::new()
            .reply("not json at all")
            .reply("still not json")
            .reply("nope");

        let err = create_outline(
            &generator,
            "fire courier",
            StoryKind::Novel,
            &OutlineConstraints::default(),
            &RetryPolicy::default(),
        )
        .await
        .unwrap_err();

        match err {
            OutlineError::MalformedOutline { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(generator.calls(), 3);
    }

    #[tokio::test]
    async fn test_chapter_minimum_enforced() {
        let one_chapter = r#"{
            "title": "T", "synopsis": "S",
            "chapters": [{"summary": "only", "scenes": [{"summary": "one"}]}]
        }"#;
        let generator = MockAuthor::new()
            .reply(one_chapter)
            .reply(one_chapter)
            .reply(one_chapter);

        let err = create_outline(
            &generator,
            "idea",
            StoryKind::Novel,
            &OutlineConstraints::default(),
            &RetryPolicy::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OutlineError::MalformedOutline { .. }));

        // The same sketch is fine for a short story.
        let generator = MockAuthor::new().reply(one_chapter);
        let project = create_outline(
            &generator,
            "idea",
            StoryKind::ShortStory,
            &OutlineConstraints::for_kind(StoryKind::ShortStory),
            &RetryPolicy::default(),
        )
        .await
        .expect("short story outline");
        assert_eq!(project.chapters.len(), 1);
    }

    #[tokio::test]
    async fn test_permanent_generation_failure_surfaces() {
        let generator = MockAuthor::new().permanent("refused");
        let err = create_outline(
            &generator,
            "idea",
            StoryKind::Novel,
            &OutlineConstraints::default(),
            &RetryPolicy::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            OutlineError::Generation(GenerateError::Permanent(_))
        ));
    }
}
