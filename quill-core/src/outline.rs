//! Manuscript document model.
//!
//! Contains the types for representing a project: metadata, the character
//! roster, and the ordered chapter/scene/paragraph tree. The model is a
//! derived view: all mutation flows through the patch log and the
//! reconstruction fold, and nothing here persists itself.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub Uuid);

impl ProjectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Short hex form used in directory names.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identifier for a chapter. Assigned once, in document order,
/// and never reused; a removed chapter keeps its number reserved.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ChapterId(pub u64);

impl fmt::Display for ChapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

/// Stable identifier for a scene, unique across the whole project.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SceneId(pub u64);

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sc{}", self.0)
    }
}

/// Stable identifier for a paragraph, unique across the whole project.
/// Assigned the moment content is first written for it, never before.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ParagraphId(pub u64);

impl fmt::Display for ParagraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Monotonic counters backing id assignment.
///
/// Serialized with the outline so that resumed projects continue from
/// the same sequence; reconstruction advances the paragraph counter past
/// every id seen in the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdCounters {
    next_chapter: u64,
    next_scene: u64,
    next_paragraph: u64,
}

impl IdCounters {
    pub fn new() -> Self {
        Self {
            next_chapter: 1,
            next_scene: 1,
            next_paragraph: 1,
        }
    }

    pub fn alloc_chapter(&mut self) -> ChapterId {
        let id = ChapterId(self.next_chapter);
        self.next_chapter += 1;
        id
    }

    pub fn alloc_scene(&mut self) -> SceneId {
        let id = SceneId(self.next_scene);
        self.next_scene += 1;
        id
    }

    pub fn alloc_paragraph(&mut self) -> ParagraphId {
        let id = ParagraphId(self.next_paragraph);
        self.next_paragraph += 1;
        id
    }

    /// Next paragraph id without consuming it.
    pub fn peek_paragraph(&self) -> ParagraphId {
        ParagraphId(self.next_paragraph)
    }

    /// Move the paragraph counter past `id` if it is not already.
    pub fn reserve_paragraph(&mut self, id: ParagraphId) {
        if id.0 >= self.next_paragraph {
            self.next_paragraph = id.0 + 1;
        }
    }
}

impl Default for IdCounters {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Metadata & Characters
// ============================================================================

/// The form of the work being drafted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoryKind {
    Novel,
    ShortStory,
}

impl StoryKind {
    pub fn name(&self) -> &'static str {
        match self {
            StoryKind::Novel => "novel",
            StoryKind::ShortStory => "short story",
        }
    }
}

/// Project metadata, set at outline generation. Amendable only by patch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Working title.
    pub title: String,

    /// One-paragraph synopsis.
    pub synopsis: String,

    /// The user's original idea, kept verbatim.
    pub idea: String,

    /// Novel or short story.
    pub kind: StoryKind,
}

/// A roster entry produced by outline generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    pub description: String,
}

// ============================================================================
// Document tree
// ============================================================================

/// The unit of generated prose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paragraph {
    pub id: ParagraphId,

    /// Prose text.
    pub content: String,

    /// Sequence number of the patch that last wrote this paragraph.
    pub written_by: u64,
}

/// An ordered scene within a chapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub id: SceneId,

    /// Narrative intent, authored during the outline phase. Never empty.
    pub summary: String,

    /// Live paragraphs in reading order.
    pub paragraphs: Vec<Paragraph>,

    /// Logically removed; excluded from the live view, id stays reserved.
    #[serde(default)]
    pub tombstoned: bool,
}

impl Scene {
    pub fn new(id: SceneId, summary: impl Into<String>) -> Self {
        Self {
            id,
            summary: summary.into(),
            paragraphs: Vec::new(),
            tombstoned: false,
        }
    }

    /// Whether no prose has been written for this scene yet.
    pub fn is_empty(&self) -> bool {
        self.paragraphs.is_empty()
    }

    pub fn word_count(&self) -> usize {
        self.paragraphs
            .iter()
            .map(|p| p.content.split_whitespace().count())
            .sum()
    }

    pub fn paragraph(&self, id: ParagraphId) -> Option<&Paragraph> {
        self.paragraphs.iter().find(|p| p.id == id)
    }

    pub fn paragraph_mut(&mut self, id: ParagraphId) -> Option<&mut Paragraph> {
        self.paragraphs.iter_mut().find(|p| p.id == id)
    }
}

/// An ordered chapter within the project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub id: ChapterId,

    /// Narrative intent, authored during the outline phase. Never empty.
    pub summary: String,

    /// Ordered scenes. Short-form projects use a single implicit scene.
    pub scenes: Vec<Scene>,

    /// Logically removed; excluded from the live view, id stays reserved.
    #[serde(default)]
    pub tombstoned: bool,
}

impl Chapter {
    pub fn new(id: ChapterId, summary: impl Into<String>) -> Self {
        Self {
            id,
            summary: summary.into(),
            scenes: Vec::new(),
            tombstoned: false,
        }
    }

    /// Scenes visible in the live view.
    pub fn live_scenes(&self) -> impl Iterator<Item = &Scene> {
        self.scenes.iter().filter(|s| !s.tombstoned)
    }

    pub fn scene(&self, id: SceneId) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.id == id)
    }

    pub fn scene_mut(&mut self, id: SceneId) -> Option<&mut Scene> {
        self.scenes.iter_mut().find(|s| s.id == id)
    }

    pub fn word_count(&self) -> usize {
        self.live_scenes().map(|s| s.word_count()).sum()
    }
}

/// A paragraph retired by a replace or tombstone patch. Kept for audit;
/// its id is never handed out again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetiredParagraph {
    pub paragraph: Paragraph,

    /// Scene the paragraph belonged to.
    pub scene: SceneId,

    /// Sequence number of the patch that retired it.
    pub retired_by: u64,
}

// ============================================================================
// Project
// ============================================================================

/// The root aggregate: metadata, roster, and the chapter tree.
///
/// A `Project` is always the result of folding the initial outline with a
/// patch prefix. It is safe to throw away and rebuild at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,

    /// Filesystem-safe name derived from the title at creation time.
    pub slug: String,

    pub metadata: Metadata,

    pub characters: Vec<Character>,

    /// Ordered chapters, including tombstoned ones (id reservation).
    pub chapters: Vec<Chapter>,

    /// Id assignment state.
    pub counters: IdCounters,

    /// Paragraphs removed from the live view, retrievable for audit.
    #[serde(default)]
    pub retired: Vec<RetiredParagraph>,
}

impl Project {
    /// Create an empty project shell. Chapters are added by the outline
    /// builder, which assigns ids in document order.
    pub fn new(metadata: Metadata, characters: Vec<Character>) -> Self {
        let slug = slugify(&metadata.title);
        Self {
            id: ProjectId::new(),
            slug,
            metadata,
            characters,
            chapters: Vec::new(),
            counters: IdCounters::new(),
            retired: Vec::new(),
        }
    }

    /// Directory name for this project: slug plus a short unique suffix.
    pub fn dir_name(&self) -> String {
        format!("{}-{}", self.slug, self.id.short())
    }

    /// Chapters visible in the live view.
    pub fn live_chapters(&self) -> impl Iterator<Item = &Chapter> {
        self.chapters.iter().filter(|c| !c.tombstoned)
    }

    pub fn chapter(&self, id: ChapterId) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.id == id)
    }

    pub fn chapter_mut(&mut self, id: ChapterId) -> Option<&mut Chapter> {
        self.chapters.iter_mut().find(|c| c.id == id)
    }

    /// Locate a scene anywhere in the tree, tombstoned or not.
    pub fn scene(&self, id: SceneId) -> Option<(&Chapter, &Scene)> {
        self.chapters
            .iter()
            .find_map(|c| c.scene(id).map(|s| (c, s)))
    }

    pub fn scene_mut(&mut self, id: SceneId) -> Option<&mut Scene> {
        self.chapters.iter_mut().find_map(|c| c.scene_mut(id))
    }

    /// Whether a scene is visible in the live view (neither it nor its
    /// chapter is tombstoned).
    pub fn scene_is_live(&self, id: SceneId) -> bool {
        self.scene(id)
            .map(|(c, s)| !c.tombstoned && !s.tombstoned)
            .unwrap_or(false)
    }

    /// Look up a live paragraph anywhere in the tree.
    pub fn paragraph(&self, id: ParagraphId) -> Option<&Paragraph> {
        self.chapters
            .iter()
            .flat_map(|c| c.scenes.iter())
            .find_map(|s| s.paragraph(id))
    }

    /// Whether a paragraph id has ever been used, live or retired.
    pub fn paragraph_id_known(&self, id: ParagraphId) -> bool {
        self.paragraph(id).is_some() || self.retired.iter().any(|r| r.paragraph.id == id)
    }

    /// A retired paragraph, by id.
    pub fn retired_paragraph(&self, id: ParagraphId) -> Option<&RetiredParagraph> {
        self.retired.iter().find(|r| r.paragraph.id == id)
    }

    /// Total live word count.
    pub fn word_count(&self) -> usize {
        self.live_chapters().map(|c| c.word_count()).sum()
    }

    /// Count of live scenes.
    pub fn scene_count(&self) -> usize {
        self.live_chapters().map(|c| c.live_scenes().count()).sum()
    }
}

/// Lowercase the title and collapse everything else to underscores,
/// matching the save-path convention used for all on-disk names.
pub fn slugify(title: &str) -> String {
    let mut slug: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .take(48)
        .collect();
    if slug.is_empty() {
        slug.push_str("untitled");
    }
    slug
}
