//! Studio: the primary public API.
//!
//! A `Studio` ties the whole engine together for one project: the
//! generation collaborator, the lorebook, the durable outline and patch
//! log, and the derived document model. All mutation funnels through
//! [`Studio::commit`], which persists the patch before the in-memory
//! state moves, so the log is always last-known-good.

use crate::author::{
    self, create_outline, plan_expand, plan_rewrite, select_pending, suggest_edits,
    AuthorConfig, CandidatePatch, OutlineConstraints, OutlineError, RevisionError,
};
use crate::generate::{generate_with_retry, GenerateError, Generator};
use crate::log::{PatchError, PatchLog};
use crate::lorebook::{Lorebook, LorebookError};
use crate::outline::{Project, SceneId, StoryKind};
use crate::patch::{
    MetadataField, NodeRef, PatchOp, PatchOrigin, PatchRecord, Reordering,
};
use crate::persist::{self, PersistError, StoredOutline, LOREBOOK_FILE};
use crate::reconstruct::{self, ApplyError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Errors from studio operations.
#[derive(Debug, Error)]
pub enum StudioError {
    #[error("outline: {0}")]
    Outline(#[from] OutlineError),

    #[error("generation: {0}")]
    Generation(#[from] GenerateError),

    #[error("revision: {0}")]
    Revision(#[from] RevisionError),

    #[error("patch log: {0}")]
    Patch(#[from] PatchError),

    #[error("patch apply: {0}")]
    Apply(#[from] ApplyError),

    #[error("persistence: {0}")]
    Persist(#[from] PersistError),

    #[error("lorebook: {0}")]
    Lorebook(#[from] LorebookError),

    #[error("drafting produced no prose for scene {0}")]
    EmptyDraft(SceneId),
}

/// The confirmation gate for interactive revision operations. No patch
/// is ever appended without a `true` from the confirmer; a rejected
/// candidate is discarded without any log mutation.
pub trait Confirmer {
    fn confirm(&mut self, candidate: &CandidatePatch) -> bool;
}

/// Configuration for opening or creating a studio.
#[derive(Debug, Clone)]
pub struct StudioConfig {
    /// Directory all projects live under.
    pub base_dir: PathBuf,

    /// Generation tunables.
    pub author: AuthorConfig,

    /// Outline constraints; defaults per story kind when unset.
    pub outline: Option<OutlineConstraints>,
}

impl StudioConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            author: AuthorConfig::default(),
            outline: None,
        }
    }

    pub fn with_author(mut self, author: AuthorConfig) -> Self {
        self.author = author;
        self
    }

    pub fn with_outline_constraints(mut self, constraints: OutlineConstraints) -> Self {
        self.outline = Some(constraints);
        self
    }
}

/// Report from a drafting run.
#[derive(Debug, Clone, Default)]
pub struct DraftReport {
    /// Scenes that received prose and were durably committed.
    pub scenes_drafted: usize,

    /// Live words in the manuscript after the run.
    pub total_words: usize,
}

/// A writing session over one project.
pub struct Studio {
    generator: Arc<dyn Generator>,
    config: StudioConfig,
    lorebook: Lorebook,
    dir: PathBuf,

    /// The immutable starting point of every reconstruction.
    outline: Project,

    log: PatchLog,

    /// Derived cache: always `fold(outline, log)`.
    project: Project,
}

impl Studio {
    /// Create a new project: run the outline phase, persist the outline
    /// record, and open a session with an empty patch log.
    pub async fn create(
        generator: Arc<dyn Generator>,
        config: StudioConfig,
        idea: &str,
        kind: StoryKind,
    ) -> Result<Self, StudioError> {
        let constraints = config
            .outline
            .clone()
            .unwrap_or_else(|| OutlineConstraints::for_kind(kind));

        let outline = create_outline(
            generator.as_ref(),
            idea,
            kind,
            &constraints,
            &config.author.retry,
        )
        .await?;

        let dir = persist::project_dir(&config.base_dir, &outline);
        StoredOutline::new(outline.clone()).save(&dir).await?;
        let lorebook = Lorebook::load_json(dir.join(LOREBOOK_FILE)).await?;

        info!(slug = %outline.slug, chapters = outline.chapters.len(), "project created");
        Ok(Self {
            generator,
            config,
            lorebook,
            dir,
            project: outline.clone(),
            outline,
            log: PatchLog::new(),
        })
    }

    /// Resume a project from its directory: load the outline, replay
    /// the longest valid prefix of the patch log, and rebuild the
    /// document model.
    pub async fn resume(
        generator: Arc<dyn Generator>,
        config: StudioConfig,
        dir: impl AsRef<Path>,
    ) -> Result<Self, StudioError> {
        let dir = dir.as_ref().to_path_buf();
        let stored = StoredOutline::load(&dir).await?;
        let readout = persist::read_patches(&dir).await?;
        let project = reconstruct::reconstruct(&stored.outline, &readout.records)?;
        let lorebook = Lorebook::load_json(dir.join(LOREBOOK_FILE)).await?;

        info!(
            slug = %project.slug,
            patches = readout.records.len(),
            discarded = readout.discarded,
            "project resumed"
        );
        Ok(Self {
            generator,
            config,
            lorebook,
            dir,
            outline: stored.outline,
            log: PatchLog::from_records(readout.records),
            project,
        })
    }

    /// The current document model.
    pub fn project(&self) -> &Project {
        &self.project
    }

    /// The patch log, including history behind tombstones.
    pub fn log(&self) -> &PatchLog {
        &self.log
    }

    /// The immutable outline the project was created with.
    pub fn initial_outline(&self) -> &Project {
        &self.outline
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn lorebook(&self) -> &Lorebook {
        &self.lorebook
    }

    /// Append a confirmed patch: validate against the current model,
    /// persist it durably, then advance the in-memory log and cache. A
    /// failure at any step leaves the log exactly as it was.
    pub async fn commit(&mut self, record: PatchRecord) -> Result<u64, StudioError> {
        let expected = self.log.next_seq();
        if record.seq != expected {
            return Err(PatchError::OutOfOrder {
                expected,
                found: record.seq,
            }
            .into());
        }

        let mut next = self.project.clone();
        reconstruct::apply(&mut next, &record)?;

        persist::append_patch(&self.dir, &record).await?;
        let seq = self.log.append(record)?;
        self.project = next;
        Ok(seq)
    }

    /// Draft every pending scene in document order, committing one
    /// patch per scene as soon as its prose arrives.
    pub async fn draft_pending(&mut self) -> Result<DraftReport, StudioError> {
        let pending = select_pending(&self.project);
        let mut report = DraftReport::default();

        for (chapter_id, scene_id) in pending {
            let request = author::build_draft_request(
                &self.project,
                &self.lorebook,
                &self.config.author,
                chapter_id,
                scene_id,
            )
            .expect("pending scene exists");

            let text =
                generate_with_retry(self.generator.as_ref(), &request, &self.config.author.retry)
                    .await?;
            let paragraphs = author::split_paragraphs(&text);
            if paragraphs.is_empty() {
                return Err(StudioError::EmptyDraft(scene_id));
            }

            let payload = author::allocate_paragraphs(&self.project, paragraphs);
            let record = PatchRecord::new(
                self.log.next_seq(),
                PatchOrigin::Drafting,
                PatchOp::WriteContent {
                    scene: scene_id,
                    paragraphs: payload,
                },
            );
            let seq = self.commit(record).await?;
            info!(scene = %scene_id, seq, "scene drafted");
            report.scenes_drafted += 1;
        }

        report.total_words = self.project.word_count();
        Ok(report)
    }

    /// Expand a scene toward a target word count, behind confirmation.
    /// Returns the committed sequence number, or `None` on rejection.
    pub async fn expand(
        &mut self,
        scene: SceneId,
        target_words: usize,
        confirmer: &mut dyn Confirmer,
    ) -> Result<Option<u64>, StudioError> {
        let candidate = plan_expand(
            self.generator.as_ref(),
            &self.project,
            &self.lorebook,
            &self.config.author,
            scene,
            target_words,
            self.log.next_seq(),
        )
        .await?;
        self.gated_commit(candidate, confirmer).await
    }

    /// Expand several scenes in one pass. Each scene is planned and
    /// confirmed separately; exactly one patch lands per accepted
    /// candidate, so a rejection in the middle skips only that scene.
    pub async fn expand_many(
        &mut self,
        scenes: &[SceneId],
        target_words: usize,
        confirmer: &mut dyn Confirmer,
    ) -> Result<Vec<u64>, StudioError> {
        let mut committed = Vec::new();
        for &scene in scenes {
            if let Some(seq) = self.expand(scene, target_words, confirmer).await? {
                committed.push(seq);
            }
        }
        Ok(committed)
    }

    /// Rewrite a scene, with or without its prior content as context,
    /// behind confirmation.
    pub async fn rewrite(
        &mut self,
        scene: SceneId,
        instructions: Option<&str>,
        fresh: bool,
        confirmer: &mut dyn Confirmer,
    ) -> Result<Option<u64>, StudioError> {
        let candidate = plan_rewrite(
            self.generator.as_ref(),
            &self.project,
            &self.lorebook,
            &self.config.author,
            scene,
            instructions,
            !fresh,
            self.log.next_seq(),
        )
        .await?;
        self.gated_commit(candidate, confirmer).await
    }

    /// Analyze the full manuscript and return numbered suggestions.
    /// Read-only; never appends.
    pub async fn suggest(&self) -> Result<Vec<String>, StudioError> {
        Ok(suggest_edits(self.generator.as_ref(), &self.project, &self.config.author).await?)
    }

    /// Amend a metadata field. Direct user edit, no confirmation gate.
    pub async fn amend_metadata(
        &mut self,
        field: MetadataField,
        value: impl Into<String>,
    ) -> Result<u64, StudioError> {
        let record = PatchRecord::new(
            self.log.next_seq(),
            PatchOrigin::Editor,
            PatchOp::MetadataAmend {
                field,
                value: value.into(),
            },
        );
        self.commit(record).await
    }

    /// Logically remove a node. Direct user edit, no confirmation gate.
    pub async fn tombstone(&mut self, target: NodeRef) -> Result<u64, StudioError> {
        let record = PatchRecord::new(
            self.log.next_seq(),
            PatchOrigin::Editor,
            PatchOp::Tombstone { target },
        );
        self.commit(record).await
    }

    /// Reorder one level of the document. Direct user edit.
    pub async fn reorder(&mut self, ordering: Reordering) -> Result<u64, StudioError> {
        let record = PatchRecord::new(
            self.log.next_seq(),
            PatchOrigin::Editor,
            PatchOp::Reorder { ordering },
        );
        self.commit(record).await
    }

    /// Render the live manuscript as markdown.
    pub fn export_markdown(&self) -> String {
        crate::export::manuscript_markdown(&self.project)
    }

    async fn gated_commit(
        &mut self,
        candidate: CandidatePatch,
        confirmer: &mut dyn Confirmer,
    ) -> Result<Option<u64>, StudioError> {
        if !confirmer.confirm(&candidate) {
            info!(op = %candidate.describe(), "candidate rejected; discarded");
            return Ok(None);
        }
        let seq = self.commit(candidate.record).await?;
        Ok(Some(seq))
    }
}
