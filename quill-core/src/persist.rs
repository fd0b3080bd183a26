//! Durable project storage.
//!
//! A project on disk is one directory holding exactly two kinds of
//! record: a versioned `outline.json` written once at creation, and
//! `patches.jsonl`, an append-only file with one independently
//! parseable patch record per line. A crash can leave at most a
//! truncated final line; loading always recovers the longest valid
//! prefix and reports what it discarded.

use crate::outline::{Project, StoryKind};
use crate::patch::{unix_timestamp, PatchRecord};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Current outline file version.
const OUTLINE_VERSION: u32 = 1;

/// File names inside a project directory.
pub const OUTLINE_FILE: &str = "outline.json";
pub const PATCHES_FILE: &str = "patches.jsonl";
pub const LOREBOOK_FILE: &str = "lorebook.json";

/// The outline record: the immutable starting point of every
/// reconstruction, written once when the project is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredOutline {
    /// File format version for compatibility checking.
    pub version: u32,

    /// When the project was created (unix seconds).
    pub created_at: String,

    /// Quick-access card (duplicated for peek access).
    pub card: ProjectCard,

    /// The full outline skeleton.
    pub outline: Project,
}

/// Summary of a project for listings, readable without parsing the
/// whole outline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectCard {
    pub title: String,
    pub slug: String,
    pub kind: StoryKind,
    pub chapters: usize,
    pub scenes: usize,
    #[serde(default)]
    pub created_at: String,
}

impl StoredOutline {
    /// Wrap a freshly created outline for storage.
    pub fn new(outline: Project) -> Self {
        let created_at = unix_timestamp();
        let card = ProjectCard {
            title: outline.metadata.title.clone(),
            slug: outline.slug.clone(),
            kind: outline.metadata.kind,
            chapters: outline.chapters.len(),
            scenes: outline.chapters.iter().map(|c| c.scenes.len()).sum(),
            created_at: created_at.clone(),
        };
        Self {
            version: OUTLINE_VERSION,
            created_at,
            card,
            outline,
        }
    }

    /// Write to `outline.json` inside the project directory.
    pub async fn save(&self, dir: impl AsRef<Path>) -> Result<(), PersistError> {
        fs::create_dir_all(dir.as_ref()).await?;
        let content = serde_json::to_string_pretty(self)?;
        fs::write(dir.as_ref().join(OUTLINE_FILE), content).await?;
        Ok(())
    }

    /// Load from a project directory.
    pub async fn load(dir: impl AsRef<Path>) -> Result<Self, PersistError> {
        let content = fs::read_to_string(dir.as_ref().join(OUTLINE_FILE)).await?;
        let stored: Self = serde_json::from_str(&content)?;

        if stored.version != OUTLINE_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: OUTLINE_VERSION,
                found: stored.version,
            });
        }

        Ok(stored)
    }

    /// Read just the card without parsing the full outline.
    pub async fn peek_card(dir: impl AsRef<Path>) -> Result<ProjectCard, PersistError> {
        let content = fs::read_to_string(dir.as_ref().join(OUTLINE_FILE)).await?;

        #[derive(Deserialize)]
        struct Partial {
            version: u32,
            card: ProjectCard,
        }

        let partial: Partial = serde_json::from_str(&content)?;

        if partial.version != OUTLINE_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: OUTLINE_VERSION,
                found: partial.version,
            });
        }

        Ok(partial.card)
    }
}

/// Durably append one patch record to the project's log file.
///
/// The record is written as a single JSON line and synced before the
/// append is acknowledged; an acknowledged append survives restart.
pub async fn append_patch(
    dir: impl AsRef<Path>,
    record: &PatchRecord,
) -> Result<(), PersistError> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.as_ref().join(PATCHES_FILE))
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.sync_data().await?;
    Ok(())
}

/// Result of reading a patch log from disk.
#[derive(Debug)]
pub struct LogReadout {
    /// The longest valid prefix: ordered, gapless from 1.
    pub records: Vec<PatchRecord>,

    /// Lines discarded after the valid prefix ended (0 on a clean log).
    pub discarded: usize,
}

/// Read the ordered patch sequence, tolerating a truncated or corrupt
/// tail. The valid prefix ends at the first line that fails to parse or
/// breaks the gapless sequence; everything after it is discarded and
/// logged, never silently included.
pub async fn read_patches(dir: impl AsRef<Path>) -> Result<LogReadout, PersistError> {
    let path = dir.as_ref().join(PATCHES_FILE);
    let content = match fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(LogReadout {
                records: Vec::new(),
                discarded: 0,
            });
        }
        Err(e) => return Err(e.into()),
    };

    let mut records: Vec<PatchRecord> = Vec::new();
    let mut discarded = 0usize;
    let mut prefix_ended = false;

    for line in content.lines() {
        if prefix_ended {
            discarded += 1;
            continue;
        }
        if line.trim().is_empty() {
            prefix_ended = true;
            discarded += 1;
            continue;
        }
        match serde_json::from_str::<PatchRecord>(line) {
            Ok(record) if record.seq == records.len() as u64 + 1 => {
                records.push(record);
            }
            Ok(record) => {
                warn!(
                    seq = record.seq,
                    expected = records.len() as u64 + 1,
                    "patch log sequence break; truncating to valid prefix"
                );
                prefix_ended = true;
                discarded += 1;
            }
            Err(e) => {
                warn!(
                    line = records.len() + discarded + 1,
                    error = %e,
                    "corrupt patch record; truncating to valid prefix"
                );
                prefix_ended = true;
                discarded += 1;
            }
        }
    }

    if discarded > 0 {
        warn!(
            kept = records.len(),
            discarded, "patch log recovered with records discarded"
        );
    }

    Ok(LogReadout { records, discarded })
}

/// A project directory found under the base directory.
#[derive(Debug, Clone)]
pub struct ProjectEntry {
    pub path: PathBuf,
    pub card: ProjectCard,
}

/// List all project directories under a base directory.
pub async fn list_projects(base: impl AsRef<Path>) -> Result<Vec<ProjectEntry>, PersistError> {
    let mut projects = Vec::new();

    let base = base.as_ref();
    if !base.exists() {
        fs::create_dir_all(base).await?;
        return Ok(projects);
    }

    let mut entries = fs::read_dir(base).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        if let Ok(card) = StoredOutline::peek_card(&path).await {
            projects.push(ProjectEntry { path, card });
        }
    }

    projects.sort_by(|a, b| a.card.slug.cmp(&b.card.slug));
    Ok(projects)
}

/// The directory a project lives in.
pub fn project_dir(base: impl AsRef<Path>, project: &Project) -> PathBuf {
    base.as_ref().join(project.dir_name())
}

/// Find a project directory by slug prefix (for CLI ergonomics).
pub async fn find_project(
    base: impl AsRef<Path>,
    needle: &str,
) -> Result<Option<ProjectEntry>, PersistError> {
    let projects = list_projects(base).await?;
    Ok(projects.into_iter().find(|p| {
        p.card.slug.starts_with(needle)
            || p.path
                .file_name()
                .map(|n| n.to_string_lossy().starts_with(needle))
                .unwrap_or(false)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outline::{Chapter, Metadata, Scene};
    use crate::patch::{ParagraphText, PatchOp, PatchOrigin};
    use tempfile::TempDir;

    fn small_outline() -> Project {
        let metadata = Metadata {
            title: "Driftwood".to_string(),
            synopsis: "Letters wash ashore from a ship that never sailed.".to_string(),
            idea: "impossible letters".to_string(),
            kind: StoryKind::ShortStory,
        };
        let mut project = Project::new(metadata, vec![]);
        let ch = project.counters.alloc_chapter();
        let mut chapter = Chapter::new(ch, "The first letter");
        let sc = project.counters.alloc_scene();
        chapter.scenes.push(Scene::new(sc, "Finding the bottle"));
        project.chapters.push(chapter);
        project
    }

    fn record(seq: u64) -> PatchRecord {
        PatchRecord::new(
            seq,
            PatchOrigin::Drafting,
            PatchOp::WriteContent {
                scene: crate::outline::SceneId(1),
                paragraphs: vec![ParagraphText {
                    id: crate::outline::ParagraphId(seq),
                    content: format!("Paragraph {seq}."),
                }],
            },
        )
    }

    #[tokio::test]
    async fn test_outline_save_load_roundtrip() {
        let temp = TempDir::new().expect("temp dir");
        let dir = temp.path().join("driftwood");

        let stored = StoredOutline::new(small_outline());
        stored.save(&dir).await.expect("save");

        let loaded = StoredOutline::load(&dir).await.expect("load");
        assert_eq!(loaded.version, OUTLINE_VERSION);
        assert_eq!(loaded.outline.metadata.title, "Driftwood");
        assert_eq!(loaded.card.chapters, 1);
        assert_eq!(loaded.card.scenes, 1);
    }

    #[tokio::test]
    async fn test_peek_card() {
        let temp = TempDir::new().expect("temp dir");
        let dir = temp.path().join("driftwood");

        StoredOutline::new(small_outline())
            .save(&dir)
            .await
            .expect("save");

        let card = StoredOutline::peek_card(&dir).await.expect("peek");
        assert_eq!(card.title, "Driftwood");
        assert_eq!(card.slug, "driftwood");
    }

    #[tokio::test]
    async fn test_append_and_read_patches() {
        let temp = TempDir::new().expect("temp dir");
        let dir = temp.path().to_path_buf();

        for seq in 1..=3 {
            append_patch(&dir, &record(seq)).await.expect("append");
        }

        let readout = read_patches(&dir).await.expect("read");
        assert_eq!(readout.records.len(), 3);
        assert_eq!(readout.discarded, 0);
        assert_eq!(readout.records[2].seq, 3);
    }

    #[tokio::test]
    async fn test_missing_log_reads_empty() {
        let temp = TempDir::new().expect("temp dir");
        let readout = read_patches(temp.path()).await.expect("read");
        assert!(readout.records.is_empty());
        assert_eq!(readout.discarded, 0);
    }

    #[tokio::test]
    async fn test_truncated_final_line_discarded() {
        let temp = TempDir::new().expect("temp dir");
        let dir = temp.path().to_path_buf();

        for seq in 1..=2 {
            append_patch(&dir, &record(seq)).await.expect("append");
        }
        // Simulate a crash mid-write of the third record.
        let full = serde_json::to_string(&record(3)).unwrap();
        let truncated = &full[..full.len() / 2];
        let mut content = fs::read_to_string(dir.join(PATCHES_FILE)).await.unwrap();
        content.push_str(truncated);
        fs::write(dir.join(PATCHES_FILE), content).await.unwrap();

        let readout = read_patches(&dir).await.expect("read");
        assert_eq!(readout.records.len(), 2);
        assert_eq!(readout.discarded, 1);
    }

    #[tokio::test]
    async fn test_sequence_break_ends_prefix() {
        let temp = TempDir::new().expect("temp dir");
        let dir = temp.path().to_path_buf();

        append_patch(&dir, &record(1)).await.expect("append");
        // A hand-edited log with a gap: record 3 follows record 1.
        append_patch(&dir, &record(3)).await.expect("append");
        append_patch(&dir, &record(4)).await.expect("append");

        let readout = read_patches(&dir).await.expect("read");
        assert_eq!(readout.records.len(), 1);
        assert_eq!(readout.discarded, 2);
    }

    #[tokio::test]
    async fn test_list_projects() {
        let temp = TempDir::new().expect("temp dir");
        let base = temp.path().join("projects");

        for title in ["Ashfall", "Breakwater"] {
            let mut outline = small_outline();
            outline.metadata.title = title.to_string();
            outline.slug = crate::outline::slugify(title);
            let dir = project_dir(&base, &outline);
            StoredOutline::new(outline).save(&dir).await.expect("save");
        }

        let projects = list_projects(&base).await.expect("list");
        assert_eq!(projects.len(), 2);
        let slugs: Vec<_> = projects.iter().map(|p| p.card.slug.as_str()).collect();
        assert_eq!(slugs, vec!["ashfall", "breakwater"]);
    }

    #[tokio::test]
    async fn test_list_projects_creates_missing_base() {
        let temp = TempDir::new().expect("temp dir");
        let base = temp.path().join("nothing_here");

        let projects = list_projects(&base).await.expect("list");
        assert!(projects.is_empty());
        assert!(base.exists());
    }

    #[tokio::test]
    async fn test_find_project_by_prefix() {
        let temp = TempDir::new().expect("temp dir");
        let base = temp.path().join("projects");

        let outline = small_outline();
        let dir = project_dir(&base, &outline);
        StoredOutline::new(outline).save(&dir).await.expect("save");

        let found = find_project(&base, "drift").await.expect("find");
        assert!(found.is_some());
        let missing = find_project(&base, "granite").await.expect("find");
        assert!(missing.is_none());
    }
}
