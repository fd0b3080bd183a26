//! Immutable patch records.
//!
//! Every incremental change to a manuscript is a patch: an ordered,
//! append-only record carrying its own sequence number, target references,
//! operation, and payload. A correction is always a new patch; records
//! are never mutated after they are appended.

use crate::outline::{ChapterId, ParagraphId, SceneId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A reference to a document node targeted by a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRef {
    Chapter(ChapterId),
    Scene(SceneId),
    Paragraph(ParagraphId),
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRef::Chapter(id) => write!(f, "{id}"),
            NodeRef::Scene(id) => write!(f, "{id}"),
            NodeRef::Paragraph(id) => write!(f, "{id}"),
        }
    }
}

/// New paragraph content keyed by paragraph id, in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParagraphText {
    pub id: ParagraphId,
    pub content: String,
}

/// Metadata fields that a patch may amend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataField {
    Title,
    Synopsis,
}

/// Ordering payload for a reorder patch. The list must be a permutation
/// of the live ids at that level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reordering {
    Chapters { order: Vec<ChapterId> },
    Scenes { chapter: ChapterId, order: Vec<SceneId> },
    Paragraphs { scene: SceneId, order: Vec<ParagraphId> },
}

/// The operation a patch performs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatchOp {
    /// Write prose into a scene: upsert by paragraph id, appending newly
    /// declared ids in payload order.
    WriteContent {
        scene: SceneId,
        paragraphs: Vec<ParagraphText>,
    },

    /// Append additional prose after a scene's existing paragraphs.
    /// Existing paragraph ids are never touched.
    Expand {
        scene: SceneId,
        paragraphs: Vec<ParagraphText>,
    },

    /// Replace a scene's prose: the retired ids are tombstoned (never
    /// reused) and the replacement paragraphs get fresh ids.
    ReplaceContent {
        scene: SceneId,
        retire: Vec<ParagraphId>,
        paragraphs: Vec<ParagraphText>,
    },

    /// Change ordering at one level without touching content.
    Reorder { ordering: Reordering },

    /// Overwrite a single metadata field.
    MetadataAmend { field: MetadataField, value: String },

    /// Mark a node as logically removed. Its identifier stays reserved
    /// and its content stays retrievable for audit.
    Tombstone { target: NodeRef },
}

impl PatchOp {
    /// Ids of paragraphs this operation declares as new.
    pub fn declared_paragraphs(&self) -> &[ParagraphText] {
        match self {
            PatchOp::WriteContent { paragraphs, .. }
            | PatchOp::Expand { paragraphs, .. }
            | PatchOp::ReplaceContent { paragraphs, .. } => paragraphs,
            _ => &[],
        }
    }

    /// The scene a content operation targets, if any.
    pub fn target_scene(&self) -> Option<SceneId> {
        match self {
            PatchOp::WriteContent { scene, .. }
            | PatchOp::Expand { scene, .. }
            | PatchOp::ReplaceContent { scene, .. } => Some(*scene),
            _ => None,
        }
    }
}

/// Which part of the system produced a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchOrigin {
    /// Phase-2 batch drafting.
    Drafting,
    /// Interactive expand tool.
    Expand,
    /// Interactive rewrite-with-instructions tool.
    Rewrite,
    /// Interactive fresh-rewrite tool.
    FreshRewrite,
    /// Direct user edit through the editor surface.
    Editor,
}

impl PatchOrigin {
    pub fn name(&self) -> &'static str {
        match self {
            PatchOrigin::Drafting => "drafting",
            PatchOrigin::Expand => "expand",
            PatchOrigin::Rewrite => "rewrite",
            PatchOrigin::FreshRewrite => "fresh rewrite",
            PatchOrigin::Editor => "editor",
        }
    }
}

impl fmt::Display for PatchOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One entry in the patch log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchRecord {
    /// Strictly increasing, gapless from 1.
    pub seq: u64,

    /// Unix seconds at creation.
    pub timestamp: String,

    /// Which phase or tool produced this patch.
    pub origin: PatchOrigin,

    pub op: PatchOp,
}

impl PatchRecord {
    pub fn new(seq: u64, origin: PatchOrigin, op: PatchOp) -> Self {
        Self {
            seq,
            timestamp: unix_timestamp(),
            origin,
            op,
        }
    }

    /// One-line description for confirmation prompts and status output.
    pub fn describe(&self) -> String {
        match &self.op {
            PatchOp::WriteContent { scene, paragraphs } => {
                format!("write {} paragraph(s) into {scene}", paragraphs.len())
            }
            PatchOp::Expand { scene, paragraphs } => {
                format!("append {} paragraph(s) to {scene}", paragraphs.len())
            }
            PatchOp::ReplaceContent {
                scene,
                retire,
                paragraphs,
            } => format!(
                "replace {} paragraph(s) in {scene} with {} new",
                retire.len(),
                paragraphs.len()
            ),
            PatchOp::Reorder { ordering } => match ordering {
                Reordering::Chapters { .. } => "reorder chapters".to_string(),
                Reordering::Scenes { chapter, .. } => format!("reorder scenes in {chapter}"),
                Reordering::Paragraphs { scene, .. } => {
                    format!("reorder paragraphs in {scene}")
                }
            },
            PatchOp::MetadataAmend { field, .. } => {
                format!("amend metadata field {field:?}")
            }
            PatchOp::Tombstone { target } => format!("remove {target}"),
        }
    }
}

/// Current time as unix seconds.
pub(crate) fn unix_timestamp() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}", now.as_secs())
}
