//! Document state engine for AI-assisted long-form writing.
//!
//! This crate provides:
//! - A structured outline model with stable, never-reused identifiers
//! - An append-only patch log recording every content change
//! - Deterministic reconstruction of manuscript state from the log
//! - An interactive revision protocol gated on explicit confirmation
//! - Lorebook context injection under a token budget
//!
//! # Quick Start
//!
//! ```ignore
//! use quill_core::{ClaudeGenerator, StoryKind, Studio, StudioConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let generator = Arc::new(ClaudeGenerator::from_env()?);
//!     let config = StudioConfig::new("./projects");
//!
//!     let mut studio = Studio::create(
//!         generator,
//!         config,
//!         "a lighthouse keeper finds a door under the tide",
//!         StoryKind::Novel,
//!     )
//!     .await?;
//!
//!     let report = studio.draft_pending().await?;
//!     println!("drafted {} scenes", report.scenes_drafted);
//!     Ok(())
//! }
//! ```

pub mod author;
pub mod export;
pub mod generate;
pub mod log;
pub mod lorebook;
pub mod outline;
pub mod patch;
pub mod persist;
pub mod reconstruct;
pub mod session;
pub mod testing;

// Primary public API
pub use author::{AuthorConfig, CandidatePatch, OutlineConstraints, OutlineError, RevisionError};
pub use generate::{
    ClaudeGenerator, GenerateError, GenerationRequest, Generator, OperationKind, RetryPolicy,
};
pub use log::{PatchError, PatchLog};
pub use lorebook::{LoreEntry, Lorebook, SelectedEntry};
pub use outline::{
    Chapter, ChapterId, Character, Metadata, Paragraph, ParagraphId, Project, ProjectId, Scene,
    SceneId, StoryKind,
};
pub use patch::{
    MetadataField, NodeRef, ParagraphText, PatchOp, PatchOrigin, PatchRecord, Reordering,
};
pub use reconstruct::{apply, reconstruct, ApplyError};
pub use session::{Confirmer, DraftReport, Studio, StudioConfig, StudioError};
