//! State reconstruction: the fold from outline plus patches to the
//! current document model.
//!
//! `reconstruct` is pure and deterministic: the same outline and patch
//! prefix always yield the same project. Resume is nothing more than
//! replaying the longest valid prefix of the durable log over the stored
//! outline. `apply` is the single-step version used both here and by the
//! session when committing a freshly confirmed patch to its cached model.

use crate::outline::{Paragraph, Project, RetiredParagraph};
use crate::patch::{
    MetadataField, NodeRef, ParagraphText, PatchOp, PatchRecord, Reordering,
};
use thiserror::Error;

/// Errors surfaced while folding patches into a project.
///
/// Under correct operation none of these occur: appends are validated
/// against the live model before they reach the log. Seeing one during
/// replay means the log was edited by hand or a writer bypassed the
/// guard.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("patch {seq} has out-of-sequence number (expected {expected})")]
    SequenceGap { seq: u64, expected: u64 },

    #[error("patch {seq} targets unknown node {target}")]
    UnknownTarget { seq: u64, target: NodeRef },

    #[error("patch {seq} targets tombstoned node {target}")]
    TombstonedTarget { seq: u64, target: NodeRef },

    #[error("patch {seq} reuses paragraph identifier {id}")]
    IdentifierCollision { seq: u64, id: crate::outline::ParagraphId },

    #[error("patch {seq} reorder list is not a permutation of the live ids")]
    InvalidReorder { seq: u64 },

    #[error("patch {seq} carries an empty payload")]
    EmptyPayload { seq: u64 },
}

/// Fold the initial outline and a patch sequence into the current model.
pub fn reconstruct(outline: &Project, patches: &[PatchRecord]) -> Result<Project, ApplyError> {
    let mut project = outline.clone();
    let mut expected = 1u64;
    for record in patches {
        if record.seq != expected {
            return Err(ApplyError::SequenceGap {
                seq: record.seq,
                expected,
            });
        }
        apply(&mut project, record)?;
        expected += 1;
    }
    Ok(project)
}

/// Apply a single patch to the accumulating model.
pub fn apply(project: &mut Project, record: &PatchRecord) -> Result<(), ApplyError> {
    let seq = record.seq;
    match &record.op {
        PatchOp::WriteContent { scene, paragraphs }
        | PatchOp::Expand { scene, paragraphs } => {
            if paragraphs.is_empty() {
                return Err(ApplyError::EmptyPayload { seq });
            }
            check_scene_live(project, seq, *scene)?;
            upsert_paragraphs(project, seq, *scene, paragraphs)?;
        }

        PatchOp::ReplaceContent {
            scene,
            retire,
            paragraphs,
        } => {
            if paragraphs.is_empty() {
                return Err(ApplyError::EmptyPayload { seq });
            }
            check_scene_live(project, seq, *scene)?;
            retire_paragraphs(project, seq, *scene, retire)?;
            upsert_paragraphs(project, seq, *scene, paragraphs)?;
        }

        PatchOp::Reorder { ordering } => apply_reorder(project, seq, ordering)?,

        PatchOp::MetadataAmend { field, value } => match field {
            MetadataField::Title => project.metadata.title = value.clone(),
            MetadataField::Synopsis => project.metadata.synopsis = value.clone(),
        },

        PatchOp::Tombstone { target } => apply_tombstone(project, seq, *target)?,
    }
    Ok(())
}

fn check_scene_live(
    project: &Project,
    seq: u64,
    scene: crate::outline::SceneId,
) -> Result<(), ApplyError> {
    let target = NodeRef::Scene(scene);
    match project.scene(scene) {
        None => Err(ApplyError::UnknownTarget { seq, target }),
        Some((chapter, s)) if chapter.tombstoned || s.tombstoned => {
            Err(ApplyError::TombstonedTarget { seq, target })
        }
        Some(_) => Ok(()),
    }
}

fn upsert_paragraphs(
    project: &mut Project,
    seq: u64,
    scene: crate::outline::SceneId,
    paragraphs: &[ParagraphText],
) -> Result<(), ApplyError> {
    for text in paragraphs {
        let exists_here = project
            .scene(scene)
            .and_then(|(_, s)| s.paragraph(text.id))
            .is_some();

        if exists_here {
            // Rewrite in place; provenance moves to this patch.
            let s = project.scene_mut(scene).expect("scene checked live");
            let paragraph = s.paragraph_mut(text.id).expect("paragraph present");
            paragraph.content = text.content.clone();
            paragraph.written_by = seq;
        } else {
            if project.paragraph_id_known(text.id) {
                return Err(ApplyError::IdentifierCollision { seq, id: text.id });
            }
            let s = project.scene_mut(scene).expect("scene checked live");
            s.paragraphs.push(Paragraph {
                id: text.id,
                content: text.content.clone(),
                written_by: seq,
            });
            project.counters.reserve_paragraph(text.id);
        }
    }
    Ok(())
}

fn retire_paragraphs(
    project: &mut Project,
    seq: u64,
    scene: crate::outline::SceneId,
    retire: &[crate::outline::ParagraphId],
) -> Result<(), ApplyError> {
    for &id in retire {
        let s = project.scene_mut(scene).expect("scene checked live");
        let position = s.paragraphs.iter().position(|p| p.id == id);
        let Some(position) = position else {
            return Err(ApplyError::UnknownTarget {
                seq,
                target: NodeRef::Paragraph(id),
            });
        };
        let paragraph = s.paragraphs.remove(position);
        project.retired.push(RetiredParagraph {
            paragraph,
            scene,
            retired_by: seq,
        });
    }
    Ok(())
}

fn apply_reorder(
    project: &mut Project,
    seq: u64,
    ordering: &Reordering,
) -> Result<(), ApplyError> {
    match ordering {
        Reordering::Chapters { order } => {
            let live: Vec<_> = project
                .chapters
                .iter()
                .filter(|c| !c.tombstoned)
                .map(|c| c.id)
                .collect();
            if !is_permutation(order, &live) {
                return Err(ApplyError::InvalidReorder { seq });
            }
            // Tombstoned chapters sort after the live ones, their
            // relative order preserved.
            project.chapters.sort_by_key(|c| {
                order
                    .iter()
                    .position(|&id| id == c.id)
                    .unwrap_or(order.len())
            });
        }
        Reordering::Scenes { chapter, order } => {
            let Some(ch) = project.chapter(*chapter) else {
                return Err(ApplyError::UnknownTarget {
                    seq,
                    target: NodeRef::Chapter(*chapter),
                });
            };
            if ch.tombstoned {
                return Err(ApplyError::TombstonedTarget {
                    seq,
                    target: NodeRef::Chapter(*chapter),
                });
            }
            let live: Vec<_> = ch.live_scenes().map(|s| s.id).collect();
            if !is_permutation(order, &live) {
                return Err(ApplyError::InvalidReorder { seq });
            }
            let ch = project.chapter_mut(*chapter).expect("chapter present");
            ch.scenes.sort_by_key(|s| {
                order
                    .iter()
                    .position(|&id| id == s.id)
                    .unwrap_or(order.len())
            });
        }
        Reordering::Paragraphs { scene, order } => {
            check_scene_live(project, seq, *scene)?;
            let (_, s) = project.scene(*scene).expect("scene checked live");
            let live: Vec<_> = s.paragraphs.iter().map(|p| p.id).collect();
            if !is_permutation(order, &live) {
                return Err(ApplyError::InvalidReorder { seq });
            }
            let s = project.scene_mut(*scene).expect("scene checked live");
            s.paragraphs.sort_by_key(|p| {
                order
                    .iter()
                    .position(|&id| id == p.id)
                    .unwrap_or(order.len())
            });
        }
    }
    Ok(())
}

fn apply_tombstone(project: &mut Project, seq: u64, target: NodeRef) -> Result<(), ApplyError> {
    match target {
        NodeRef::Chapter(id) => {
            let Some(chapter) = project.chapter_mut(id) else {
                return Err(ApplyError::UnknownTarget { seq, target });
            };
            if chapter.tombstoned {
                return Err(ApplyError::TombstonedTarget { seq, target });
            }
            chapter.tombstoned = true;
        }
        NodeRef::Scene(id) => {
            let Some(scene) = project.scene_mut(id) else {
                return Err(ApplyError::UnknownTarget { seq, target });
            };
            if scene.tombstoned {
                return Err(ApplyError::TombstonedTarget { seq, target });
            }
            scene.tombstoned = true;
        }
        NodeRef::Paragraph(id) => {
            let Some(scene_id) = project
                .chapters
                .iter()
                .flat_map(|c| c.scenes.iter())
                .find(|s| s.paragraph(id).is_some())
                .map(|s| s.id)
            else {
                return Err(ApplyError::UnknownTarget { seq, target });
            };
            retire_paragraphs(project, seq, scene_id, &[id])?;
        }
    }
    Ok(())
}

fn is_permutation<T: PartialEq + Copy>(order: &[T], live: &[T]) -> bool {
    order.len() == live.len()
        && live.iter().all(|id| order.contains(id))
        && order.iter().all(|id| live.contains(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outline::{
        Chapter, Character, Metadata, ParagraphId, Scene, SceneId, StoryKind,
    };
    use crate::patch::{ParagraphText, PatchOrigin};

    /// Two chapters, one scene each, no prose.
    fn two_chapter_outline() -> Project {
        let metadata = Metadata {
            title: "Tidewater".to_string(),
            synopsis: "A town drowns slowly.".to_string(),
            idea: "a drowning town".to_string(),
            kind: StoryKind::Novel,
        };
        let mut project = Project::new(
            metadata,
            vec![Character {
                name: "Maren".to_string(),
                description: "The last ferry pilot.".to_string(),
            }],
        );
        for summary in ["The water rises", "The evacuation"] {
            let ch = project.counters.alloc_chapter();
            let mut chapter = Chapter::new(ch, summary);
            let sc = project.counters.alloc_scene();
            chapter.scenes.push(Scene::new(sc, format!("{summary}, opening")));
            project.chapters.push(chapter);
        }
        project
    }

    fn write(seq: u64, scene: SceneId, ids: &[u64]) -> PatchRecord {
        PatchRecord::new(
            seq,
            PatchOrigin::Drafting,
            PatchOp::WriteContent {
                scene,
                paragraphs: ids
                    .iter()
                    .map(|&id| ParagraphText {
                        id: ParagraphId(id),
                        content: format!("Paragraph {id}."),
                    })
                    .collect(),
            },
        )
    }

    #[test]
    fn test_fold_is_deterministic() {
        let outline = two_chapter_outline();
        let patches = vec![
            write(1, SceneId(1), &[1, 2]),
            write(2, SceneId(1), &[3, 4]),
            write(3, SceneId(2), &[5]),
        ];
        let a = reconstruct(&outline, &patches).unwrap();
        let b = reconstruct(&outline, &patches).unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_every_prefix_is_valid() {
        let outline = two_chapter_outline();
        let patches = vec![
            write(1, SceneId(1), &[1, 2]),
            write(2, SceneId(1), &[3, 4]),
            write(3, SceneId(2), &[5]),
        ];
        for k in 0..=patches.len() {
            let project = reconstruct(&outline, &patches[..k]).unwrap();
            let expected: usize = patches[..k]
                .iter()
                .map(|p| p.op.declared_paragraphs().len())
                .sum();
            let total: usize = project
                .chapters
                .iter()
                .flat_map(|c| c.scenes.iter())
                .map(|s| s.paragraphs.len())
                .sum();
            assert_eq!(total, expected);
        }
    }

    #[test]
    fn test_three_writes_yield_six_paragraphs_in_order() {
        let outline = two_chapter_outline();
        let patches = vec![
            write(1, SceneId(1), &[1, 2]),
            write(2, SceneId(1), &[3, 4]),
            write(3, SceneId(1), &[5, 6]),
        ];
        let project = reconstruct(&outline, &patches).unwrap();

        let (_, scene) = project.scene(SceneId(1)).unwrap();
        let ids: Vec<_> = scene.paragraphs.iter().map(|p| p.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);

        let distinct: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(distinct.len(), 6);

        let (_, other) = project.scene(SceneId(2)).unwrap();
        assert!(other.is_empty());
    }

    #[test]
    fn test_write_upserts_existing_id() {
        let outline = two_chapter_outline();
        let patches = vec![
            write(1, SceneId(1), &[1]),
            PatchRecord::new(
                2,
                PatchOrigin::Editor,
                PatchOp::WriteContent {
                    scene: SceneId(1),
                    paragraphs: vec![ParagraphText {
                        id: ParagraphId(1),
                        content: "Rewritten.".to_string(),
                    }],
                },
            ),
        ];
        let project = reconstruct(&outline, &patches).unwrap();
        let paragraph = project.paragraph(ParagraphId(1)).unwrap();
        assert_eq!(paragraph.content, "Rewritten.");
        assert_eq!(paragraph.written_by, 2);
    }

    #[test]
    fn test_replace_retires_old_ids() {
        let outline = two_chapter_outline();
        let patches = vec![
            write(1, SceneId(1), &[1, 2]),
            PatchRecord::new(
                2,
                PatchOrigin::Rewrite,
                PatchOp::ReplaceContent {
                    scene: SceneId(1),
                    retire: vec![ParagraphId(1), ParagraphId(2)],
                    paragraphs: vec![ParagraphText {
                        id: ParagraphId(3),
                        content: "The new opening.".to_string(),
                    }],
                },
            ),
        ];
        let project = reconstruct(&outline, &patches).unwrap();

        let (_, scene) = project.scene(SceneId(1)).unwrap();
        let ids: Vec<_> = scene.paragraphs.iter().map(|p| p.id.0).collect();
        assert_eq!(ids, vec![3]);

        // Old content is out of the live view but kept for audit.
        assert!(project.paragraph(ParagraphId(1)).is_none());
        let retired = project.retired_paragraph(ParagraphId(1)).unwrap();
        assert_eq!(retired.retired_by, 2);
        assert_eq!(retired.paragraph.content, "Paragraph 1.");

        // The retired ids remain reserved.
        assert!(project.paragraph_id_known(ParagraphId(1)));
        assert!(project.counters.peek_paragraph().0 > 3);
    }

    #[test]
    fn test_identifier_reuse_is_a_collision() {
        let outline = two_chapter_outline();
        let patches = vec![
            write(1, SceneId(1), &[1]),
            PatchRecord::new(
                2,
                PatchOrigin::Rewrite,
                PatchOp::ReplaceContent {
                    scene: SceneId(1),
                    retire: vec![ParagraphId(1)],
                    paragraphs: vec![ParagraphText {
                        id: ParagraphId(2),
                        content: "Replacement.".to_string(),
                    }],
                },
            ),
            // Tries to resurrect the retired id 1 in the other scene.
            write(3, SceneId(2), &[1]),
        ];
        let err = reconstruct(&outline, &patches).unwrap_err();
        assert!(matches!(err, ApplyError::IdentifierCollision { seq: 3, .. }));
    }

    #[test]
    fn test_tombstoned_scene_rejects_content() {
        let outline = two_chapter_outline();
        let patches = vec![
            PatchRecord::new(
                1,
                PatchOrigin::Editor,
                PatchOp::Tombstone {
                    target: NodeRef::Scene(SceneId(1)),
                },
            ),
            write(2, SceneId(1), &[1]),
        ];
        let err = reconstruct(&outline, &patches).unwrap_err();
        assert!(matches!(err, ApplyError::TombstonedTarget { seq: 2, .. }));
    }

    #[test]
    fn test_reorder_chapters() {
        let outline = two_chapter_outline();
        let patches = vec![PatchRecord::new(
            1,
            PatchOrigin::Editor,
            PatchOp::Reorder {
                ordering: Reordering::Chapters {
                    order: vec![crate::outline::ChapterId(2), crate::outline::ChapterId(1)],
                },
            },
        )];
        let project = reconstruct(&outline, &patches).unwrap();
        let order: Vec<_> = project.chapters.iter().map(|c| c.id.0).collect();
        assert_eq!(order, vec![2, 1]);
    }

    #[test]
    fn test_reorder_must_be_permutation() {
        let outline = two_chapter_outline();
        let patches = vec![PatchRecord::new(
            1,
            PatchOrigin::Editor,
            PatchOp::Reorder {
                ordering: Reordering::Chapters {
                    order: vec![crate::outline::ChapterId(1)],
                },
            },
        )];
        let err = reconstruct(&outline, &patches).unwrap_err();
        assert!(matches!(err, ApplyError::InvalidReorder { seq: 1 }));
    }

    #[test]
    fn test_metadata_amend() {
        let outline = two_chapter_outline();
        let patches = vec![PatchRecord::new(
            1,
            PatchOrigin::Editor,
            PatchOp::MetadataAmend {
                field: MetadataField::Title,
                value: "Saltwater".to_string(),
            },
        )];
        let project = reconstruct(&outline, &patches).unwrap();
        assert_eq!(project.metadata.title, "Saltwater");
        // The outline itself is untouched.
        assert_eq!(outline.metadata.title, "Tidewater");
    }

    #[test]
    fn test_sequence_gap_detected() {
        let outline = two_chapter_outline();
        let patches = vec![write(2, SceneId(1), &[1])];
        let err = reconstruct(&outline, &patches).unwrap_err();
        assert!(matches!(err, ApplyError::SequenceGap { seq: 2, expected: 1 }));
    }
}
