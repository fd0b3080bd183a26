//! Cross-component tests for durability and replay.
//!
//! These drive the full stack (studio, log, persistence, reconstruction)
//! through the mock collaborator, and verify the crash-recovery and
//! identifier properties the engine guarantees.

use quill_core::persist::{read_patches, PATCHES_FILE};
use quill_core::testing::{AcceptAll, MockAuthor};
use quill_core::{
    reconstruct, NodeRef, ParagraphId, StoryKind, Studio, StudioConfig,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const OUTLINE: &str = r#"{
    "title": "Emberline",
    "synopsis": "A courier carries fire through a frozen pass.",
    "characters": [{"name": "Senna", "description": "The courier."}],
    "chapters": [
        {"summary": "Setting out", "scenes": [{"summary": "Leaving the lowlands"}]},
        {"summary": "The pass", "scenes": [{"summary": "First night"}]}
    ]
}"#;

async fn drafted_studio(base: &Path) -> Studio {
    let author = Arc::new(
        MockAuthor::new()
            .reply(OUTLINE)
            .reply("She left at dawn.\n\nThe road was empty.")
            .reply("Night came early in the pass."),
    );
    let mut studio = Studio::create(
        author,
        StudioConfig::new(base),
        "fire courier",
        StoryKind::Novel,
    )
    .await
    .expect("create");
    studio.draft_pending().await.expect("draft");
    studio
}

async fn resume(base: &Path, dir: &Path) -> Studio {
    Studio::resume(Arc::new(MockAuthor::new()), StudioConfig::new(base), dir)
        .await
        .expect("resume")
}

#[tokio::test]
async fn truncating_anywhere_in_last_record_recovers_prior_state() {
    let temp = TempDir::new().unwrap();
    let studio = drafted_studio(temp.path()).await;
    let dir = studio.dir().to_path_buf();

    let log_path = dir.join(PATCHES_FILE);
    let full = std::fs::read_to_string(&log_path).unwrap();

    // The state with only the first patch applied is the recovery target.
    let first_line_end = full.find('\n').unwrap() + 1;
    std::fs::write(&log_path, &full[..first_line_end]).unwrap();
    let reference = resume(temp.path(), &dir).await;
    let reference_json = serde_json::to_string(reference.project()).unwrap();

    // Cutting the file at every byte offset that loses part of the
    // second record's JSON must recover exactly that same state.
    for cut in first_line_end + 1..full.len() - 1 {
        std::fs::write(&log_path, &full[..cut]).unwrap();
        let recovered = resume(temp.path(), &dir).await;
        assert_eq!(
            serde_json::to_string(recovered.project()).unwrap(),
            reference_json,
            "divergence at byte offset {cut}"
        );
        assert_eq!(recovered.log().len(), 1);
    }

    // Losing only the trailing newline loses no record.
    std::fs::write(&log_path, &full[..full.len() - 1]).unwrap();
    let whole = resume(temp.path(), &dir).await;
    assert_eq!(whole.log().len(), 2);

    // The untouched file replays both records.
    std::fs::write(&log_path, &full).unwrap();
    let whole = resume(temp.path(), &dir).await;
    assert_eq!(whole.log().len(), 2);
}

#[tokio::test]
async fn reconstruction_matches_any_prefix_of_the_durable_log() {
    let temp = TempDir::new().unwrap();
    let studio = drafted_studio(temp.path()).await;
    let dir = studio.dir().to_path_buf();

    let readout = read_patches(&dir).await.expect("read");
    let outline = {
        let stored = quill_core::persist::StoredOutline::load(&dir).await.expect("load");
        stored.outline
    };

    for k in 0..=readout.records.len() {
        let project = reconstruct(&outline, &readout.records[..k]).expect("fold");
        let again = reconstruct(&outline, &readout.records[..k]).expect("fold");
        assert_eq!(
            serde_json::to_string(&project).unwrap(),
            serde_json::to_string(&again).unwrap()
        );
    }
}

#[tokio::test]
async fn rewrite_tombstones_old_ids_and_never_reuses_them() {
    let temp = TempDir::new().unwrap();
    let studio = drafted_studio(temp.path()).await;

    let scene = studio.project().chapters[0].scenes[0].id;
    let old_ids: Vec<ParagraphId> = studio.project().chapters[0].scenes[0]
        .paragraphs
        .iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(old_ids.len(), 2);

    // plan_rewrite runs against the studio's generator; queue its reply.
    let author = Arc::new(
        MockAuthor::new().reply("The opening, again.\n\nColder this time."),
    );
    let mut studio = Studio::resume(
        author,
        StudioConfig::new(temp.path()),
        studio.dir(),
    )
    .await
    .expect("resume");

    studio
        .rewrite(scene, Some("colder"), false, &mut AcceptAll)
        .await
        .expect("rewrite")
        .expect("committed");

    let project = studio.project();
    let (_, s) = project.scene(scene).unwrap();
    let new_ids: Vec<ParagraphId> = s.paragraphs.iter().map(|p| p.id).collect();

    // New prose carries new ids; none of the old ids survive in the live view.
    assert_eq!(new_ids.len(), 2);
    for old in &old_ids {
        assert!(!new_ids.contains(old));
        assert!(project.paragraph(*old).is_none());
        // But the old prose is still in the audit trail.
        assert!(project.retired_paragraph(*old).is_some());
        assert!(project.paragraph_id_known(*old));
    }

    // Raw log history still contains the original content.
    let replayed = resume(temp.path(), studio.dir()).await;
    let raw: Vec<String> = replayed
        .log()
        .records()
        .iter()
        .flat_map(|r| r.op.declared_paragraphs())
        .map(|p| p.content.clone())
        .collect();
    assert!(raw.iter().any(|c| c == "She left at dawn."));
}

#[tokio::test]
async fn tombstoned_scene_ids_stay_reserved_for_all_edit_sequences() {
    let temp = TempDir::new().unwrap();
    let mut studio = drafted_studio(temp.path()).await;

    let scene = studio.project().chapters[1].scenes[0].id;
    studio
        .tombstone(NodeRef::Scene(scene))
        .await
        .expect("tombstone");
    assert!(!studio.project().scene_is_live(scene));

    // The scene's id and its paragraph ids are still known to the model;
    // counters never back up over them.
    let highest_paragraph = studio
        .project()
        .chapters
        .iter()
        .flat_map(|c| c.scenes.iter())
        .flat_map(|s| s.paragraphs.iter())
        .map(|p| p.id.0)
        .max()
        .unwrap();
    assert!(studio.project().counters.peek_paragraph().0 > highest_paragraph);

    // An expansion of a live scene after the tombstone gets fresh ids.
    let author = Arc::new(MockAuthor::new().reply("More dawn light."));
    let mut studio = Studio::resume(author, StudioConfig::new(temp.path()), studio.dir())
        .await
        .expect("resume");
    let live_scene = studio.project().chapters[0].scenes[0].id;
    studio
        .expand(live_scene, 2000, &mut AcceptAll)
        .await
        .expect("expand")
        .expect("committed");

    let all_ids: Vec<u64> = studio
        .project()
        .chapters
        .iter()
        .flat_map(|c| c.scenes.iter())
        .flat_map(|s| s.paragraphs.iter())
        .map(|p| p.id.0)
        .chain(studio.project().retired.iter().map(|r| r.paragraph.id.0))
        .collect();
    let distinct: std::collections::HashSet<_> = all_ids.iter().collect();
    assert_eq!(distinct.len(), all_ids.len(), "a paragraph id was reused");
}
