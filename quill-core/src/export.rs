//! Manuscript export.
//!
//! Renders the live view of a reconstructed project for external
//! renderers to consume. Read-only; nothing in the core depends on it.

use crate::outline::Project;

/// Render the live manuscript as markdown: title, synopsis, chapters in
/// order, scenes separated by breaks. Tombstoned nodes do not appear.
pub fn manuscript_markdown(project: &Project) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", project.metadata.title));
    out.push_str(&format!("*{}*\n\n", project.metadata.synopsis));

    let mut number = 0;
    for chapter in project.live_chapters() {
        number += 1;
        out.push_str(&format!("## Chapter {number}\n\n"));

        let mut first_scene = true;
        for scene in chapter.live_scenes() {
            if !first_scene {
                out.push_str("***\n\n");
            }
            first_scene = false;
            for paragraph in &scene.paragraphs {
                out.push_str(&paragraph.content);
                out.push_str("\n\n");
            }
        }
    }

    out
}
