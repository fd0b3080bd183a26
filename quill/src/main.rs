//! Quill CLI: drafting studio for AI-assisted long-form writing.
//!
//! Usage:
//!   quill new --idea "a lighthouse keeper finds a door under the tide"
//!   quill draft <project>
//!   quill rewrite <project> --scene 3 --instructions "slower, colder"
//!
//! Requires ANTHROPIC_API_KEY (via .env file or environment).

use clap::{Parser, Subcommand};
use quill_core::persist::{find_project, list_projects};
use quill_core::testing::AcceptAll;
use quill_core::{
    CandidatePatch, ClaudeGenerator, Confirmer, NodeRef, SceneId, StoryKind, Studio,
    StudioConfig,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "quill", version, about = "AI-assisted drafting studio")]
struct Cli {
    /// Directory projects live under
    #[arg(long, global = true, default_value = "./projects")]
    dir: PathBuf,

    /// Skip confirmation prompts and accept every candidate
    #[arg(long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new project from an idea (runs the outline phase)
    New {
        /// The story idea, in a sentence or two
        #[arg(long)]
        idea: String,

        /// Outline a short story instead of a novel
        #[arg(long)]
        short_story: bool,
    },
    /// List projects
    List,
    /// Show a project's outline and drafting progress
    Status {
        /// Project slug (or unique prefix)
        project: String,
    },
    /// Draft every scene that has no prose yet
    Draft { project: String },
    /// Expand a scene toward a word count
    Expand {
        project: String,
        /// Scene number (from `status`)
        #[arg(long)]
        scene: u64,
        /// Target word count for the scene
        #[arg(long, default_value_t = 1500)]
        words: usize,
    },
    /// Rewrite a scene's prose
    Rewrite {
        project: String,
        #[arg(long)]
        scene: u64,
        /// Guidance for the rewrite
        #[arg(long)]
        instructions: Option<String>,
        /// Ignore the current prose and rewrite from the summary alone
        #[arg(long)]
        fresh: bool,
    },
    /// Analyze the manuscript and list suggested edits
    Suggest { project: String },
    /// Remove a scene from the live manuscript
    Remove {
        project: String,
        #[arg(long)]
        scene: u64,
    },
    /// Render the live manuscript as markdown
    Export {
        project: String,
        /// Write to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

/// Interactive y/N gate over stdin. Shows the staged prose before
/// asking; anything but an explicit yes discards the candidate.
struct StdinConfirmer;

impl Confirmer for StdinConfirmer {
    fn confirm(&mut self, candidate: &CandidatePatch) -> bool {
        println!("\n--- staged: {} ---\n", candidate.describe());
        println!("{}\n", candidate.preview);
        print!("Commit this change? [y/N] ");
        std::io::stdout().flush().ok();

        let mut answer = String::new();
        if std::io::stdin().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::List => {
            let projects = list_projects(&cli.dir).await?;
            if projects.is_empty() {
                println!("No projects under {}", cli.dir.display());
                return Ok(());
            }
            for entry in projects {
                println!(
                    "{:<32} {:<12} {} chapter(s), {} scene(s)",
                    entry.card.slug,
                    entry.card.kind.name(),
                    entry.card.chapters,
                    entry.card.scenes,
                );
            }
            Ok(())
        }

        Commands::New { idea, short_story } => {
            let kind = if short_story {
                StoryKind::ShortStory
            } else {
                StoryKind::Novel
            };
            let studio = Studio::create(
                generator()?,
                StudioConfig::new(&cli.dir),
                &idea,
                kind,
            )
            .await?;
            println!(
                "Created \"{}\" at {}",
                studio.project().metadata.title,
                studio.dir().display()
            );
            print_status(&studio);
            Ok(())
        }

        Commands::Status { project } => {
            let studio = open(&cli.dir, &project).await?;
            print_status(&studio);
            Ok(())
        }

        Commands::Draft { project } => {
            let mut studio = open(&cli.dir, &project).await?;
            let report = studio.draft_pending().await?;
            println!(
                "Drafted {} scene(s); manuscript is now {} words.",
                report.scenes_drafted, report.total_words
            );
            Ok(())
        }

        Commands::Expand {
            project,
            scene,
            words,
        } => {
            let mut studio = open(&cli.dir, &project).await?;
            let mut gate = confirmer(cli.yes);
            let committed = studio
                .expand(SceneId(scene), words, &mut *gate)
                .await?;
            report_gate(committed);
            Ok(())
        }

        Commands::Rewrite {
            project,
            scene,
            instructions,
            fresh,
        } => {
            let mut studio = open(&cli.dir, &project).await?;
            let mut gate = confirmer(cli.yes);
            let committed = studio
                .rewrite(
                    SceneId(scene),
                    instructions.as_deref(),
                    fresh,
                    &mut *gate,
                )
                .await?;
            report_gate(committed);
            Ok(())
        }

        Commands::Suggest { project } => {
            let studio = open(&cli.dir, &project).await?;
            let suggestions = studio.suggest().await?;
            for (i, suggestion) in suggestions.iter().enumerate() {
                println!("{}. {suggestion}", i + 1);
            }
            Ok(())
        }

        Commands::Remove { project, scene } => {
            let mut studio = open(&cli.dir, &project).await?;
            let seq = studio.tombstone(NodeRef::Scene(SceneId(scene))).await?;
            println!("Scene sc{scene} removed (patch {seq}).");
            Ok(())
        }

        Commands::Export { project, out } => {
            let studio = open(&cli.dir, &project).await?;
            let manuscript = studio.export_markdown();
            match out {
                Some(path) => {
                    std::fs::write(&path, manuscript)?;
                    println!("Wrote {}", path.display());
                }
                None => print!("{manuscript}"),
            }
            Ok(())
        }
    }
}

fn generator() -> Result<Arc<ClaudeGenerator>, Box<dyn std::error::Error>> {
    match ClaudeGenerator::from_env() {
        Ok(generator) => Ok(Arc::new(generator)),
        Err(_) => Err("ANTHROPIC_API_KEY environment variable not set. \
                       Set it in a .env file or export it."
            .into()),
    }
}

async fn open(dir: &PathBuf, needle: &str) -> Result<Studio, Box<dyn std::error::Error>> {
    let entry = find_project(dir, needle)
        .await?
        .ok_or_else(|| format!("no project matching \"{needle}\" under {}", dir.display()))?;
    Ok(Studio::resume(generator()?, StudioConfig::new(dir), &entry.path).await?)
}

/// Either the interactive stdin gate or auto-accept with `--yes`.
fn confirmer(yes: bool) -> Box<dyn Confirmer> {
    if yes {
        Box::new(AcceptAll)
    } else {
        Box::new(StdinConfirmer)
    }
}

fn report_gate(committed: Option<u64>) {
    match committed {
        Some(seq) => println!("Committed as patch {seq}."),
        None => println!("Discarded; the log is unchanged."),
    }
}

fn print_status(studio: &Studio) {
    let project = studio.project();
    println!(
        "\n{} ({}) | {} patches, {} words",
        project.metadata.title,
        project.metadata.kind.name(),
        studio.log().len(),
        project.word_count(),
    );
    println!("{}\n", project.metadata.synopsis);

    for chapter in project.live_chapters() {
        println!("[{}] {}", chapter.id, chapter.summary);
        for scene in chapter.live_scenes() {
            let state = if scene.is_empty() {
                "pending".to_string()
            } else {
                format!("{} words", scene.word_count())
            };
            println!("    [{}] {} ({state})", scene.id, scene.summary);
        }
    }
}
