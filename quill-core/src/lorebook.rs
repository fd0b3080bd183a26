//! Lorebook context injection.
//!
//! A lorebook maps entry ids to world-building facts with trigger keys.
//! Before every generation call the engine scans the narrative text
//! about to be sent, ranks the entries whose keys appear in it, and
//! selects as many as fit the token budget. Selection is stateless and
//! recomputed fresh per call, since narrative context shifts call to call.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tokio::fs;
use tracing::debug;

/// Errors from loading a lorebook.
#[derive(Debug, Error)]
pub enum LorebookError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A single world-building fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoreEntry {
    /// Trigger strings; any case-insensitive occurrence in the query
    /// text makes this entry a candidate.
    pub keys: Vec<String>,

    /// The fact itself, injected verbatim.
    pub content: String,

    /// Priority weight; higher wins ties on matched-key count.
    #[serde(default)]
    pub weight: i32,

    /// Disabled entries are never candidates.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// An entry selected for injection, with its score attached.
#[derive(Debug, Clone)]
pub struct SelectedEntry<'a> {
    pub id: &'a str,
    pub entry: &'a LoreEntry,

    /// Distinct keys that matched.
    pub matched_keys: usize,

    /// Total occurrences across all keys.
    pub occurrences: usize,
}

/// Keyed collection of lore entries, loaded once per run and read-only
/// during generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lorebook {
    entries: BTreeMap<String, LoreEntry>,
}

impl Lorebook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON file mapping entry id to entry. A missing file
    /// is an empty lorebook, not an error.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, LorebookError> {
        let content = match fs::read_to_string(path.as_ref()).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::new());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    pub fn insert(&mut self, id: impl Into<String>, entry: LoreEntry) {
        self.entries.insert(id.into(), entry);
    }

    pub fn get(&self, id: &str) -> Option<&LoreEntry> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Select the relevant entries for a generation call, in rank order,
    /// under the token budget.
    ///
    /// Ranking is (distinct matched keys, weight, total occurrences)
    /// descending, ties broken by entry id for determinism. Entries that
    /// do not fit the remaining budget are skipped whole; content is
    /// never truncated to fit.
    pub fn select_context(&self, query_text: &str, token_budget: usize) -> Vec<SelectedEntry<'_>> {
        let query = query_text.to_lowercase();

        let mut candidates: Vec<SelectedEntry<'_>> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.enabled)
            .filter_map(|(id, entry)| {
                let mut matched_keys = 0usize;
                let mut occurrences = 0usize;
                for key in &entry.keys {
                    let key = key.trim().to_lowercase();
                    if key.is_empty() {
                        continue;
                    }
                    let count = query.matches(&key).count();
                    if count > 0 {
                        matched_keys += 1;
                        occurrences += count;
                    }
                }
                (matched_keys > 0).then_some(SelectedEntry {
                    id,
                    entry,
                    matched_keys,
                    occurrences,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.matched_keys
                .cmp(&a.matched_keys)
                .then(b.entry.weight.cmp(&a.entry.weight))
                .then(b.occurrences.cmp(&a.occurrences))
                .then(a.id.cmp(b.id))
        });

        let mut selected = Vec::new();
        let mut used = 0usize;
        for candidate in candidates {
            let cost = estimate_tokens(&candidate.entry.content);
            if used + cost > token_budget {
                continue;
            }
            used += cost;
            selected.push(candidate);
        }

        debug!(
            selected = selected.len(),
            used_tokens = used,
            budget = token_budget,
            "lorebook selection"
        );
        selected
    }

    /// Render selected entries as a context block for prompt assembly,
    /// or `None` when nothing matched.
    pub fn context_block(&self, query_text: &str, token_budget: usize) -> Option<String> {
        let selected = self.select_context(query_text, token_budget);
        if selected.is_empty() {
            return None;
        }
        let mut block = String::from("## World Notes\n");
        for s in &selected {
            block.push_str(&format!("- {}\n", s.entry.content));
        }
        Some(block)
    }
}

/// Deterministic token estimate: whitespace-delimited words scaled up,
/// since prose averages roughly four tokens per three words.
pub fn estimate_tokens(text: &str) -> usize {
    let words = text.split_whitespace().count();
    words + words.div_ceil(3)
}
