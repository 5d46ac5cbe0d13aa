//! Durable fact memory.
//!
//! A flat, ordered list of short statements kept in one JSON file. Callers
//! address facts by the 1-based position shown in the last [`FactStore::format`]
//! listing; the store itself works with 0-based indices.

use crate::error::{CohostError, Result};
use log::{info, warn};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Rendered listing for an empty store.
pub const EMPTY_LISTING: &str = "No facts";

/// Deduplicated list of facts persisted as a JSON array of strings.
pub struct FactStore {
    path: PathBuf,
    facts: Mutex<Vec<String>>,
}

impl FactStore {
    /// Opens the store at `path`, creating the parent directory if needed.
    ///
    /// A missing file is an empty store. A file that cannot be decoded is
    /// logged and treated as empty; it is replaced on the next write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| CohostError::Persistence {
                message: format!("Failed to create {}: {}", parent.display(), e),
            })?;
        }

        let facts = match load_facts(&path) {
            Ok(facts) => facts,
            Err(e) => {
                warn!("Error loading facts, starting empty: {}", e);
                Vec::new()
            }
        };

        Ok(Self {
            path,
            facts: Mutex::new(facts),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends facts that are not already stored.
    ///
    /// Input is trimmed and empty strings are dropped. Exact duplicates (against
    /// the store and within `facts`) are skipped. The file is only rewritten
    /// when something new was added. Returns the number of facts added.
    pub fn add<S: AsRef<str>>(&self, facts: &[S]) -> Result<usize> {
        if facts.is_empty() {
            return Ok(0);
        }

        let mut guard = self.lock();
        let mut current = self.reload(&guard);

        let mut existing: HashSet<String> = current.iter().cloned().collect();
        let mut added = Vec::new();
        for fact in facts {
            let fact = fact.as_ref().trim();
            if fact.is_empty() {
                continue;
            }
            if existing.insert(fact.to_string()) {
                added.push(fact.to_string());
            }
        }

        if added.is_empty() {
            *guard = current;
            return Ok(0);
        }

        current.extend(added.iter().cloned());
        *guard = current;
        save_facts(&self.path, &guard).map_err(|e| CohostError::Persistence {
            message: format!("Failed to save facts after addition: {}", e),
        })?;

        info!("Added facts added={:?} total={}", added, guard.len());
        Ok(added.len())
    }

    /// Removes facts by 0-based index.
    ///
    /// Every index is checked against the current list before anything is
    /// removed; a single out-of-range index rejects the whole batch. Repeated
    /// indices are removed once. Returns the removed facts in removal order
    /// (highest index first).
    pub fn remove_by_index(&self, indices: &[usize]) -> Result<Vec<String>> {
        if indices.is_empty() {
            return Ok(Vec::new());
        }

        let mut guard = self.lock();
        let mut current = self.reload(&guard);

        if current.is_empty() {
            *guard = current;
            return Err(CohostError::Validation {
                message: "no facts to remove".to_string(),
            });
        }

        let mut unique = Vec::with_capacity(indices.len());
        for &idx in indices {
            if idx >= current.len() {
                let len = current.len();
                *guard = current;
                return Err(CohostError::Validation {
                    message: format!("invalid index {}: out of range [0, {}]", idx, len - 1),
                });
            }
            if !unique.contains(&idx) {
                unique.push(idx);
            }
        }

        // Descending, so earlier removals don't shift later positions.
        unique.sort_unstable_by(|a, b| b.cmp(a));

        let removed: Vec<String> = unique.iter().map(|&idx| current.remove(idx)).collect();
        *guard = current;
        save_facts(&self.path, &guard).map_err(|e| CohostError::Persistence {
            message: format!("Failed to save facts after removal: {}", e),
        })?;

        info!(
            "Removed facts count={} remaining={} removed={:?}",
            removed.len(),
            guard.len(),
            removed
        );
        Ok(removed)
    }

    /// Renders a 1-based numbered listing in insertion order.
    ///
    /// Each fact becomes `"{n} - {fact}\n"`. An empty store renders as
    /// [`EMPTY_LISTING`].
    pub fn format(&self) -> String {
        format_listing(&self.lock())
    }

    /// Snapshot of the stored facts.
    pub fn list(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// Number of stored facts.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no facts are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Writes swap in a complete list, so a poisoned guard still holds a
    // consistent one.
    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.facts.lock().unwrap_or_else(|poisoned| {
            warn!("Fact store lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Re-reads the durable list. Falls back to the in-memory copy when the
    /// file is unreadable, so the next write replaces the broken file.
    fn reload(&self, cached: &[String]) -> Vec<String> {
        match load_facts(&self.path) {
            Ok(facts) => facts,
            Err(e) => {
                warn!("Re-reading facts failed, using in-memory copy: {}", e);
                cached.to_vec()
            }
        }
    }
}

/// Renders facts the way [`FactStore::format`] does.
pub fn format_listing(facts: &[String]) -> String {
    if facts.is_empty() {
        return EMPTY_LISTING.to_string();
    }

    facts
        .iter()
        .enumerate()
        .map(|(i, fact)| format!("{} - {}\n", i + 1, fact))
        .collect()
}

/// Recovers facts from a listing produced by [`format_listing`].
///
/// Lines that don't carry the `"{n} - "` prefix are skipped.
pub fn parse_listing(listing: &str) -> Vec<(usize, String)> {
    listing
        .lines()
        .filter_map(|line| {
            let (number, fact) = line.split_once(" - ")?;
            let number = number.trim().parse::<usize>().ok()?;
            Some((number, fact.to_string()))
        })
        .collect()
}

fn load_facts(path: &Path) -> std::result::Result<Vec<String>, String> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(format!("failed to open {}: {}", path.display(), e)),
    };

    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }

    serde_json::from_str(&contents)
        .map_err(|e| format!("failed to decode {}: {}", path.display(), e))
}

fn save_facts(path: &Path, facts: &[String]) -> std::result::Result<(), String> {
    let mut json = serde_json::to_string_pretty(facts).map_err(|e| e.to_string())?;
    json.push('\n');
    fs::write(path, json).map_err(|e| format!("failed to write {}: {}", path.display(), e))
}
