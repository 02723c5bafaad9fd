//! Repost ledger
//!
//! Records, per creator, the item ids that were already published. The file is
//! a JSON object `{ "<creator>": ["<item id>", ...] }`, loaded whole at startup
//! and rewritten whole on every commit.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::PersistenceError;
use crate::types::Creator;

/// In-memory view of everything already reposted
///
/// Each creator's list behaves as an ordered set: ids keep their commit order
/// and never repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    entries: BTreeMap<Creator, Vec<String>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, creator: &Creator, item_id: &str) -> bool {
        self.entries
            .get(creator)
            .is_some_and(|ids| ids.iter().any(|id| id == item_id))
    }

    /// Add `item_id` to the creator's set. Returns false if it was already there.
    pub fn record(&mut self, creator: &Creator, item_id: &str) -> bool {
        let ids = self.entries.entry(creator.clone()).or_default();
        if ids.iter().any(|id| id == item_id) {
            return false;
        }
        ids.push(item_id.to_string());
        true
    }

    /// Remove `item_id` from the creator's set. Returns false if it was absent.
    pub fn forget(&mut self, creator: &Creator, item_id: &str) -> bool {
        let Some(ids) = self.entries.get_mut(creator) else {
            return false;
        };
        let before = ids.len();
        ids.retain(|id| id != item_id);
        let removed = ids.len() != before;
        if ids.is_empty() {
            self.entries.remove(creator);
        }
        removed
    }

    pub fn items(&self, creator: &Creator) -> &[String] {
        self.entries.get(creator).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn creators(&self) -> impl Iterator<Item = &Creator> {
        self.entries.keys()
    }

    /// Total number of recorded items across all creators
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Older ledgers were written with plain appends and may hold repeats.
    fn dedup(&mut self) {
        for ids in self.entries.values_mut() {
            let mut seen = std::collections::HashSet::new();
            ids.retain(|id| seen.insert(id.clone()));
        }
    }
}

/// File-backed ledger persistence
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the ledger, or an empty one if nothing has been saved yet
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError` if the file exists but cannot be read or is
    /// not a valid ledger document.
    pub fn load(&self) -> Result<Ledger, PersistenceError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No ledger file yet, starting empty");
                return Ok(Ledger::new());
            }
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(Ledger::new());
        }

        let mut ledger: Ledger = serde_json::from_str(&content)?;
        ledger.dedup();
        debug!(path = %self.path.display(), items = ledger.len(), "Loaded ledger");
        Ok(ledger)
    }

    /// Replace the persisted ledger with `ledger`
    ///
    /// The document is written to a temporary file next to the target and
    /// renamed over it, so a crash leaves either the old or the new ledger.
    pub fn save(&self, ledger: &Ledger) -> Result<(), PersistenceError> {
        let parent = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let mut tmp = NamedTempFile::new_in(&parent)?;
        serde_json::to_writer_pretty(&mut tmp, ledger)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        debug!(path = %self.path.display(), items = ledger.len(), "Saved ledger");
        Ok(())
    }
}
