//! Bounded history log powering undo.

use crate::{Path, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;

/// Default number of entries a store keeps.
pub const DEFAULT_MAX_HISTORY: usize = 50;

/// What kind of change produced a history entry or event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Initial state of a store
    Init,
    /// A single path write
    Set,
    /// State restored to the initial value
    Reset,
    /// Most recent change reverted
    Undo,
    /// State replaced from a snapshot
    Hydrate,
    /// A computed value changed
    Computed,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Action::Init => "init",
            Action::Set => "set",
            Action::Reset => "reset",
            Action::Undo => "undo",
            Action::Hydrate => "hydrate",
            Action::Computed => "computed",
        };
        f.write_str(name)
    }
}

/// One recorded change. Values are owned copies taken at capture time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub action: Action,
    /// Changed path; empty for whole-state changes
    pub path: Path,
    /// Value before the change, `None` if the path did not exist
    pub old_value: Option<Value>,
    /// Value after the change, `None` if the path was removed
    pub new_value: Option<Value>,
    /// Milliseconds since epoch
    pub timestamp: Timestamp,
}

impl HistoryEntry {
    pub fn new(
        action: Action,
        path: impl Into<Path>,
        old_value: Option<Value>,
        new_value: Option<Value>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            action,
            path: path.into(),
            old_value,
            new_value,
            timestamp,
        }
    }

    /// Whether undo may pop this entry.
    pub fn is_undoable(&self) -> bool {
        self.action != Action::Init
    }
}

/// FIFO log with a fixed capacity.
///
/// When full, appending evicts the oldest entry, including the `init`
/// entry once enough changes have accumulated.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
    max_size: usize,
}

impl History {
    /// Create an empty log. A capacity of zero is raised to one.
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            entries: VecDeque::with_capacity(max_size.min(DEFAULT_MAX_HISTORY)),
            max_size,
        }
    }

    /// Append an entry, evicting from the front when at capacity.
    ///
    /// Returns the evicted entry, if any.
    pub fn push(&mut self, entry: HistoryEntry) -> Option<HistoryEntry> {
        let evicted = if self.entries.len() >= self.max_size {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(entry);
        evicted
    }

    /// Most recent entry that undo would revert.
    pub fn last_undoable(&self) -> Option<&HistoryEntry> {
        self.entries.back().filter(|e| e.is_undoable())
    }

    /// Remove and return the most recent undoable entry.
    pub fn pop_undoable(&mut self) -> Option<HistoryEntry> {
        if self.last_undoable().is_some() {
            self.entries.pop_back()
        } else {
            None
        }
    }

    pub fn first(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}
