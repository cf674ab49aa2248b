//! Storage shared by every tab.
//!
//! Tracks attached tabs and fans each write out to all of them except the
//! writer, the way a browser delivers `storage` events.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use tokio::sync::mpsc;

use super::{check_quota, usage_after, StorageBackend, StorageChange};
use crate::config::StorageKind;
use crate::error::StorageError;

/// Identifier of an attached tab.
pub type TabId = String;

/// Sender half of a tab's change feed.
pub type ChangeSender = mpsc::UnboundedSender<StorageChange>;

/// Receiver half of a tab's change feed.
pub type ChangeReceiver = mpsc::UnboundedReceiver<StorageChange>;

/// Key-value area shared by all tabs of a process.
///
/// Thread-safe and can be shared across tabs via `Arc`. When opened on a
/// file, every write is flushed to it as a JSON object so the area survives
/// restarts.
#[derive(Debug, Default)]
pub struct StorageArea {
    entries: DashMap<String, String>,
    /// Change feeds of attached tabs, keyed by tab ID.
    tabs: DashMap<TabId, ChangeSender>,
    file: Option<PathBuf>,
    quota: Option<usize>,
    /// Serializes writes so quota checks and file flushes see a stable map.
    write_lock: Mutex<()>,
}

impl StorageArea {
    /// Create an empty in-memory area.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty area wrapped in Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Open a file-backed area, loading the file if it exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = DashMap::new();
        if path.exists() {
            let raw = fs::read_to_string(&path)?;
            if !raw.trim().is_empty() {
                let stored: BTreeMap<String, String> = serde_json::from_str(&raw)
                    .map_err(|e| StorageError::Corrupt(format!("{}: {e}", path.display())))?;
                for (key, value) in stored {
                    entries.insert(key, value);
                }
            }
        }
        tracing::info!(path = %path.display(), keys = entries.len(), "Opened storage file");
        Ok(Self {
            entries,
            file: Some(path),
            ..Self::default()
        })
    }

    pub fn with_quota(mut self, quota: Option<usize>) -> Self {
        self.quota = quota;
        self
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Attach a tab. Changes written by other tabs arrive on the returned
    /// receiver.
    pub fn attach(&self) -> (TabId, ChangeReceiver) {
        let tab_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        self.tabs.insert(tab_id.clone(), tx);
        tracing::info!(tab_id = %tab_id, "Tab attached to shared storage");
        (tab_id, rx)
    }

    /// Detach a tab.
    pub fn detach(&self, tab_id: &str) {
        if self.tabs.remove(tab_id).is_some() {
            tracing::info!(tab_id = %tab_id, "Tab detached from shared storage");
        }
    }

    /// Get the number of attached tabs.
    pub fn tab_count(&self) -> usize {
        self.tabs.len()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    /// Bytes currently stored (keys plus values).
    pub fn usage_bytes(&self) -> usize {
        self.entries
            .iter()
            .map(|e| e.key().len() + e.value().len())
            .sum()
    }

    /// Write `value` under `key` on behalf of `writer` and notify the other
    /// tabs.
    ///
    /// Returns the number of tabs notified.
    pub fn set(&self, writer: &str, key: &str, value: &str) -> Result<usize, StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let sizes: Vec<(String, usize)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().len()))
            .collect();
        let needed = usage_after(
            sizes.iter().map(|(k, len)| (k.as_str(), *len)),
            key,
            value.len(),
        );
        check_quota(needed, self.quota)?;

        let old_value = self.entries.insert(key.to_string(), value.to_string());
        if let Err(err) = self.flush() {
            // Keep memory and file in agreement.
            match &old_value {
                Some(old) => {
                    self.entries.insert(key.to_string(), old.clone());
                }
                None => {
                    self.entries.remove(key);
                }
            }
            return Err(err);
        }

        Ok(self.broadcast_except(
            writer,
            StorageChange {
                key: key.to_string(),
                old_value,
                new_value: Some(value.to_string()),
            },
        ))
    }

    /// Remove `key` on behalf of `writer` and notify the other tabs.
    pub fn remove(&self, writer: &str, key: &str) -> Result<usize, StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let Some((_, old_value)) = self.entries.remove(key) else {
            return Ok(0);
        };
        self.flush()?;

        Ok(self.broadcast_except(
            writer,
            StorageChange {
                key: key.to_string(),
                old_value: Some(old_value),
                new_value: None,
            },
        ))
    }

    /// Send `change` to every attached tab except `writer`.
    ///
    /// Returns the number of tabs that received it.
    pub fn broadcast_except(&self, writer: &str, change: StorageChange) -> usize {
        let mut sent_count = 0;

        for tab in self.tabs.iter() {
            if tab.key() != writer && tab.value().send(change.clone()).is_ok() {
                sent_count += 1;
            }
        }

        tracing::debug!(
            writer = %writer,
            key = %change.key,
            recipients = sent_count,
            "Broadcast storage change"
        );

        sent_count
    }

    /// Write the whole area to its file, if any.
    fn flush(&self) -> Result<(), StorageError> {
        let Some(path) = &self.file else {
            return Ok(());
        };
        let snapshot: BTreeMap<String, String> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        let json = serde_json::to_string(&snapshot)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// A tab's handle onto a shared [`StorageArea`]. Detaches on drop.
#[derive(Debug)]
pub struct TabPersistentStorage {
    area: Arc<StorageArea>,
    tab_id: TabId,
}

impl TabPersistentStorage {
    /// Attach a new tab to `area`.
    pub fn attach(area: Arc<StorageArea>) -> (Self, ChangeReceiver) {
        let (tab_id, changes) = area.attach();
        (Self { area, tab_id }, changes)
    }

    pub fn tab_id(&self) -> &str {
        &self.tab_id
    }

    pub fn area(&self) -> &Arc<StorageArea> {
        &self.area
    }
}

impl StorageBackend for TabPersistentStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::TabPersistent
    }

    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.area.get(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.area.set(&self.tab_id, key, value).map(|_| ())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.area.remove(&self.tab_id, key).map(|_| ())
    }
}

impl Drop for TabPersistentStorage {
    fn drop(&mut self) {
        self.area.detach(&self.tab_id);
    }
}
