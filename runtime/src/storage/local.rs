//! Storage private to one tab.

use std::cell::RefCell;
use std::collections::HashMap;

use super::{check_quota, usage_after, StorageBackend};
use crate::config::StorageKind;
use crate::error::StorageError;

/// In-memory storage that lives and dies with its tab.
#[derive(Debug, Default)]
pub struct TabLocalStorage {
    entries: RefCell<HashMap<String, String>>,
    quota: Option<usize>,
}

impl TabLocalStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(mut self, quota: Option<usize>) -> Self {
        self.quota = quota;
        self
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl StorageBackend for TabLocalStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::TabLocal
    }

    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.borrow_mut();
        let needed = usage_after(
            entries.iter().map(|(k, v)| (k.as_str(), v.len())),
            key,
            value.len(),
        );
        check_quota(needed, self.quota)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}
