//! Key-value storage backends.
//!
//! A tab persists its stores under one key of a [`StorageBackend`]. Two
//! backends exist:
//!
//! - [`TabLocalStorage`] is private to one tab and never notifies anyone.
//! - [`TabPersistentStorage`] is a tab's handle onto a [`StorageArea`]
//!   shared by all tabs. Every write is announced to the *other* attached
//!   tabs as a [`StorageChange`].

mod area;
mod change;
mod local;

pub use area::{ChangeReceiver, ChangeSender, StorageArea, TabId, TabPersistentStorage};
pub use change::StorageChange;
pub use local::TabLocalStorage;

use crate::config::StorageKind;
use crate::error::StorageError;

/// String key-value storage.
pub trait StorageBackend {
    fn kind(&self) -> StorageKind;

    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// Bytes used by `entries` once `key` holds a value of `value_len` bytes.
pub(crate) fn usage_after<'a>(
    entries: impl Iterator<Item = (&'a str, usize)>,
    key: &str,
    value_len: usize,
) -> usize {
    let others: usize = entries
        .filter(|(k, _)| *k != key)
        .map(|(k, len)| k.len() + len)
        .sum();
    others + key.len() + value_len
}

/// Fail with [`StorageError::QuotaExceeded`] if `needed` exceeds `quota`.
pub(crate) fn check_quota(needed: usize, quota: Option<usize>) -> Result<(), StorageError> {
    match quota {
        Some(quota) if needed > quota => Err(StorageError::QuotaExceeded { needed, quota }),
        _ => Ok(()),
    }
}
