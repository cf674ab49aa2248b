//! Cross-tab storage notification.
//!
//! Serialized with camelCase field names, mirroring the browser's storage
//! event.

use serde::{Deserialize, Serialize};

/// A key in the shared storage area changed in another tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageChange {
    pub key: String,
    /// Value before the write, `None` if the key was absent
    pub old_value: Option<String>,
    /// Value after the write, `None` if the key was removed
    pub new_value: Option<String>,
}

impl StorageChange {
    pub fn is_removal(&self) -> bool {
        self.new_value.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape() {
        let change = StorageChange {
            key: "app_state".into(),
            old_value: None,
            new_value: Some("{}".into()),
        };
        let json = serde_json::to_string(&change).unwrap();
        assert_eq!(
            json,
            r#"{"key":"app_state","oldValue":null,"newValue":"{}"}"#
        );
        assert!(!change.is_removal());
    }

    #[test]
    fn removal_parses() {
        let change: StorageChange =
            serde_json::from_str(r#"{"key":"k","oldValue":"x","newValue":null}"#).unwrap();
        assert!(change.is_removal());
        assert_eq!(change.old_value.as_deref(), Some("x"));
    }
}
