//! Error types for the state engine.

use crate::{Path, StoreName};
use thiserror::Error;

/// All possible errors from the state engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Write errors
    #[error("validation failed for '{path}': {message}")]
    Validation { path: Path, message: String },

    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: Path, reason: String },

    // State errors
    #[error("invalid state for store '{store}': root must be an object, got {got}")]
    InvalidState { store: StoreName, got: String },

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

impl Error {
    pub(crate) fn invalid_path(path: &str, reason: impl Into<String>) -> Self {
        Error::InvalidPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error raised by a user-supplied callback (validator, middleware, watcher,
/// bus listener or compute function).
///
/// Callback failures never propagate out of the store: they are logged and
/// turned into the outcome documented for each callback kind.
pub type CallbackError = Box<dyn std::error::Error + 'static>;

/// Result type returned by user-supplied callbacks.
pub type CallbackResult<T = ()> = std::result::Result<T, CallbackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::Validation {
            path: "total".into(),
            message: "must be non-negative".into(),
        };
        assert_eq!(
            err.to_string(),
            "validation failed for 'total': must be non-negative"
        );

        let err = Error::invalid_path("a.b.c", "parent 'a.b' does not exist");
        assert_eq!(
            err.to_string(),
            "invalid path 'a.b.c': parent 'a.b' does not exist"
        );

        let err = Error::InvalidState {
            store: "cart".into(),
            got: "Array".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid state for store 'cart': root must be an object, got Array"
        );
    }

    #[test]
    fn callback_error_from_str() {
        let err: CallbackError = "boom".into();
        assert_eq!(err.to_string(), "boom");
    }
}
