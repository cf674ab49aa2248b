//! Write interception.
//!
//! Middleware runs after validation and before the write is applied, in
//! registration order. Returning [`Flow::Veto`] drops the write silently:
//! no history entry, no event, no watcher call. This is intentional and not
//! reported as an error; [`crate::WriteOutcome::Vetoed`] tells the caller.
//! A middleware that fails is logged and treated as a veto.

use crate::{error::CallbackResult, path};
use serde_json::Value;
use std::rc::Rc;

/// A write that has passed validation and awaits the chain's verdict.
#[derive(Debug, Clone, Copy)]
pub struct PendingWrite<'a> {
    pub store: &'a str,
    pub path: &'a str,
    /// Current value at `path`, `None` if the key does not exist yet
    pub old_value: Option<&'a Value>,
    pub new_value: &'a Value,
}

/// Verdict of a single middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Veto,
}

impl From<bool> for Flow {
    fn from(proceed: bool) -> Self {
        if proceed {
            Flow::Continue
        } else {
            Flow::Veto
        }
    }
}

/// A middleware function.
pub type Middleware = dyn Fn(&PendingWrite<'_>) -> CallbackResult<Flow>;

/// Ordered list of middleware.
#[derive(Default, Clone)]
pub struct MiddlewareChain {
    entries: Vec<(u64, Rc<Middleware>)>,
}

impl std::fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("len", &self.entries.len())
            .finish()
    }
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: u64, middleware: Rc<Middleware>) {
        self.entries.push((id, middleware));
    }

    pub fn remove(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run the chain. Stops at the first veto or failure.
    pub fn run(&self, write: &PendingWrite<'_>) -> Flow {
        for (id, middleware) in &self.entries {
            match middleware(write) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Veto) => {
                    tracing::debug!(
                        store = %write.store,
                        path = %write.path,
                        middleware = id,
                        "Write vetoed by middleware"
                    );
                    return Flow::Veto;
                }
                Err(err) => {
                    tracing::warn!(
                        store = %write.store,
                        path = %write.path,
                        middleware = id,
                        error = %err,
                        "Middleware failed, dropping write"
                    );
                    return Flow::Veto;
                }
            }
        }
        Flow::Continue
    }
}

/// Ready-made middleware.
pub mod builtin {
    use super::*;

    /// Logs every pending write at debug level and lets it through.
    pub fn trace_writes() -> impl Fn(&PendingWrite<'_>) -> CallbackResult<Flow> {
        |write: &PendingWrite<'_>| -> CallbackResult<Flow> {
            tracing::debug!(
                store = %write.store,
                path = %write.path,
                old = ?write.old_value,
                new = %write.new_value,
                "Pending write"
            );
            Ok(Flow::Continue)
        }
    }

    /// Vetoes every write at or below `prefix`.
    pub fn read_only(prefix: impl Into<String>) -> impl Fn(&PendingWrite<'_>) -> CallbackResult<Flow> {
        let prefix = prefix.into();
        move |write: &PendingWrite<'_>| -> CallbackResult<Flow> {
            Ok(Flow::from(!path::is_prefix(&prefix, write.path)))
        }
    }

    /// Vetoes writes that would not change the stored value.
    pub fn skip_unchanged() -> impl Fn(&PendingWrite<'_>) -> CallbackResult<Flow> {
        |write: &PendingWrite<'_>| -> CallbackResult<Flow> {
            Ok(Flow::from(write.old_value != Some(write.new_value)))
        }
    }
}
