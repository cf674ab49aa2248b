//! Per-path validation rules.
//!
//! Validators are checked before a write reaches the middleware chain. A
//! rule returning `false` rejects the write with [`Error::Validation`]; a
//! rule that fails outright is logged and rejects the write the same way.
//!
//! The [`rules`] module has ready-made predicates for common checks.

use crate::{
    error::{CallbackResult, Result},
    Error, Path,
};
use serde_json::Value;
use std::collections::HashMap;
use std::rc::Rc;

/// Predicate deciding whether a value may be written.
pub type Predicate = dyn Fn(&Value) -> CallbackResult<bool>;

#[derive(Clone)]
struct Rule {
    id: u64,
    message: String,
    predicate: Rc<Predicate>,
}

/// Validation rules keyed by exact path, each list in registration order.
#[derive(Default)]
pub struct ValidatorRegistry {
    rules: HashMap<Path, Vec<Rule>>,
}

impl std::fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorRegistry")
            .field("paths", &self.rules.keys().collect::<Vec<_>>())
            .field("rules", &self.len())
            .finish()
    }
}

/// Rules for one path, detached from the registry so they can run without
/// holding a borrow on it.
pub struct RuleSet {
    path: Path,
    rules: Vec<Rule>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule for `path` under the caller-chosen `id`.
    pub fn add(
        &mut self,
        id: u64,
        path: impl Into<Path>,
        message: impl Into<String>,
        predicate: Rc<Predicate>,
    ) {
        self.rules.entry(path.into()).or_default().push(Rule {
            id,
            message: message.into(),
            predicate,
        });
    }

    /// Remove the rule registered under `id`.
    pub fn remove(&mut self, id: u64) -> bool {
        let mut removed = false;
        self.rules.retain(|_, rules| {
            let before = rules.len();
            rules.retain(|r| r.id != id);
            removed |= rules.len() != before;
            !rules.is_empty()
        });
        removed
    }

    /// Snapshot the rules registered for `path`.
    pub fn rules_for(&self, path: &str) -> RuleSet {
        RuleSet {
            path: path.to_string(),
            rules: self.rules.get(path).cloned().unwrap_or_default(),
        }
    }

    /// Total number of rules across all paths.
    pub fn len(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl RuleSet {
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run every rule against `value`, stopping at the first rejection.
    pub fn check(&self, store: &str, value: &Value) -> Result<()> {
        for rule in &self.rules {
            match (rule.predicate)(value) {
                Ok(true) => {}
                Ok(false) => {
                    return Err(Error::Validation {
                        path: self.path.clone(),
                        message: rule.message.clone(),
                    })
                }
                Err(err) => {
                    tracing::warn!(
                        store = %store,
                        path = %self.path,
                        error = %err,
                        "Validator failed, rejecting write"
                    );
                    return Err(Error::Validation {
                        path: self.path.clone(),
                        message: format!("validator error: {err}"),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Default message for rules registered without one.
pub fn default_message(path: &str) -> String {
    format!("Validation failed for {path}")
}

/// Built-in predicates.
pub mod rules {
    use super::*;

    /// JSON value kinds a rule can require.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum JsonKind {
        String,
        Int,
        Number,
        Bool,
        Array,
        Object,
    }

    impl std::fmt::Display for JsonKind {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                JsonKind::String => write!(f, "String"),
                JsonKind::Int => write!(f, "Int"),
                JsonKind::Number => write!(f, "Number"),
                JsonKind::Bool => write!(f, "Bool"),
                JsonKind::Array => write!(f, "Array"),
                JsonKind::Object => write!(f, "Object"),
            }
        }
    }

    impl JsonKind {
        pub fn matches(self, value: &Value) -> bool {
            match self {
                JsonKind::String => value.is_string(),
                JsonKind::Int => value.is_i64() || value.is_u64(),
                JsonKind::Number => value.is_number(),
                JsonKind::Bool => value.is_boolean(),
                JsonKind::Array => value.is_array(),
                JsonKind::Object => value.is_object(),
            }
        }
    }

    /// Rejects `null`.
    pub fn required() -> impl Fn(&Value) -> CallbackResult<bool> {
        |value: &Value| Ok(!value.is_null())
    }

    /// Accepts only values of `kind`.
    pub fn of_kind(kind: JsonKind) -> impl Fn(&Value) -> CallbackResult<bool> {
        move |value: &Value| Ok(kind.matches(value))
    }

    /// Accepts numbers within `[min, max]`. Non-numbers are rejected.
    pub fn in_range(min: f64, max: f64) -> impl Fn(&Value) -> CallbackResult<bool> {
        move |value: &Value| Ok(value.as_f64().is_some_and(|n| n >= min && n <= max))
    }

    /// Accepts numbers `>= 0`.
    pub fn non_negative() -> impl Fn(&Value) -> CallbackResult<bool> {
        in_range(0.0, f64::INFINITY)
    }

    /// Accepts strings whose character count is at most `max`.
    pub fn max_length(max: usize) -> impl Fn(&Value) -> CallbackResult<bool> {
        move |value: &Value| Ok(value.as_str().is_some_and(|s| s.chars().count() <= max))
    }

    /// Accepts only values equal to one of `allowed`.
    pub fn one_of(allowed: Vec<Value>) -> impl Fn(&Value) -> CallbackResult<bool> {
        move |value: &Value| Ok(allowed.contains(value))
    }
}
