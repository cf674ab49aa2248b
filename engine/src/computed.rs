//! Derived values recalculated when their dependencies change.

use crate::{error::CallbackResult, path, Path};
use serde_json::Value;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Function deriving a value from the whole store state.
///
/// Compute functions receive the state by reference and must not write to
/// the store they belong to.
pub type ComputeFn = dyn Fn(&Value) -> CallbackResult<Value>;

struct Definition {
    id: u64,
    dependencies: Vec<Path>,
    compute: Rc<ComputeFn>,
    cached: Value,
    dirty: bool,
}

impl Definition {
    /// No dependencies means "recompute on every change".
    fn depends_on(&self, changed: &str) -> bool {
        self.dependencies.is_empty()
            || self
                .dependencies
                .iter()
                .any(|prefix| path::overlaps(changed, prefix))
    }
}

/// A computed value whose cache actually changed.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedChange {
    pub name: String,
    pub old_value: Value,
    pub new_value: Value,
}

/// Work item produced by [`ComputedEngine::affected_by`]: evaluate outside
/// any borrow of the engine, then feed the result back through
/// [`ComputedEngine::store_result`].
#[derive(Clone)]
pub struct PendingCompute {
    pub name: String,
    id: u64,
    compute: Rc<ComputeFn>,
}

impl PendingCompute {
    pub fn evaluate(&self, state: &Value) -> CallbackResult<Value> {
        (self.compute)(state)
    }
}

/// Named computed definitions, iterated in name order.
#[derive(Default)]
pub struct ComputedEngine {
    definitions: BTreeMap<String, Definition>,
}

impl std::fmt::Debug for ComputedEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputedEngine")
            .field("names", &self.definitions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ComputedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a definition with an initial cached value.
    ///
    /// `initial` is the result of the first evaluation; an error leaves the
    /// definition dirty with a `null` cache.
    pub fn insert(
        &mut self,
        id: u64,
        name: impl Into<String>,
        dependencies: Vec<Path>,
        compute: Rc<ComputeFn>,
        initial: CallbackResult<Value>,
    ) {
        let (cached, dirty) = match initial {
            Ok(value) => (value, false),
            Err(_) => (Value::Null, true),
        };
        self.definitions.insert(
            name.into(),
            Definition {
                id,
                dependencies,
                compute,
                cached,
                dirty,
            },
        );
    }

    /// Remove the definition registered under `id`.
    pub fn remove(&mut self, id: u64) -> bool {
        let before = self.definitions.len();
        self.definitions.retain(|_, def| def.id != id);
        self.definitions.len() != before
    }

    /// Definitions that must be recomputed after a change at `changed`.
    pub fn affected_by(&self, changed: &str) -> Vec<PendingCompute> {
        self.definitions
            .iter()
            .filter(|(_, def)| def.depends_on(changed))
            .map(|(name, def)| PendingCompute {
                name: name.clone(),
                id: def.id,
                compute: Rc::clone(&def.compute),
            })
            .collect()
    }

    /// The definition `name` if it needs recomputation.
    pub fn dirty(&self, name: &str) -> Option<PendingCompute> {
        self.definitions
            .get(name)
            .filter(|def| def.dirty)
            .map(|def| PendingCompute {
                name: name.to_string(),
                id: def.id,
                compute: Rc::clone(&def.compute),
            })
    }

    /// Record the result of evaluating `pending`.
    ///
    /// Returns the change when the new value differs structurally from the
    /// cache. A failed evaluation marks the definition dirty and keeps the
    /// stale cache. Results for definitions replaced or removed in the
    /// meantime are discarded.
    pub fn store_result(
        &mut self,
        pending: &PendingCompute,
        result: CallbackResult<Value>,
    ) -> Option<ComputedChange> {
        let def = self
            .definitions
            .get_mut(&pending.name)
            .filter(|def| def.id == pending.id)?;

        match result {
            Ok(value) => {
                def.dirty = false;
                if value == def.cached {
                    return None;
                }
                let old_value = std::mem::replace(&mut def.cached, value.clone());
                Some(ComputedChange {
                    name: pending.name.clone(),
                    old_value,
                    new_value: value,
                })
            }
            Err(_) => {
                def.dirty = true;
                None
            }
        }
    }

    /// Cached value of `name`, possibly stale if the definition is dirty.
    pub fn cached(&self, name: &str) -> Option<&Value> {
        self.definitions.get(name).map(|def| &def.cached)
    }

    pub fn is_dirty(&self, name: &str) -> bool {
        self.definitions.get(name).is_some_and(|def| def.dirty)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
