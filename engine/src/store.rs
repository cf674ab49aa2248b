//! Store - the reactive state container.
//!
//! A [`Store`] wraps a JSON object and is the only way to change it. Every
//! write runs the same pipeline to completion before returning:
//!
//! 1. validators registered for the exact path (may reject with an error)
//! 2. middleware in registration order (may veto silently)
//! 3. the write itself
//! 4. a history entry
//! 5. an event on the shared [`EventBus`]
//! 6. recalculation of dependent computed values
//! 7. watchers whose filter overlaps the changed path
//!
//! `reset`, `undo` and `hydrate` skip steps 1-2 but run the rest, so no
//! change to the state goes unobserved.
//!
//! Stores are cheap to clone handles onto shared single-threaded state. No
//! internal borrow is held while user callbacks run, so a watcher may read
//! the store, write to it, or remove itself.

use crate::{
    clock::Clock,
    computed::{ComputeFn, ComputedChange, ComputedEngine, PendingCompute},
    error::{CallbackResult, Result},
    event::{EventBus, StoreEvent},
    history::{Action, History, HistoryEntry, DEFAULT_MAX_HISTORY},
    middleware::{Flow, Middleware, MiddlewareChain, PendingWrite},
    path,
    snapshot::StoreSnapshot,
    validator::{self, Predicate, ValidatorRegistry},
    Error, Path, StoreName, Timestamp,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// Per-store behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreOptions {
    /// Include this store in persisted snapshots
    pub persist: bool,
    /// Accept state from other tabs
    pub sync: bool,
    /// History capacity, at least 1
    pub max_history_size: usize,
    /// Run validators before writes
    pub validation_enabled: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            persist: true,
            sync: true,
            max_history_size: DEFAULT_MAX_HISTORY,
            validation_enabled: true,
        }
    }
}

/// What happened to a write that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Applied, recorded and announced
    Committed,
    /// Dropped by middleware; nothing changed
    Vetoed,
}

impl WriteOutcome {
    pub fn is_committed(self) -> bool {
        self == WriteOutcome::Committed
    }
}

/// Callback notified of state changes.
pub type Watcher = dyn Fn(&StoreEvent) -> CallbackResult;

struct WatcherEntry {
    id: u64,
    filter: Option<Path>,
    callback: Rc<Watcher>,
}

struct Inner {
    name: StoreName,
    options: StoreOptions,
    initial: Value,
    state: RefCell<Value>,
    history: RefCell<History>,
    computed: RefCell<ComputedEngine>,
    validators: RefCell<ValidatorRegistry>,
    middleware: RefCell<MiddlewareChain>,
    watchers: RefCell<Vec<WatcherEntry>>,
    last_sync: Cell<Timestamp>,
    next_id: Cell<u64>,
    bus: EventBus,
    clock: Rc<dyn Clock>,
}

/// A named reactive state container.
#[derive(Clone)]
pub struct Store {
    inner: Rc<Inner>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.inner.name)
            .field("options", &self.inner.options)
            .field("history", &self.inner.history.borrow().len())
            .field("watchers", &self.inner.watchers.borrow().len())
            .field("last_sync", &self.inner.last_sync.get())
            .finish()
    }
}

impl Store {
    /// Create a store. `initial` must be a JSON object; it becomes history
    /// entry #0 and the target of [`Store::reset`].
    pub fn new(
        name: impl Into<StoreName>,
        initial: Value,
        options: StoreOptions,
        bus: EventBus,
        clock: Rc<dyn Clock>,
    ) -> Result<Self> {
        let name = name.into();
        if !initial.is_object() {
            return Err(Error::InvalidState {
                store: name,
                got: path::kind_name(&initial).to_string(),
            });
        }

        let timestamp = clock.now();
        let mut history = History::new(options.max_history_size);
        history.push(HistoryEntry::new(
            Action::Init,
            "",
            None,
            Some(initial.clone()),
            timestamp,
        ));

        let store = Self {
            inner: Rc::new(Inner {
                name,
                options,
                state: RefCell::new(initial.clone()),
                initial,
                history: RefCell::new(history),
                computed: RefCell::new(ComputedEngine::new()),
                validators: RefCell::new(ValidatorRegistry::new()),
                middleware: RefCell::new(MiddlewareChain::new()),
                watchers: RefCell::new(Vec::new()),
                last_sync: Cell::new(0),
                next_id: Cell::new(0),
                bus,
                clock,
            }),
        };

        let init = store.event(Action::Init, "", None, Some(store.inner.initial.clone()), timestamp);
        store.inner.bus.emit(&init);
        Ok(store)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn options(&self) -> StoreOptions {
        self.inner.options
    }

    /// The bus this store emits onto.
    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Deep copy of the current state.
    pub fn state(&self) -> Value {
        self.inner.state.borrow().clone()
    }

    /// Value at `path`, or `None` if it does not exist.
    pub fn get(&self, path: &str) -> Option<Value> {
        path::get(&self.inner.state.borrow(), path).cloned()
    }

    /// Write `value` at `path` through the full pipeline.
    ///
    /// Fails with [`Error::Validation`] when a validator rejects the value
    /// and with [`Error::InvalidPath`] when the parent does not exist; the
    /// state is unchanged in both cases. A middleware veto is not an error.
    pub fn set(&self, path: &str, value: Value) -> Result<WriteOutcome> {
        let inner = &self.inner;

        if inner.options.validation_enabled {
            let rules = inner.validators.borrow().rules_for(path);
            if !rules.is_empty() {
                rules.check(&inner.name, &value)?;
            }
        }

        let chain = inner.middleware.borrow().clone();
        if !chain.is_empty() {
            let current = self.get(path);
            let pending = PendingWrite {
                store: &inner.name,
                path,
                old_value: current.as_ref(),
                new_value: &value,
            };
            if chain.run(&pending) == Flow::Veto {
                return Ok(WriteOutcome::Vetoed);
            }
        }

        let old_value = path::set(&mut inner.state.borrow_mut(), path, value.clone())?;
        let timestamp = inner.clock.now();
        self.record(HistoryEntry::new(
            Action::Set,
            path,
            old_value.clone(),
            Some(value.clone()),
            timestamp,
        ));
        self.commit(Action::Set, path, old_value, Some(value), timestamp);
        Ok(WriteOutcome::Committed)
    }

    /// Apply [`Store::set`] once per top-level key of `partial`, in key
    /// order. Not a deep merge. Stops at the first error; keys written
    /// before it stay written.
    pub fn update(&self, partial: Value) -> Result<()> {
        let Value::Object(entries) = partial else {
            return Err(Error::InvalidState {
                store: self.inner.name.clone(),
                got: path::kind_name(&partial).to_string(),
            });
        };
        for (key, value) in entries {
            self.set(&key, value)?;
        }
        Ok(())
    }

    /// Restore the initial state. History is kept; the reset itself is
    /// recorded and can be undone.
    pub fn reset(&self) {
        let initial = self.inner.initial.clone();
        let previous = self.replace_state(initial.clone());
        let timestamp = self.inner.clock.now();
        self.record(HistoryEntry::new(
            Action::Reset,
            "",
            Some(previous.clone()),
            Some(initial.clone()),
            timestamp,
        ));
        self.commit(Action::Reset, "", Some(previous), Some(initial), timestamp);
    }

    /// Revert the most recent change other than the initial snapshot.
    ///
    /// Returns `false` when there is nothing to undo. Redo is not supported.
    pub fn undo(&self) -> Result<bool> {
        let Some(entry) = self.inner.history.borrow().last_undoable().cloned() else {
            return Ok(false);
        };

        let current = if entry.path.is_empty() {
            let restored = entry
                .old_value
                .clone()
                .unwrap_or_else(|| self.inner.initial.clone());
            Some(self.replace_state(restored))
        } else {
            let mut state = self.inner.state.borrow_mut();
            match entry.old_value.clone() {
                Some(old) => path::set(&mut state, &entry.path, old)?,
                None => path::remove(&mut state, &entry.path),
            }
        };

        self.inner.history.borrow_mut().pop_undoable();
        let timestamp = self.inner.clock.now();
        self.commit(Action::Undo, &entry.path, current, entry.old_value, timestamp);
        Ok(true)
    }

    /// Whether [`Store::undo`] would do anything.
    pub fn can_undo(&self) -> bool {
        self.inner.history.borrow().last_undoable().is_some()
    }

    /// Capture the current state with the current time.
    pub fn serialize(&self) -> StoreSnapshot {
        StoreSnapshot::new(self.state(), self.inner.clock.now())
    }

    /// Replace the whole state with a copy of `snapshot.state`.
    pub fn hydrate(&self, snapshot: &StoreSnapshot) -> Result<()> {
        snapshot.validate()?;
        let next = snapshot.state.clone();
        let previous = self.replace_state(next.clone());
        let timestamp = self.inner.clock.now();
        self.record(HistoryEntry::new(
            Action::Hydrate,
            "",
            Some(previous.clone()),
            Some(next.clone()),
            timestamp,
        ));
        tracing::debug!(store = %self.inner.name, captured_at = snapshot.timestamp, "Store hydrated");
        self.commit(Action::Hydrate, "", Some(previous), Some(next), timestamp);
        Ok(())
    }

    /// Hydrate from another tab's snapshot if it is newer than the last one
    /// accepted. Returns whether the snapshot was applied.
    ///
    /// Last writer wins by capture time. Snapshots with the same or an older
    /// timestamp are ignored, so replaying a payload is harmless.
    pub fn synchronize(&self, snapshot: &StoreSnapshot) -> Result<bool> {
        let last = self.inner.last_sync.get();
        if snapshot.timestamp <= last {
            tracing::debug!(
                store = %self.inner.name,
                incoming = snapshot.timestamp,
                last_sync = last,
                "Ignoring stale snapshot"
            );
            return Ok(false);
        }
        self.hydrate(snapshot)?;
        self.inner.last_sync.set(snapshot.timestamp);
        Ok(true)
    }

    /// Capture time of the last snapshot accepted by [`Store::synchronize`].
    pub fn last_sync_timestamp(&self) -> Timestamp {
        self.inner.last_sync.get()
    }

    /// Copy of the history, oldest first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.inner.history.borrow().iter().cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.inner.history.borrow().len()
    }

    /// Watch every change to this store.
    pub fn subscribe(
        &self,
        callback: impl Fn(&StoreEvent) -> CallbackResult + 'static,
    ) -> Registration {
        self.add_watcher(None, Rc::new(callback))
    }

    /// Watch changes overlapping `prefix`: writes at or below it, and writes
    /// to any ancestor that replace it.
    pub fn subscribe_path(
        &self,
        prefix: impl Into<Path>,
        callback: impl Fn(&StoreEvent) -> CallbackResult + 'static,
    ) -> Registration {
        self.add_watcher(Some(prefix.into()), Rc::new(callback))
    }

    fn add_watcher(&self, filter: Option<Path>, callback: Rc<Watcher>) -> Registration {
        let id = self.next_id();
        self.inner.watchers.borrow_mut().push(WatcherEntry {
            id,
            filter,
            callback,
        });
        self.registration(RegistrationKind::Watcher, id)
    }

    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.borrow().len()
    }

    /// Register a computed value and evaluate it once.
    ///
    /// It is recomputed after changes overlapping any of `dependencies`, or
    /// after every change when `dependencies` is empty. Re-using a name
    /// replaces the earlier definition.
    pub fn add_computed<I, P>(
        &self,
        name: impl Into<String>,
        dependencies: I,
        compute: impl Fn(&Value) -> CallbackResult<Value> + 'static,
    ) -> Registration
    where
        I: IntoIterator<Item = P>,
        P: Into<Path>,
    {
        let name = name.into();
        let id = self.next_id();
        let compute: Rc<ComputeFn> = Rc::new(compute);
        let initial = compute(&self.inner.state.borrow());
        if let Err(err) = &initial {
            tracing::warn!(store = %self.inner.name, computed = %name, error = %err, "Computed value failed");
        }
        self.inner.computed.borrow_mut().insert(
            id,
            name,
            dependencies.into_iter().map(Into::into).collect(),
            compute,
            initial,
        );
        self.registration(RegistrationKind::Computed, id)
    }

    /// Current value of a computed property, recomputing first if its last
    /// evaluation failed. `None` if no such computed exists.
    pub fn get_computed(&self, name: &str) -> Option<Value> {
        let dirty = self.inner.computed.borrow().dirty(name);
        if let Some(pending) = dirty {
            self.evaluate(&pending, self.inner.clock.now());
        }
        self.inner.computed.borrow().cached(name).cloned()
    }

    /// Reject writes to `path` for which `predicate` returns `false`.
    pub fn add_validator(
        &self,
        path: impl Into<Path>,
        predicate: impl Fn(&Value) -> CallbackResult<bool> + 'static,
    ) -> Registration {
        let path = path.into();
        let message = validator::default_message(&path);
        self.add_validator_with_message(path, message, predicate)
    }

    /// Like [`Store::add_validator`] with a custom rejection message.
    pub fn add_validator_with_message(
        &self,
        path: impl Into<Path>,
        message: impl Into<String>,
        predicate: impl Fn(&Value) -> CallbackResult<bool> + 'static,
    ) -> Registration {
        let id = self.next_id();
        let predicate: Rc<Predicate> = Rc::new(predicate);
        self.inner
            .validators
            .borrow_mut()
            .add(id, path, message, predicate);
        self.registration(RegistrationKind::Validator, id)
    }

    /// Append a middleware to the chain.
    pub fn add_middleware(
        &self,
        middleware: impl Fn(&PendingWrite<'_>) -> CallbackResult<Flow> + 'static,
    ) -> Registration {
        let id = self.next_id();
        let middleware: Rc<Middleware> = Rc::new(middleware);
        self.inner.middleware.borrow_mut().push(id, middleware);
        self.registration(RegistrationKind::Middleware, id)
    }

    fn next_id(&self) -> u64 {
        let id = self.inner.next_id.get() + 1;
        self.inner.next_id.set(id);
        id
    }

    fn registration(&self, kind: RegistrationKind, id: u64) -> Registration {
        Registration {
            store: Rc::downgrade(&self.inner),
            kind,
            id,
        }
    }

    fn replace_state(&self, next: Value) -> Value {
        std::mem::replace(&mut *self.inner.state.borrow_mut(), next)
    }

    fn record(&self, entry: HistoryEntry) {
        self.inner.history.borrow_mut().push(entry);
    }

    fn event(
        &self,
        action: Action,
        path: &str,
        old_value: Option<Value>,
        new_value: Option<Value>,
        timestamp: Timestamp,
    ) -> StoreEvent {
        StoreEvent {
            store_name: self.inner.name.clone(),
            action,
            path: path.to_string(),
            old_value,
            new_value,
            timestamp,
        }
    }

    /// Announce a change that has already been applied and recorded.
    fn commit(
        &self,
        action: Action,
        path: &str,
        old_value: Option<Value>,
        new_value: Option<Value>,
        timestamp: Timestamp,
    ) {
        let event = self.event(action, path, old_value, new_value, timestamp);
        self.inner.bus.emit(&event);
        self.recompute(path, timestamp);
        self.notify_watchers(&event);
    }

    fn recompute(&self, changed: &str, timestamp: Timestamp) {
        let affected = self.inner.computed.borrow().affected_by(changed);
        for pending in affected {
            self.evaluate(&pending, timestamp);
        }
    }

    fn evaluate(&self, pending: &PendingCompute, timestamp: Timestamp) {
        let result = pending.evaluate(&self.inner.state.borrow());
        if let Err(err) = &result {
            tracing::warn!(
                store = %self.inner.name,
                computed = %pending.name,
                error = %err,
                "Computed value failed, keeping stale value"
            );
        }
        let change = self
            .inner
            .computed
            .borrow_mut()
            .store_result(pending, result);
        if let Some(ComputedChange {
            name,
            old_value,
            new_value,
        }) = change
        {
            let event = self.event(
                Action::Computed,
                &name,
                Some(old_value),
                Some(new_value),
                timestamp,
            );
            self.inner.bus.emit(&event);
        }
    }

    fn notify_watchers(&self, event: &StoreEvent) {
        let targets: Vec<(u64, Rc<Watcher>)> = self
            .inner
            .watchers
            .borrow()
            .iter()
            .filter(|w| {
                w.filter
                    .as_deref()
                    .map_or(true, |filter| path::overlaps(&event.path, filter))
            })
            .map(|w| (w.id, Rc::clone(&w.callback)))
            .collect();

        for (id, callback) in targets {
            if let Err(err) = callback(event) {
                tracing::warn!(
                    store = %self.inner.name,
                    path = %event.path,
                    watcher = id,
                    error = %err,
                    "Watcher failed"
                );
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegistrationKind {
    Watcher,
    Computed,
    Validator,
    Middleware,
}

/// Handle returned when registering a watcher, computed value, validator or
/// middleware. Dropping it leaves the registration in place; call
/// [`Registration::remove`] to undo it.
#[derive(Debug)]
pub struct Registration {
    store: Weak<Inner>,
    kind: RegistrationKind,
    id: u64,
}

impl Registration {
    /// Undo the registration. Returns `false` if it was already removed or
    /// the store no longer exists.
    pub fn remove(&self) -> bool {
        let Some(inner) = self.store.upgrade() else {
            return false;
        };
        match self.kind {
            RegistrationKind::Watcher => {
                let mut watchers = inner.watchers.borrow_mut();
                let before = watchers.len();
                watchers.retain(|w| w.id != self.id);
                watchers.len() != before
            }
            RegistrationKind::Computed => inner.computed.borrow_mut().remove(self.id),
            RegistrationKind::Validator => inner.validators.borrow_mut().remove(self.id),
            RegistrationKind::Middleware => inner.middleware.borrow_mut().remove(self.id),
        }
    }
}
