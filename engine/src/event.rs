//! Process-wide change notifications.
//!
//! Every store of a registry emits onto one shared [`EventBus`]. UI
//! collaborators subscribe to it to learn about committed changes without
//! holding a handle to each store.

use crate::{error::CallbackResult, Action, Path, StoreName, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;

/// A change committed by a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreEvent {
    pub store_name: StoreName,
    pub action: Action,
    /// Changed path, the computed name for `computed` events, or empty for
    /// whole-state changes
    pub path: Path,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub timestamp: Timestamp,
}

/// Identifier returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Callback invoked for every event a listener receives.
pub type Listener = dyn Fn(&StoreEvent) -> CallbackResult;

struct Subscription {
    id: ListenerId,
    store: Option<StoreName>,
    listener: Rc<Listener>,
}

#[derive(Default)]
struct BusInner {
    subscriptions: Vec<Subscription>,
    next_id: u64,
    emitted: u64,
}

/// Shared publish/subscribe channel. Cloning yields another handle to the
/// same bus.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Rc<RefCell<BusInner>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("EventBus")
            .field("listeners", &inner.subscriptions.len())
            .field("emitted", &inner.emitted)
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every event from every store.
    pub fn subscribe(&self, listener: impl Fn(&StoreEvent) -> CallbackResult + 'static) -> ListenerId {
        self.register(None, Rc::new(listener))
    }

    /// Receive only events emitted by the store named `store`.
    pub fn subscribe_store(
        &self,
        store: impl Into<StoreName>,
        listener: impl Fn(&StoreEvent) -> CallbackResult + 'static,
    ) -> ListenerId {
        self.register(Some(store.into()), Rc::new(listener))
    }

    fn register(&self, store: Option<StoreName>, listener: Rc<Listener>) -> ListenerId {
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = ListenerId(inner.next_id);
        inner.subscriptions.push(Subscription {
            id,
            store,
            listener,
        });
        id
    }

    /// Remove a listener. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.subscriptions.len();
        inner.subscriptions.retain(|s| s.id != id);
        inner.subscriptions.len() != before
    }

    /// Deliver `event` to every matching listener in registration order.
    ///
    /// The listener list is snapshotted first, so listeners may subscribe or
    /// unsubscribe (themselves included) while being notified. A failing
    /// listener is logged and does not stop delivery to the rest.
    pub fn emit(&self, event: &StoreEvent) {
        let targets: Vec<(ListenerId, Rc<Listener>)> = {
            let mut inner = self.inner.borrow_mut();
            inner.emitted += 1;
            inner
                .subscriptions
                .iter()
                .filter(|s| s.store.as_deref().map_or(true, |name| name == event.store_name))
                .map(|s| (s.id, Rc::clone(&s.listener)))
                .collect()
        };

        for (id, listener) in targets {
            if let Err(err) = listener(event) {
                tracing::warn!(
                    listener = id.0,
                    store = %event.store_name,
                    action = %event.action,
                    path = %event.path,
                    error = %err,
                    "Event bus listener failed"
                );
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.borrow().subscriptions.len()
    }

    /// Number of events emitted since the bus was created.
    pub fn emitted_count(&self) -> u64 {
        self.inner.borrow().emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    fn event(store: &str) -> StoreEvent {
        StoreEvent {
            store_name: store.into(),
            action: Action::Set,
            path: "theme".into(),
            old_value: Some(json!("light")),
            new_value: Some(json!("dark")),
            timestamp: 1000,
        }
    }

    #[test]
    fn emit_reaches_all_listeners_in_order() {
        let bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        for n in 0..3 {
            let log = Rc::clone(&log);
            bus.subscribe(move |_| {
                log.borrow_mut().push(n);
                Ok(())
            });
        }

        bus.emit(&event("prefs"));
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert_eq!(bus.emitted_count(), 1);
    }

    #[test]
    fn store_filter() {
        let bus = EventBus::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        bus.subscribe_store("cart", move |_| {
            h.set(h.get() + 1);
            Ok(())
        });

        bus.emit(&event("prefs"));
        bus.emit(&event("cart"));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn failing_listener_does_not_block_others() {
        let bus = EventBus::new();
        let reached = Rc::new(Cell::new(false));
        bus.subscribe(|_| Err("listener exploded".into()));
        let r = Rc::clone(&reached);
        bus.subscribe(move |_| {
            r.set(true);
            Ok(())
        });

        bus.emit(&event("prefs"));
        assert!(reached.get());
    }

    #[test]
    fn listener_can_unsubscribe_itself_during_emit() {
        let bus = EventBus::new();
        let slot: Rc<Cell<Option<ListenerId>>> = Rc::new(Cell::new(None));
        let calls = Rc::new(Cell::new(0));

        let handle = bus.clone();
        let s = Rc::clone(&slot);
        let c = Rc::clone(&calls);
        let id = bus.subscribe(move |_| {
            c.set(c.get() + 1);
            if let Some(me) = s.get() {
                handle.unsubscribe(me);
            }
            Ok(())
        });
        slot.set(Some(id));

        bus.emit(&event("prefs"));
        bus.emit(&event("prefs"));
        assert_eq!(calls.get(), 1);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn unsubscribe_twice() {
        let bus = EventBus::new();
        let id = bus.subscribe(|_| Ok(()));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
    }

    #[test]
    fn event_wire_format() {
        let json = serde_json::to_value(event("prefs")).unwrap();
        assert_eq!(
            json,
            json!({
                "storeName": "prefs",
                "action": "set",
                "path": "theme",
                "oldValue": "light",
                "newValue": "dark",
                "timestamp": 1000
            })
        );
    }
}
