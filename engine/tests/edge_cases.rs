//! Edge case tests for tabstore-engine
//!
//! These tests drive stores through the public API only and cover boundary
//! conditions, re-entrancy and multi-store interactions.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::{json, Value};
use tabstore_engine::{
    validator::rules, Action, Clock, Error, EventBus, Flow, ManualClock, PersistedState,
    Registration, Store, StoreEvent, StoreOptions, StoreSnapshot,
};

fn clock_at(now: u64) -> Rc<ManualClock> {
    Rc::new(ManualClock::new(now))
}

fn store(name: &str, initial: Value, bus: &EventBus, clock: &Rc<ManualClock>) -> Store {
    let clock: Rc<dyn Clock> = clock.clone();
    Store::new(name, initial, StoreOptions::default(), bus.clone(), clock).unwrap()
}

fn actions(events: &RefCell<Vec<StoreEvent>>) -> Vec<(Action, String)> {
    events
        .borrow()
        .iter()
        .map(|e| (e.action, e.path.clone()))
        .collect()
}

// ============================================================================
// Walkthroughs
// ============================================================================

#[test]
fn cart_validation_and_undo() {
    let bus = EventBus::new();
    let clock = clock_at(1000);
    let cart = store("cart", json!({"items": [], "total": 0}), &bus, &clock);

    cart.set("total", json!(10)).unwrap();
    assert_eq!(cart.get("total"), Some(json!(10)));
    assert_eq!(cart.history_len(), 2);

    cart.add_validator("total", rules::non_negative());
    let err = cart.set("total", json!(-5)).unwrap_err();
    assert!(matches!(err, Error::Validation { ref path, .. } if path == "total"));
    assert_eq!(cart.get("total"), Some(json!(10)));

    assert!(cart.undo().unwrap());
    assert_eq!(cart.get("total"), Some(json!(0)));
}

#[test]
fn two_stores_exchange_snapshots() {
    let clock = clock_at(1000);
    let tab_a = store("preferences", json!({"theme": "light"}), &EventBus::new(), &clock);
    let tab_b = store("preferences", json!({"theme": "light"}), &EventBus::new(), &clock);

    tab_a.set("theme", json!("dark")).unwrap();
    clock.set(1500);
    let t1 = tab_a.serialize();

    assert!(tab_b.synchronize(&t1).unwrap());
    assert_eq!(tab_b.get("theme"), Some(json!("dark")));

    // A second delivery of the same payload is a no-op.
    assert!(!tab_b.synchronize(&t1).unwrap());
    assert_eq!(tab_b.history_len(), 2);
}

#[test]
fn persisted_state_restores_many_stores() {
    let bus = EventBus::new();
    let clock = clock_at(42);
    let prefs = store("preferences", json!({"theme": "light"}), &bus, &clock);
    let ui = store("ui", json!({"activeView": "dashboard"}), &bus, &clock);
    prefs.set("theme", json!("system")).unwrap();
    ui.set("activeView", json!("billing")).unwrap();

    let persisted: PersistedState = [&prefs, &ui]
        .into_iter()
        .map(|s| (s.name().to_string(), s.serialize()))
        .collect();
    let json = persisted.to_json().unwrap();

    let restored = PersistedState::from_json(&json).unwrap();
    let fresh_prefs = store("preferences", json!({"theme": "light"}), &bus, &clock);
    fresh_prefs
        .hydrate(restored.get("preferences").unwrap())
        .unwrap();
    assert_eq!(fresh_prefs.get("theme"), Some(json!("system")));
    assert_eq!(restored.get("ui").unwrap().state["activeView"], "billing");
}

// ============================================================================
// Path Edge Cases
// ============================================================================

#[test]
fn malformed_paths_are_rejected() {
    let clock = clock_at(0);
    let s = store("s", json!({"a": {"b": 1}}), &EventBus::new(), &clock);

    for bad in ["", "a.", ".a", "a..b"] {
        let result = s.set(bad, json!(1));
        assert!(
            matches!(result, Err(Error::InvalidPath { .. })),
            "expected InvalidPath for {bad:?}"
        );
    }
    assert_eq!(s.history_len(), 1);
}

#[test]
fn writing_through_a_scalar_fails() {
    let clock = clock_at(0);
    let s = store("s", json!({"a": 5}), &EventBus::new(), &clock);
    assert!(matches!(
        s.set("a.b", json!(1)),
        Err(Error::InvalidPath { .. })
    ));
    assert_eq!(s.get("a"), Some(json!(5)));
}

#[test]
fn array_elements() {
    let clock = clock_at(0);
    let s = store("s", json!({"items": ["x", "y"]}), &EventBus::new(), &clock);

    s.set("items.1", json!("Y")).unwrap();
    s.set("items.2", json!("z")).unwrap();
    assert_eq!(s.get("items"), Some(json!(["x", "Y", "z"])));
    assert!(s.set("items.9", json!("far")).is_err());

    // Undoing the append removes the element again.
    s.undo().unwrap();
    assert_eq!(s.get("items"), Some(json!(["x", "Y"])));
}

#[test]
fn numeric_keys_on_objects() {
    let clock = clock_at(0);
    let s = store("s", json!({"byId": {}}), &EventBus::new(), &clock);
    s.set("byId.42", json!({"name": "Alice"})).unwrap();
    assert_eq!(s.get("byId.42.name"), Some(json!("Alice")));
}

#[test]
fn unicode_keys_and_values() {
    let clock = clock_at(0);
    let s = store("s", json!({}), &EventBus::new(), &clock);
    for (key, value) in [("名前", "日本語テスト"), ("привет", "мир"), ("emoji", "🎉🚀")] {
        s.set(key, json!(value)).unwrap();
        assert_eq!(s.get(key), Some(json!(value)));
    }
}

#[test]
fn watcher_prefix_respects_segment_boundaries() {
    let clock = clock_at(0);
    let s = store("s", json!({"user": {}, "username": ""}), &EventBus::new(), &clock);
    let hits = Rc::new(RefCell::new(Vec::new()));
    let h = Rc::clone(&hits);
    s.subscribe_path("user", move |e| {
        h.borrow_mut().push(e.path.clone());
        Ok(())
    });

    s.set("username", json!("bob")).unwrap();
    s.set("user.id", json!(7)).unwrap();
    s.set("user", json!({})).unwrap();

    assert_eq!(*hits.borrow(), vec!["user.id", "user"]);
}

#[test]
fn ancestor_write_reaches_descendant_watchers() {
    let clock = clock_at(0);
    let s = store(
        "s",
        json!({"notifications": {"email": true}}),
        &EventBus::new(),
        &clock,
    );
    let hits = Rc::new(Cell::new(0));
    let h = Rc::clone(&hits);
    s.subscribe_path("notifications.email", move |_| {
        h.set(h.get() + 1);
        Ok(())
    });
    s.set("notifications", json!({"email": false})).unwrap();
    assert_eq!(hits.get(), 1);
}

// ============================================================================
// Numeric Edge Cases
// ============================================================================

#[test]
fn large_and_fractional_numbers() {
    let clock = clock_at(0);
    let s = store("billing", json!({"usage": 0}), &EventBus::new(), &clock);
    s.add_validator("usage", rules::non_negative());

    s.set("usage", json!(u64::MAX)).unwrap();
    assert_eq!(s.get("usage"), Some(json!(u64::MAX)));
    s.set("usage", json!(0.5)).unwrap();
    assert!(s.set("usage", json!(-0.001)).is_err());
    assert!(s.set("usage", json!("12")).is_err());
}

// ============================================================================
// History Edge Cases
// ============================================================================

#[test]
fn history_of_one() {
    let clock = clock_at(0);
    let s = Store::new(
        "s",
        json!({"n": 0}),
        StoreOptions {
            max_history_size: 1,
            ..StoreOptions::default()
        },
        EventBus::new(),
        clock,
    )
    .unwrap();

    s.set("n", json!(1)).unwrap();
    s.set("n", json!(2)).unwrap();
    assert_eq!(s.history_len(), 1);

    assert!(s.undo().unwrap());
    assert_eq!(s.get("n"), Some(json!(1)));
    assert!(!s.undo().unwrap());
    assert_eq!(s.history_len(), 0);

    s.reset();
    assert_eq!(s.get("n"), Some(json!(0)));
}

#[test]
fn zero_history_size_is_clamped() {
    let clock = clock_at(0);
    let s = Store::new(
        "s",
        json!({}),
        StoreOptions {
            max_history_size: 0,
            ..StoreOptions::default()
        },
        EventBus::new(),
        clock,
    )
    .unwrap();
    assert_eq!(s.history_len(), 1);
    s.set("a", json!(1)).unwrap();
    assert_eq!(s.history_len(), 1);
}

#[test]
fn undo_of_hydrate_restores_previous_state() {
    let clock = clock_at(0);
    let s = store("s", json!({"a": 1}), &EventBus::new(), &clock);
    s.hydrate(&StoreSnapshot::new(json!({"b": 2}), 10)).unwrap();
    s.undo().unwrap();
    assert_eq!(s.state(), json!({"a": 1}));
}

#[test]
fn timestamps_come_from_the_clock() {
    let clock = clock_at(100);
    let s = store("s", json!({}), &EventBus::new(), &clock);
    clock.set(250);
    s.set("a", json!(1)).unwrap();
    let history = s.history();
    assert_eq!(history[0].timestamp, 100);
    assert_eq!(history[1].timestamp, 250);
}

// ============================================================================
// Event Bus Edge Cases
// ============================================================================

#[test]
fn bus_sees_every_store_in_order() {
    let bus = EventBus::new();
    let clock = clock_at(0);
    let events = Rc::new(RefCell::new(Vec::new()));
    let e = Rc::clone(&events);
    bus.subscribe(move |event| {
        e.borrow_mut().push(event.clone());
        Ok(())
    });

    let a = store("a", json!({}), &bus, &clock);
    let b = store("b", json!({}), &bus, &clock);
    a.set("x", json!(1)).unwrap();
    b.reset();

    let seen: Vec<(String, Action)> = events
        .borrow()
        .iter()
        .map(|e| (e.store_name.clone(), e.action))
        .collect();
    assert_eq!(
        seen,
        vec![
            ("a".to_string(), Action::Init),
            ("b".to_string(), Action::Init),
            ("a".to_string(), Action::Set),
            ("b".to_string(), Action::Reset),
        ]
    );
}

#[test]
fn store_scoped_bus_listener() {
    let bus = EventBus::new();
    let clock = clock_at(0);
    let a = store("a", json!({}), &bus, &clock);
    let b = store("b", json!({}), &bus, &clock);

    let count = Rc::new(Cell::new(0));
    let c = Rc::clone(&count);
    bus.subscribe_store("b", move |_| {
        c.set(c.get() + 1);
        Ok(())
    });
    a.set("x", json!(1)).unwrap();
    b.set("x", json!(1)).unwrap();
    assert_eq!(count.get(), 1);
}

#[test]
fn failing_bus_listener_does_not_stop_the_write() {
    let bus = EventBus::new();
    bus.subscribe(|_| Err("listener crashed".into()));
    let clock = clock_at(0);
    let s = store("s", json!({}), &bus, &clock);
    assert!(s.set("a", json!(1)).unwrap().is_committed());
    assert_eq!(s.get("a"), Some(json!(1)));
}

#[test]
fn bus_announces_before_watchers_and_after_computed() {
    let bus = EventBus::new();
    let clock = clock_at(0);
    let s = store("s", json!({"n": 1}), &bus, &clock);
    s.add_computed("double", ["n"], |state| {
        Ok(json!(state["n"].as_i64().unwrap_or(0) * 2))
    });

    let log = Rc::new(RefCell::new(Vec::new()));
    let l = Rc::clone(&log);
    bus.subscribe(move |e| {
        l.borrow_mut().push(format!("bus:{}", e.action));
        Ok(())
    });
    let l = Rc::clone(&log);
    s.subscribe(move |e| {
        l.borrow_mut().push(format!("watcher:{}", e.action));
        Ok(())
    });

    s.set("n", json!(2)).unwrap();
    assert_eq!(
        *log.borrow(),
        vec!["bus:set", "bus:computed", "watcher:set"]
    );
}

// ============================================================================
// Re-entrancy
// ============================================================================

#[test]
fn nested_writes_complete_before_outer_watchers_continue() {
    let clock = clock_at(0);
    let s = store("s", json!({"a": 0, "b": 0}), &EventBus::new(), &clock);
    let events = Rc::new(RefCell::new(Vec::new()));

    let handle = s.clone();
    s.subscribe_path("a", move |_| {
        handle.set("b", json!(1))?;
        Ok(())
    });
    let e = Rc::clone(&events);
    s.subscribe(move |event| {
        e.borrow_mut().push(event.clone());
        Ok(())
    });

    s.set("a", json!(1)).unwrap();
    assert_eq!(
        actions(&events),
        vec![(Action::Set, "b".to_string()), (Action::Set, "a".to_string())]
    );
    assert_eq!(s.get("b"), Some(json!(1)));
}

#[test]
fn computed_may_read_other_stores() {
    let bus = EventBus::new();
    let clock = clock_at(0);
    let billing = store("billing", json!({"limit": 100}), &bus, &clock);
    let usage = store("usage", json!({"calls": 10}), &bus, &clock);

    let limits = billing.clone();
    usage.add_computed("percent", ["calls"], move |state| {
        let limit = limits.get("limit").and_then(|v| v.as_f64()).unwrap_or(1.0);
        Ok(json!(state["calls"].as_f64().unwrap_or(0.0) / limit * 100.0))
    });
    usage.set("calls", json!(50)).unwrap();
    assert_eq!(usage.get_computed("percent"), Some(json!(50.0)));
}

#[test]
fn registration_removed_from_inside_middleware() {
    let clock = clock_at(0);
    let s = store("s", json!({"n": 0}), &EventBus::new(), &clock);
    let slot: Rc<RefCell<Option<Registration>>> = Rc::new(RefCell::new(None));
    let inner = Rc::clone(&slot);
    let reg = s.add_middleware(move |_| {
        if let Some(reg) = inner.borrow_mut().take() {
            reg.remove();
        }
        Ok(Flow::Veto)
    });
    *slot.borrow_mut() = Some(reg);

    // First write is vetoed and removes the middleware; the second goes through.
    assert!(!s.set("n", json!(1)).unwrap().is_committed());
    assert!(s.set("n", json!(2)).unwrap().is_committed());
}
