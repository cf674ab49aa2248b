//! Integration tests for the tab event loop.
//!
//! Time is paused, so the persistence interval elapses instantly and
//! deterministically.

use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tabstore_engine::{Clock, ManualClock};
use tabstore_runtime::storage::ChangeReceiver;
use tabstore_runtime::{
    defaults, lifecycle, Config, StateManager, StorageArea, TabEvent, TabPersistentStorage,
};
use tokio::sync::mpsc;
use tokio::time::sleep;

fn open_tab(area: &Arc<StorageArea>, config: Config) -> (StateManager, ChangeReceiver) {
    let (storage, changes) = TabPersistentStorage::attach(Arc::clone(area));
    let clock: Rc<dyn Clock> = Rc::new(ManualClock::new(1_000));
    let manager = StateManager::with_clock(config, Box::new(storage), clock);
    manager.init().unwrap();
    (manager, changes)
}

fn every(secs: u64) -> Config {
    Config {
        persist_interval: Duration::from_secs(secs),
        ..Config::default()
    }
}

#[tokio::test(start_paused = true)]
async fn interval_persists_state() {
    let area = StorageArea::new_shared();
    let (tab, _changes) = open_tab(&area, every(30));
    tab.get_store(defaults::UI)
        .unwrap()
        .set("sidebarCollapsed", json!(true))
        .unwrap();

    let (tx, rx) = mpsc::unbounded_channel();
    let driver = async {
        sleep(Duration::from_secs(29)).await;
        let before_tick = area.get("app_state");

        sleep(Duration::from_secs(2)).await;
        let after_tick = area.get("app_state");

        tx.send(TabEvent::Unload).unwrap();
        (before_tick, after_tick)
    };

    let ((), (before_tick, after_tick)) = tokio::join!(lifecycle::run(&tab, rx, None), driver);
    assert!(before_tick.is_none());
    assert!(after_tick.unwrap().contains("\"sidebarCollapsed\":true"));
}

#[tokio::test(start_paused = true)]
async fn unload_flushes_latest_state() {
    let area = StorageArea::new_shared();
    let (tab, _changes) = open_tab(&area, every(3600));
    let prefs = tab.get_store(defaults::PREFERENCES).unwrap();

    let (tx, rx) = mpsc::unbounded_channel();
    let driver = async {
        sleep(Duration::from_secs(1)).await;
        prefs.set("timezone", json!("Europe/Oslo")).unwrap();
        tx.send(TabEvent::Unload).unwrap();
    };

    tokio::join!(lifecycle::run(&tab, rx, None), driver);
    assert!(area.get("app_state").unwrap().contains("Europe/Oslo"));
}

#[tokio::test(start_paused = true)]
async fn focus_reloads_shared_state() {
    let area = StorageArea::new_shared();
    let (tab_a, _changes_a) = open_tab(&area, every(3600));
    // B ignores the change feed, so only the focus reload can update it
    let (tab_b, _changes_b) = open_tab(&area, every(3600));

    let (tx, rx) = mpsc::unbounded_channel();
    let driver = async {
        tab_a
            .get_store(defaults::PREFERENCES)
            .unwrap()
            .set("theme", json!("system"))
            .unwrap();
        tab_a.persist_state().unwrap();
        sleep(Duration::from_millis(10)).await;
        let before_focus = tab_b
            .get_store(defaults::PREFERENCES)
            .unwrap()
            .get("theme");

        tx.send(TabEvent::Focus).unwrap();
        sleep(Duration::from_millis(10)).await;
        tx.send(TabEvent::Unload).unwrap();
        before_focus
    };

    let ((), before_focus) = tokio::join!(lifecycle::run(&tab_b, rx, None), driver);
    assert_eq!(before_focus, Some(json!("light")));
    assert_eq!(
        tab_b.get_store(defaults::PREFERENCES).unwrap().get("theme"),
        Some(json!("system"))
    );
}

#[tokio::test(start_paused = true)]
async fn storage_changes_are_applied_as_they_arrive() {
    let area = StorageArea::new_shared();
    let (tab_a, _changes_a) = open_tab(&area, every(3600));
    let (tab_b, changes_b) = open_tab(&area, every(3600));

    let seen = Rc::new(std::cell::Cell::new(0));
    let s = Rc::clone(&seen);
    tab_b
        .get_store(defaults::UI)
        .unwrap()
        .subscribe_path("activeView", move |_| {
            s.set(s.get() + 1);
            Ok(())
        });

    let (tx, rx) = mpsc::unbounded_channel();
    let driver = async {
        tab_a
            .get_store(defaults::UI)
            .unwrap()
            .set("activeView", json!("billing"))
            .unwrap();
        tab_a.persist_state().unwrap();
        sleep(Duration::from_millis(10)).await;
        let applied = tab_b
            .get_store(defaults::UI)
            .unwrap()
            .get("activeView");
        tx.send(TabEvent::Unload).unwrap();
        applied
    };

    let ((), applied) = tokio::join!(lifecycle::run(&tab_b, rx, Some(changes_b)), driver);
    assert_eq!(applied, Some(json!("billing")));
    assert_eq!(seen.get(), 1);
}
