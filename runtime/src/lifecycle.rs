//! Event loop driving one tab.
//!
//! Everything that happens to a tab outside of direct store calls arrives
//! here: the periodic persistence tick, focus and unload signals from the
//! host, and storage changes made by other tabs. Events are handled one at
//! a time, so they interleave between store calls but never inside one.

use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::manager::StateManager;
use crate::storage::{ChangeReceiver, StorageChange};

/// Signals from the host page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabEvent {
    /// The tab became visible again
    Focus,
    /// The tab is about to close
    Unload,
}

/// Sender for host signals.
pub type TabEventSender = mpsc::UnboundedSender<TabEvent>;

/// Receiver for host signals.
pub type TabEventReceiver = mpsc::UnboundedReceiver<TabEvent>;

/// Run the tab until it unloads.
///
/// Persists every `config.persist_interval`, reloads on focus, applies
/// other tabs' changes as they arrive, and flushes once on unload. If the
/// event sender is dropped the tab is treated as unloaded. Pass `None` for
/// `changes` when the backend has no cross-tab feed.
pub async fn run(
    manager: &StateManager,
    mut events: TabEventReceiver,
    mut changes: Option<ChangeReceiver>,
) {
    let period = manager.config().persist_interval;
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        interval_secs = period.as_secs(),
        cross_tab = changes.is_some(),
        "Tab lifecycle started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => manager.on_interval(),

            event = events.recv() => match event {
                Some(TabEvent::Focus) => manager.on_focus(),
                Some(TabEvent::Unload) | None => {
                    manager.on_unload();
                    break;
                }
            },

            change = next_change(&mut changes) => match change {
                Some(change) => manager.on_storage_change(&change),
                None => {
                    tracing::debug!("Shared storage feed closed");
                    changes = None;
                }
            },
        }
    }

    tracing::info!("Tab lifecycle stopped");
}

/// Next cross-tab change, or never if there is no feed.
async fn next_change(changes: &mut Option<ChangeReceiver>) -> Option<StorageChange> {
    match changes {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
