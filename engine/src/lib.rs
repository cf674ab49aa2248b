//! # Tabstore Engine
//!
//! A reactive state engine for multi-tab dashboards.
//!
//! This crate holds named JSON state containers that validate, intercept,
//! record and announce every change. It knows nothing about storage or tabs:
//! the runtime crate decides where snapshots go and when other tabs' changes
//! arrive.
//!
//! ## Design Principles
//!
//! - **No IO**: time comes from an injected [`Clock`], persistence is just
//!   [`StoreSnapshot`] values
//! - **Observable**: every committed change produces a history entry, a bus
//!   event and watcher calls
//! - **Single-threaded**: stores are `Rc` handles; callbacks may re-enter the
//!   store that called them
//!
//! ## Core Concepts
//!
//! ### Stores
//!
//! A [`Store`] owns one JSON object addressed by dot paths (`"user.name"`,
//! `"items.0"`). Writes go through [`Store::set`], which runs validators,
//! middleware, the write, history, the [`EventBus`], computed values and
//! watchers, in that order.
//!
//! ### History
//!
//! Each store keeps a bounded [`History`] whose first entry is the initial
//! state. [`Store::undo`] reverts the most recent change; the initial entry
//! itself is never undone.
//!
//! ### Synchronization
//!
//! [`Store::synchronize`] applies a snapshot from another tab only if its
//! timestamp is newer than the last one accepted (last writer wins).
//!
//! ## Quick Start
//!
//! ```rust
//! use std::rc::Rc;
//! use tabstore_engine::{EventBus, ManualClock, Store, StoreOptions};
//! use serde_json::json;
//!
//! let bus = EventBus::new();
//! let clock = Rc::new(ManualClock::new(1706745600000));
//! let cart = Store::new(
//!     "cart",
//!     json!({"items": [], "total": 0}),
//!     StoreOptions::default(),
//!     bus.clone(),
//!     clock,
//! )
//! .unwrap();
//!
//! cart.add_validator_with_message("total", "Total cannot be negative", |v| {
//!     Ok(v.as_f64().is_some_and(|n| n >= 0.0))
//! });
//! cart.add_computed("itemCount", ["items"], |state| {
//!     Ok(json!(state["items"].as_array().map_or(0, Vec::len)))
//! });
//!
//! cart.set("items", json!([{"id": 1, "price": 10}])).unwrap();
//! cart.set("total", json!(10)).unwrap();
//! assert_eq!(cart.get_computed("itemCount"), Some(json!(1)));
//!
//! assert!(cart.set("total", json!(-5)).is_err());
//! assert_eq!(cart.get("total"), Some(json!(10)));
//!
//! cart.undo().unwrap();
//! assert_eq!(cart.get("total"), Some(json!(0)));
//! ```
//!
//! ## Persistence
//!
//! Use [`Store::serialize`] and [`Store::hydrate`] with [`StoreSnapshot`].
//! [`PersistedState`] bundles the snapshots of several stores into one JSON
//! document with deterministic ordering.

pub mod clock;
pub mod computed;
pub mod error;
pub mod event;
pub mod history;
pub mod middleware;
pub mod path;
pub mod snapshot;
pub mod store;
pub mod validator;

// Re-export main types at crate root
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use error::{CallbackError, CallbackResult, Error};
pub use event::{EventBus, ListenerId, StoreEvent};
pub use history::{Action, History, HistoryEntry, DEFAULT_MAX_HISTORY};
pub use middleware::{Flow, PendingWrite};
pub use snapshot::{PersistedState, StoreSnapshot};
pub use store::{Registration, Store, StoreOptions, WriteOutcome};

/// Type aliases for clarity
pub type StoreName = String;
pub type Path = String;
pub type Timestamp = u64;
