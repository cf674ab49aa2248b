//! Stores every dashboard tab starts with.

use serde_json::{json, Value};
use tabstore_engine::validator::rules;

use crate::error::Result;
use crate::manager::{StateManager, StoreOverrides};

pub const PREFERENCES: &str = "preferences";
pub const UI: &str = "ui";
pub const ENTITIES: &str = "entities";
pub const BILLING: &str = "billing";

pub const THEMES: [&str; 3] = ["light", "dark", "system"];

pub fn preferences_state() -> Value {
    json!({
        "theme": "light",
        "language": "en",
        "notifications": {
            "email": true,
            "push": false
        },
        "timezone": "UTC"
    })
}

pub fn ui_state() -> Value {
    json!({
        "sidebarCollapsed": false,
        "activeView": "dashboard",
        "modals": {},
        "loading": {}
    })
}

pub fn entities_state() -> Value {
    json!({
        "users": {},
        "projects": {},
        "lastFetched": null
    })
}

pub fn billing_state() -> Value {
    json!({
        "plan": "free",
        "usage": {
            "apiCalls": 0,
            "storageBytes": 0
        },
        "limits": {
            "apiCalls": 1000,
            "storageBytes": 104857600
        }
    })
}

/// Percentage of the API call limit used, rounded to two decimals.
fn usage_percent(state: &Value) -> Value {
    let used = state["usage"]["apiCalls"].as_f64().unwrap_or(0.0);
    let limit = state["limits"]["apiCalls"].as_f64().unwrap_or(0.0);
    if limit <= 0.0 {
        return json!(0.0);
    }
    json!((used / limit * 10_000.0).round() / 100.0)
}

/// Create the default stores on `manager`.
pub fn register(manager: &StateManager) -> Result<()> {
    let preferences =
        manager.create_store(PREFERENCES, preferences_state(), StoreOverrides::default())?;
    preferences.add_validator_with_message(
        "theme",
        "Theme must be light, dark or system",
        rules::one_of(THEMES.iter().map(|t| json!(t)).collect()),
    );
    preferences.add_validator_with_message(
        "language",
        "Language must be a non-empty string",
        |value: &Value| Ok(value.as_str().is_some_and(|s| !s.is_empty())),
    );

    manager.create_store(UI, ui_state(), StoreOverrides::default())?;

    // Server data is refetched on load, so the cache is never persisted.
    manager.create_store(
        ENTITIES,
        entities_state(),
        StoreOverrides::default().persist(false),
    )?;

    let billing = manager.create_store(BILLING, billing_state(), StoreOverrides::default())?;
    for counter in ["usage.apiCalls", "usage.storageBytes"] {
        billing.add_validator_with_message(
            counter,
            format!("{counter} must be a non-negative number"),
            rules::non_negative(),
        );
    }
    billing.add_computed("usagePercent", ["usage", "limits"], |state| {
        Ok(usage_percent(state))
    });

    tracing::debug!(stores = ?manager.store_names(), "Default stores registered");
    Ok(())
}
