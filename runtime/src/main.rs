//! Tabstore - runs one dashboard tab's state engine until shutdown.
//!
//! Configuration comes from the environment (and `.env`). With
//! `STATE_STORAGE_FILE` set, state written by one run is restored by the
//! next.

use tabstore_runtime::{lifecycle, open_storage, Config, StateManager, TabEvent};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tabstore_runtime=debug,tabstore_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!(
        backend = %config.storage_backend,
        key = %config.persistence_key,
        "Starting tab"
    );

    let (storage, changes) = open_storage(&config, None)?;
    let manager = StateManager::new(config, storage);
    manager.init()?;

    manager.event_bus().subscribe(|event| {
        tracing::debug!(
            store = %event.store_name,
            action = %event.action,
            path = %event.path,
            "State changed"
        );
        Ok(())
    });

    // Ctrl-C closes the tab
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
        }
        let _ = tx.send(TabEvent::Unload);
    });

    lifecycle::run(&manager, rx, changes).await;

    Ok(())
}
