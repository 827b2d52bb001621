//! tagsync tag controller
//!
//! Watches service objects in an external inventory and reconciles
//! their state into an external tag API. See the library crate for the
//! pipeline architecture.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tagsync_controller::adapter::EventAdapter;
use tagsync_controller::client::InventoryClient;
use tagsync_controller::config::Config;
use tagsync_controller::controller::Controller;
use tagsync_controller::handler::{Handler, LogHandler, TagApiHandler};
use tagsync_controller::store::MemoryStore;
use tagsync_controller::watch::Watcher;
use tagsync_workqueue::WorkQueue;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting tagsync controller");

    let config = Config::from_env()?;
    info!(
        inventory_url = %config.inventory_url,
        tag_api_url = %config.tag_api_url,
        workers = config.workers,
        "Configuration loaded"
    );

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Shared pipeline state
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(WorkQueue::new(config.backoff()));

    // Watcher feeds the cache and the queue
    let watcher = Watcher::new(
        InventoryClient::new(&config),
        Arc::clone(&store),
        EventAdapter::new(Arc::clone(&queue)),
        config.poll_interval(),
    );
    let watcher_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move { watcher.run(shutdown_rx).await }
    });

    // Handler: tag API when configured, logging otherwise
    let handler: Arc<dyn Handler> = if config.tag_api_url.is_empty() {
        info!("No tag API configured, running with logging handler");
        Arc::new(LogHandler)
    } else {
        Arc::new(TagApiHandler::new(&config))
    };

    let controller = Controller::new(queue, store, handler);
    let mut controller_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        let workers = config.workers;
        let sync_timeout = config.sync_timeout();
        async move { controller.run(workers, sync_timeout, shutdown_rx).await }
    });

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = &mut controller_handle => {
            match result {
                Ok(Ok(())) => info!("Controller exited"),
                Ok(Err(e)) => {
                    error!(error = %e, "Controller failed");
                    return Err(e);
                }
                Err(e) => error!(error = %e, "Controller task panicked"),
            }
            return Ok(());
        }
    }

    // Signal shutdown to the watcher and workers
    let _ = shutdown_tx.send(true);

    match controller_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Controller failed during shutdown"),
        Err(e) => error!(error = %e, "Controller task panicked"),
    }
    let _ = watcher_handle.await;

    info!("Shutdown complete");
    Ok(())
}
