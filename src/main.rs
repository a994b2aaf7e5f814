use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use ambulance_webapi::api::{self, AppState};
use ambulance_webapi::config::{Config, StoreKind};
use ambulance_webapi::model::Ambulance;
use ambulance_webapi::observability::{self, WaitingListGauges};
use ambulance_webapi::store::{run_compactor, LogStore, MemoryStore};
use ambulance_webapi::updater::{AmbulanceUpdater, SharedStore};

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("failed to register SIGTERM handler: {e}");
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    info!("shutdown signal received, draining requests");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    tracing_subscriber::fmt()
        .with_max_level(config.log_level())
        .init();
    observability::init(config.metrics_port)?;

    let shutdown = CancellationToken::new();
    let mut background = Vec::new();

    let store: SharedStore = match config.store {
        StoreKind::Log => {
            std::fs::create_dir_all(&config.data_dir)?;
            let store = Arc::new(LogStore::<Ambulance>::open(&config.log_path())?);
            background.push(tokio::spawn(run_compactor(
                store.clone(),
                config.compact_threshold,
                shutdown.clone(),
            )));
            store
        }
        StoreKind::Memory => Arc::new(MemoryStore::<Ambulance>::new()),
    };

    let gauges = Arc::new(WaitingListGauges::new());

    let app = api::router(AppState::new(AmbulanceUpdater::new(store, gauges.clone())));

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("ambulance-webapi listening on {addr}");
    info!("  store: {:?}", config.store);
    if config.store == StoreKind::Log {
        info!("  data_dir: {}", config.data_dir.display());
    }
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    for task in background {
        if let Err(e) = task.await {
            tracing::error!("background task failed: {e}");
        }
    }
    gauges.clear();

    info!("ambulance-webapi stopped");
    Ok(())
}
