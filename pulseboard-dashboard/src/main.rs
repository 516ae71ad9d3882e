/**
 * PULSEBOARD DASHBOARD - Process entry point
 *
 * ROLE: loads configuration, starts the live update scheduler against the
 * monitoring backend and serves the dashboard API until Ctrl-C.
 *
 * SHUTDOWN: the HTTP server drains first, then the scheduler is cancelled
 * and its live channel closed.
 */

mod health;
mod http;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use pulseboard_core::filter::new_filter_store;
use pulseboard_core::store::new_dashboard_store;
use pulseboard_core::{Config, KomariClient, LinkState, LiveTransport, Scheduler, TelemetrySource, WsTransport};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pulseboard=info")))
        .init();

    let config = Config::load().await;
    info!("Backend: {} (transport: {:?})", config.backend.base_url, config.live.transport);

    let client = KomariClient::new(&config.backend).context("Invalid backend configuration")?;
    let source: Arc<dyn TelemetrySource> = Arc::new(client);
    let transport: Arc<dyn LiveTransport> =
        Arc::new(WsTransport::new(&config.backend.base_url, config.live.transport));

    let store = new_dashboard_store();
    let filter = new_filter_store();

    let last_link = Mutex::new(LinkState::Connecting);
    let _link_log = store.subscribe(move |state| {
        let mut last = last_link.lock();
        if *last != state.link {
            info!("Live link {:?} -> {:?} (reconnects: {})", *last, state.link, state.reconnects);
            *last = state.link;
        }
    });

    let scheduler = Scheduler::new(Arc::clone(&source), transport, store.clone(), config.live.clone()).spawn();

    let app = http::build_router(http::AppState::new(store, filter, source, config.latency.clone()));
    let listener = TcpListener::bind(&config.http.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.http.listen))?;
    info!("Dashboard listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    scheduler.shutdown().await;
    info!("Dashboard stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Ctrl-C handler unavailable: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
