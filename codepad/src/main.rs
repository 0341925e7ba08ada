use anyhow::Result;
use axum::{extract::DefaultBodyLimit, routing::get, serve, Router};
use clap::Parser;
use codepad::api::{self, AppState};
use codepad::config::Config;
use codepad::stats::StatsTracker;
use codepad_core::events::EventBus;
use codepad_core::project::ProjectDirectory;
use codepad_core::storage::NodeStore;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Headroom over the content limit for the JSON envelope.
const BODY_OVERHEAD: usize = 64 * 1024;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();

    let blobs = config.blob_storage().await?;
    let events = EventBus::new();
    let mut store = NodeStore::open_dir(
        config.nodes_dir(),
        blobs,
        events.clone(),
        config.store_config(),
    )?;
    let pruned = store.prune_orphans().await?;
    if !pruned.is_empty() {
        warn!(count = pruned.len(), "removed orphaned records left by an interrupted operation");
    }
    let store = Arc::new(RwLock::new(store));
    let projects = Arc::new(RwLock::new(ProjectDirectory::open(&config.data_dir)?));

    let stats = Arc::new(StatsTracker::new(store.clone(), config.stats_debounce()));
    stats.spawn(&events);

    let verifier = config.verifier();
    if verifier.is_none() {
        warn!("CODEPAD_JWT_SECRET not set, trusting the X-User-Id header");
    }
    let state = AppState {
        store,
        projects,
        stats,
        verifier,
    };
    let app = Router::new()
        .merge(api::router(state))
        .route("/health", get(|| async { "OK" }))
        .layer(DefaultBodyLimit::max(config.max_content_bytes + BODY_OVERHEAD))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(config.addr).await?;
    info!(addr = %config.addr, data_dir = %config.data_dir.display(), "listening");
    serve(listener, app.into_make_service()).await?;
    Ok(())
}
