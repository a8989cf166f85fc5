//! Read-only status endpoint.
//!
//! Handlers only read the immutable configuration and the atomic
//! counters, never the collection state itself.

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::{
    config::{Config, SamplingMode},
    metrics::{MetricsSnapshot, RuntimeMetrics},
};

/// Shared handler state.
#[derive(Clone)]
pub struct StatusState {
    pub config: Arc<Config>,
    pub metrics: Arc<RuntimeMetrics>,
    pub proxy_count: usize,
}

#[derive(Debug, Serialize)]
pub struct Filters {
    pub min_players: i64,
    pub max_players: i64,
    pub min_forward: usize,
}

/// Body of `GET /`.
///
/// Proxy URIs and the downstream URL are left out, they may carry
/// credentials.
#[derive(Debug, Serialize)]
pub struct StatusSnapshot {
    pub status: &'static str,
    pub game: String,
    pub proxy_count: usize,
    pub concurrency: usize,
    pub max_pages: usize,
    pub skip_pages: usize,
    pub sampling_mode: SamplingMode,
    pub cursor_cache_size: usize,
    pub dry_run: bool,
    pub filters: Filters,
    pub counters: MetricsSnapshot,
}

impl StatusState {
    pub fn snapshot(&self) -> StatusSnapshot {
        let cfg = &self.config;
        StatusSnapshot {
            status: "collector online",
            game: cfg.game_id.clone(),
            proxy_count: self.proxy_count,
            concurrency: cfg.concurrency,
            max_pages: cfg.max_pages,
            skip_pages: cfg.skip_pages,
            sampling_mode: cfg.sampling_mode,
            cursor_cache_size: cfg.cursor_cache_size,
            dry_run: cfg.main_api_url.trim().is_empty(),
            filters: Filters {
                min_players: cfg.min_players,
                max_players: cfg.max_players,
                min_forward: cfg.min_forward,
            },
            counters: self.metrics.snapshot(),
        }
    }
}

pub fn router(state: StatusState) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/health", get(health))
        .with_state(state)
}

async fn status(State(state): State<StatusState>) -> Json<StatusSnapshot> {
    Json(state.snapshot())
}

async fn health() -> &'static str {
    "ok"
}

/// Serves the status router until the process exits.
pub async fn serve(state: StatusState, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    log::info!("[STATUS] listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}
