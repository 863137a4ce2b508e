// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod article;
pub mod cache;
pub mod categorize;
pub mod config;
pub mod dedup;
pub mod error;
pub mod flagging;
pub mod ingest;
pub mod metrics;
pub mod pipeline;
pub mod verify;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::article::{Article, Category};
pub use crate::error::{AdapterError, PipelineError, ScrapeError};
pub use crate::pipeline::NewsService;

use std::sync::Arc;

use axum::Router;
use tracing::info;

use crate::config::PipelineConfig;
use crate::metrics::Metrics;

/// HTTP surface for a ready service: API routes plus `/metrics`.
pub fn build_app(service: Arc<NewsService>, metrics: &Metrics) -> Router {
    router(AppState::new(service)).merge(metrics.router())
}

/// Full application from the environment: service, recorder, background refresh.
pub async fn app() -> anyhow::Result<Router> {
    let cfg = PipelineConfig::from_env();
    let metrics = Metrics::init(cfg.cache_ttl.as_secs())?;
    let service = Arc::new(NewsService::from_config(&cfg));

    ingest::scheduler::spawn_refresh_scheduler(service.clone(), cfg.refresh_interval);
    info!(
        interval_secs = cfg.refresh_interval.as_secs(),
        flag_threshold = cfg.flag_threshold,
        "news service ready"
    );

    Ok(build_app(service, &metrics))
}
