use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use shuttle_axum::axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::error::{ConfigError, PipelineError};
use crate::ingest::CycleReport;
use crate::pipeline::{
    BatchVerified, CategoryCounts, FlaggedPage, NewsPage, NewsService, VerifiedArticle, VerifyRequest,
};
use crate::verify::CredibilityView;

/// Default page size of `/news/breaking`.
const BREAKING_LIMIT: usize = 20;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<NewsService>,
}

impl AppState {
    pub fn new(service: Arc<NewsService>) -> Self {
        Self { service }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/news", get(news))
        .route("/news/flagged", get(flagged))
        .route("/news/verify", post(verify))
        .route("/news/verify/batch", post(verify_batch))
        .route("/news/categories", get(categories))
        .route("/news/breaking", get(breaking))
        .route("/news/search", get(search))
        .route("/news/sources/credibility", get(source_credibility))
        .route("/admin/refresh", post(admin_refresh))
        .route("/admin/reload-categories", get(admin_reload_categories))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        match self {
            PipelineError::TemporarilyUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "temporarily_unavailable" })),
            )
                .into_response(),
            PipelineError::InvalidRequest(detail) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid_request", "detail": detail })),
            )
                .into_response(),
        }
    }
}

impl IntoResponse for ConfigError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "config", "detail": self.to_string() })),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
struct NewsQuery {
    category: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SourceQuery {
    #[serde(default)]
    source: String,
}

async fn news(State(state): State<AppState>, Query(q): Query<NewsQuery>) -> Result<Json<NewsPage>, PipelineError> {
    let page = state.service.latest(q.category.as_deref(), q.limit).await?;
    Ok(Json(page))
}

async fn flagged(State(state): State<AppState>, Query(q): Query<LimitQuery>) -> Result<Json<FlaggedPage>, PipelineError> {
    Ok(Json(state.service.flagged(q.limit)?))
}

async fn verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerifiedArticle>, PipelineError> {
    Ok(Json(state.service.verify_request(req).await?))
}

/// Body is a bare JSON array of verify requests.
async fn verify_batch(
    State(state): State<AppState>,
    Json(reqs): Json<Vec<VerifyRequest>>,
) -> Result<Json<BatchVerified>, PipelineError> {
    Ok(Json(state.service.verify_batch(reqs).await?))
}

async fn categories(State(state): State<AppState>) -> Result<Json<CategoryCounts>, PipelineError> {
    Ok(Json(state.service.category_counts().await?))
}

async fn breaking(State(state): State<AppState>, Query(q): Query<LimitQuery>) -> Result<Json<NewsPage>, PipelineError> {
    let page = state.service.breaking(Some(q.limit.unwrap_or(BREAKING_LIMIT))).await?;
    Ok(Json(page))
}

async fn search(State(state): State<AppState>, Query(q): Query<SearchQuery>) -> Result<Json<NewsPage>, PipelineError> {
    Ok(Json(state.service.search(&q.q, q.limit).await?))
}

async fn source_credibility(
    State(state): State<AppState>,
    Query(q): Query<SourceQuery>,
) -> Result<Json<CredibilityView>, PipelineError> {
    if q.source.trim().is_empty() {
        return Err(PipelineError::InvalidRequest("source is required".into()));
    }
    Ok(Json(state.service.credibility(&q.source)))
}

async fn admin_refresh(State(state): State<AppState>) -> Json<CycleReport> {
    let outcome = state.service.refresh().await;
    Json(outcome.report().clone())
}

async fn admin_reload_categories(State(state): State<AppState>) -> Result<String, ConfigError> {
    let n = state.service.reload_categories()?;
    Ok(format!("reloaded {n} categories"))
}
