//! API Server (Cold Path)
//!
//! REST surface over the engine: status, price pages, page switching and
//! manual reconnect. Reads go through the shared store and never touch the
//! network.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::core::{InstrumentId, PriceRecord};
use crate::engine::{EngineStatus, SyncEngine};
use crate::infrastructure::metrics::{MetricsCollector, MetricsSnapshot};
use crate::SyncError;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SyncEngine>,
    pub metrics: Arc<MetricsCollector>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub size: Option<usize>,
}

/// One page of records in canonical order
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricesDto {
    pub page: usize,
    pub page_size: usize,
    pub page_count: usize,
    pub records: Vec<PriceRecord>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectDto {
    pub restarted: bool,
}

#[derive(Debug, Serialize)]
struct ErrorDto {
    error: String,
}

/// Handler error mapped to a status code
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ErrorDto { error })).into_response()
    }
}

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::InvalidPage { .. } => ApiError::BadRequest(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// Build the router; `serve` binds it
pub fn router(engine: Arc<SyncEngine>) -> Router {
    let state = AppState {
        metrics: engine.metrics(),
        engine,
    };

    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/prices", get(get_prices))
        .route("/api/prices/:id", get(get_price))
        .route("/api/page/:page", post(post_page))
        .route("/api/reconnect", post(post_reconnect))
        .route("/api/metrics", get(get_metrics))
        // Middleware
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the API server
pub async fn serve(router: Router, host: &str, port: u16) -> crate::Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    crate::log_api!(tracing::Level::INFO, "API Server listening on {}", addr);

    axum::serve(listener, router).await?;
    Ok(())
}

async fn get_status(State(state): State<AppState>) -> Json<EngineStatus> {
    Json(state.engine.status().await)
}

/// Defaults to the active page and the configured page size
async fn get_prices(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PricesDto>, ApiError> {
    let page_size = query.size.unwrap_or(state.engine.page_size());
    if page_size == 0 {
        return Err(ApiError::BadRequest("size must be positive".into()));
    }
    let page = match query.page {
        Some(page) => page,
        None => state.engine.status().await.page,
    };

    let records = state
        .engine
        .store()
        .list_by_page(page, page_size)
        .iter()
        .map(|r| PriceRecord::clone(r))
        .collect();

    Ok(Json(PricesDto {
        page,
        page_size,
        page_count: state.engine.universe().page_count(page_size),
        records,
    }))
}

async fn get_price(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PriceRecord>, ApiError> {
    state
        .engine
        .store()
        .get(&InstrumentId::new(id.as_str()))
        .map(|r| Json(PriceRecord::clone(&r)))
        .ok_or_else(|| ApiError::NotFound(format!("no price for {id}")))
}

async fn post_page(
    State(state): State<AppState>,
    Path(page): Path<usize>,
) -> Result<Json<EngineStatus>, ApiError> {
    crate::log_api!(tracing::Level::INFO, "Switching to page {}", page);
    state.engine.switch_page(page).await?;
    Ok(Json(state.engine.status().await))
}

async fn post_reconnect(State(state): State<AppState>) -> Json<ReconnectDto> {
    crate::log_api!(tracing::Level::INFO, "Manual reconnect requested");
    Json(ReconnectDto {
        restarted: state.engine.reconnect().await,
    })
}

async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
