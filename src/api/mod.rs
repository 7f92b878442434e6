use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::Local;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::db::FixtureStore;
use crate::live_scores::FixtureSource;
use crate::worker::SchedulerHandle;

#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn FixtureSource>,
    pub store: Arc<dyn FixtureStore>,
    pub scheduler: SchedulerHandle,
}

type ApiError = (StatusCode, String);

fn internal(e: impl std::fmt::Display) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/// Build the Axum router for the sync API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/matches/live", get(live_handler))
        .route("/api/matches/sync", get(sync_handler))
        .route("/api/settlements", get(settlements_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// GET /api/matches/live: today's snapshot straight from the Source
async fn live_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .source
        .fetch_day_snapshot(Local::now().date_naive())
        .await
        .map(Json)
        .map_err(internal)
}

/// GET /api/matches/sync: one-shot Source to Store copy of today's fixtures
async fn sync_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let competitions = state
        .source
        .fetch_day_snapshot(Local::now().date_naive())
        .await
        .map_err(internal)?;
    if competitions.is_empty() {
        return Ok(Json(json!({
            "status": "warning",
            "message": "No matches found to sync",
        })));
    }

    let synced = state
        .store
        .upsert_fixtures(&competitions)
        .await
        .map_err(internal)?;
    info!("Manual sync stored {} fixtures", synced);
    Ok(Json(json!({ "status": "success", "matches_synced": synced })))
}

/// GET /api/settlements
async fn settlements_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    state.scheduler.pending().await.map(Json).map_err(internal)
}
