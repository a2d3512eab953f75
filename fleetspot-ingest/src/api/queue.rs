//! Batch queue observability

use axum::{extract::State, routing::get, Json, Router};

use crate::error::ApiResult;
use crate::models::QueueStats;
use crate::AppState;

/// GET /api/queue
///
/// Unposted sighting count, age of the oldest one, and whether the admission
/// controller would publish now.
pub async fn queue_stats(State(state): State<AppState>) -> ApiResult<Json<QueueStats>> {
    let stats = state.publisher.stats().await?;
    Ok(Json(stats))
}

pub fn queue_routes() -> Router<AppState> {
    Router::new().route("/api/queue", get(queue_stats))
}
