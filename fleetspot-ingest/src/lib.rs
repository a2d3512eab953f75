//! fleetspot-ingest library interface
//!
//! Conversation engine, sighting services and HTTP surface for the
//! crowdsourced vehicle sighting service. Exposed as a library for
//! integration testing.

pub mod api;
pub mod db;
pub mod error;
pub mod extract;
pub mod messages;
pub mod models;
pub mod services;
pub mod session;

pub use crate::error::{ApiError, ApiResult, IngestError, IngestResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::services::BatchPublisher;
use crate::session::ConversationEngine;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub engine: Arc<ConversationEngine>,
    pub publisher: Arc<BatchPublisher>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, engine: Arc<ConversationEngine>, publisher: Arc<BatchPublisher>) -> Self {
        Self {
            db,
            engine,
            publisher,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::webhook_routes())
        .merge(api::queue_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
