//! API Module
//!
//! Optional HTTP surface of the dispatcher: liveness and outcome counters.

pub mod health;

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::service::DispatchStats;

/// Create the health router
pub fn create_router(stats: Arc<DispatchStats>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/stats", get(health::stats))
        .with_state(stats)
        .layer(TraceLayer::new_for_http())
}
