//! Health Check API Handlers

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use std::sync::Arc;

use crate::service::{DispatchStats, StatsSnapshot};

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /stats
/// Outcome counters since startup
pub async fn stats(State(stats): State<Arc<DispatchStats>>) -> Json<StatsSnapshot> {
    Json(stats.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::domain::outcome::DeliveryOutcome;

    #[tokio::test]
    async fn test_health_check() {
        let response = health_check().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stats_reports_counters() {
        let counters = Arc::new(DispatchStats::new());
        counters.record(&DeliveryOutcome::DeadLettered {
            reason: "message body has no version".to_string(),
        });

        let Json(snapshot) = stats(State(counters)).await;
        assert_eq!(snapshot.dead_lettered, 1);
        assert_eq!(snapshot.acknowledged, 0);
    }
}
