//! Health check endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use telemetry::{health, metrics, MetricsSnapshot};

use crate::response::HealthResponse;
use crate::state::AppState;

/// GET /health - Storage and scheduler.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let storage_connected = state.probe_storage().await;
    let scheduler = state.scheduler.stats();
    let scheduler_healthy = state.scheduler.is_healthy();

    let status = if !storage_connected {
        "unhealthy"
    } else if !scheduler_healthy {
        "degraded"
    } else {
        "healthy"
    };

    Json(HealthResponse {
        status: status.to_string(),
        storage_connected,
        scheduler_healthy,
        scheduler_state: scheduler.state,
    })
}

/// GET /health/ready - Readiness probe (can accept traffic).
pub async fn ready_handler(State(state): State<AppState>) -> StatusCode {
    if state.probe_storage().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health/live - Liveness probe (service is running).
pub async fn live_handler() -> StatusCode {
    if health().is_alive() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health/scheduler - Retention scheduler stats.
pub async fn scheduler_handler(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.scheduler.stats();
    let status = if state.scheduler.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(stats))
}

/// GET /health/metrics - Process counters since startup.
pub async fn metrics_handler() -> Json<MetricsSnapshot> {
    Json(metrics().snapshot())
}
