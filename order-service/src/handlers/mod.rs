//! HTTP handlers for order-service.

pub mod cart;
pub mod orders;
pub mod webhook;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use mongodb::bson::doc;
use serde_json::json;

use crate::services::get_metrics;
use crate::startup::AppState;

/// Liveness probe.
pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "order-service",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Readiness probe. Pings MongoDB when the service runs against it.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if let Some(db) = &state.db {
        if let Err(e) = db.run_command(doc! { "ping": 1 }, None).await {
            tracing::warn!(error = %e, "Readiness check failed: database unreachable");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            );
        }
    }
    (StatusCode::OK, Json(json!({ "status": "ready" })))
}

/// Prometheus metrics endpoint.
pub async fn metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}
