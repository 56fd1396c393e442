//! Health, readiness and metrics endpoints
//!
//! - `/health`: process liveness (for load balancers)
//! - `/ready`: warmup complete and rule count > 0
//! - `/metrics`: Prometheus text format

use super::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::Serialize;

/// Simple health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Readiness response with the rule count behind the decision.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub rules: usize,
}

/// Process liveness.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Warmup-complete readiness: the service exists (warmup ran to completion)
/// and at least one rule compiled.
async fn readiness_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let ready = state.service.is_ready();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ReadinessResponse { ready, rules: state.service.rule_count() }),
    )
}

/// Metrics endpoint (Prometheus format).
async fn metrics_endpoint() -> String {
    loanflow_core::metrics_global::export_prometheus()
}

/// Create health routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_endpoint))
}
