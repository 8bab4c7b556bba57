//! HTTP API: the extender filter endpoint, health checks and Prometheus metrics

use crate::extender::{ExtenderArgs, ExtenderFilterResult, SchedulerExtender};
use crate::health::{ComponentStatus, HealthRegistry};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Shared application state
pub struct AppState {
    pub extender: Arc<SchedulerExtender>,
    pub health_registry: HealthRegistry,
}

impl AppState {
    pub fn new(extender: Arc<SchedulerExtender>, health_registry: HealthRegistry) -> Self {
        Self {
            extender,
            health_registry,
        }
    }
}

/// Filter call from kube-scheduler
async fn predicate(
    State(state): State<Arc<AppState>>,
    args: Result<Json<ExtenderArgs>, JsonRejection>,
) -> impl IntoResponse {
    match args {
        Ok(Json(args)) => (StatusCode::OK, Json(state.extender.predicate(args).await)),
        Err(rejection) => {
            warn!(error = %rejection, "Malformed extender request");
            (
                StatusCode::BAD_REQUEST,
                Json(ExtenderFilterResult::error(rejection.body_text())),
            )
        }
    }
}

/// 200 while operational (degraded included), 503 once unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/predicate", post(predicate))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting extender server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
