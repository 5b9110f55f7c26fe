//! HTTP API for health checks, Prometheus metrics and the last tick report

use std::sync::Arc;

use autostop_lib::{AutostopMetrics, ComponentStatus, HealthRegistry, ReportSlot};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: AutostopMetrics,
    pub report: ReportSlot,
}

type SharedState = Arc<AppState>;

fn probe_code(passing: bool) -> StatusCode {
    if passing {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// 200 while operational (degraded included), 503 when unhealthy
async fn healthz(State(state): State<SharedState>) -> Response {
    let health = state.health_registry.health().await;
    let code = probe_code(health.status != ComponentStatus::Unhealthy);
    (code, Json(health)).into_response()
}

async fn readyz(State(state): State<SharedState>) -> Response {
    let readiness = state.health_registry.readiness().await;
    (probe_code(readiness.ready), Json(readiness)).into_response()
}

async fn metrics(State(state): State<SharedState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Last completed tick, 404 until one has finished
async fn report(State(state): State<SharedState>) -> Response {
    let slot = state.report.read().await;
    let Some(report) = slot.as_ref() else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "no tick has completed yet" })),
        )
            .into_response();
    };
    Json(report).into_response()
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/report", get(report))
        .with_state(state)
}

pub async fn serve(port: u16, state: SharedState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(addr = %listener.local_addr()?, "API server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
