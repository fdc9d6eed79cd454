use axum::{
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::sync::Arc;

pub mod backend;
pub mod config;
pub mod io;

pub use backend::{Backend, BackendError, SeqpacketBackend};
pub use config::{Cli, RelayConfig};

pub struct AppState {
    pub backend: Arc<dyn Backend>,
    pub metrics: PrometheusHandle,
}

impl AppState {
    pub fn new(backend: Arc<dyn Backend>, metrics: PrometheusHandle) -> Self {
        Self { backend, metrics }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/io", post(io::io_handler).put(io::io_handler))
        .route("/healthz", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn metrics_handler(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
