use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::rejection::JsonRejection,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::queue::QueueStatus;
use crate::scheduler::Scheduler;

#[derive(Clone)]
pub struct GatewayState {
    pub scheduler: Arc<Scheduler>,
}

#[derive(Serialize)]
struct WorkerStatus {
    core_id: u32,
    container_id: String,
    host_port: u16,
    cpu_usage: String,
    is_healthy: bool,
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    worker_count: usize,
    workers: Vec<WorkerStatus>,
    queue: QueueStatus,
}

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/submit", post(submit_handler))
        .route("/status", get(status_handler))
        .route("/queue", get(queue_status_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the gateway API until the shutdown token fires.
pub async fn run_gateway(
    addr: SocketAddr,
    state: GatewayState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let app = router(state);

    tracing::info!(%addr, "gateway HTTP server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

/// Accept a job request, schedule it, and relay the worker's result.
pub async fn submit_handler(
    State(state): State<GatewayState>,
    payload: Result<Json<crate::protocol::ComputeRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(json) => json,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                format!("Invalid JSON: {rejection}"),
            )
                .into_response();
        }
    };

    if let Err(msg) = request.validate() {
        return (StatusCode::BAD_REQUEST, msg).into_response();
    }

    match state.scheduler.schedule(request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "job scheduling failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Job failed: {e}"),
            )
                .into_response()
        }
    }
}

pub async fn status_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    let workers: Vec<WorkerStatus> = state
        .scheduler
        .registry()
        .read()
        .await
        .workers()
        .into_iter()
        .map(|w| WorkerStatus {
            core_id: w.slot_id,
            container_id: w.short_container_id().to_string(),
            host_port: w.host_port,
            cpu_usage: format!("{:.1}%", w.reserved_cpu),
            is_healthy: w.healthy,
        })
        .collect();

    Json(StatusResponse {
        status: "running",
        worker_count: workers.len(),
        workers,
        queue: state.scheduler.queue_status(),
    })
}

pub async fn queue_status_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(state.scheduler.queue_status())
}

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
