use std::time::Instant;

use axum::{
    extract::rejection::JsonRejection,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::protocol::{ComputeRequest, JobResponse};
use crate::worker::load;

#[derive(Clone)]
pub struct WorkerState {
    pub worker_id: String,
    /// OS threads used for load generation, normally the assigned hyperthreads.
    pub threads: usize,
}

pub fn router(state: WorkerState) -> Router {
    Router::new()
        .route("/submit", post(submit_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Execute one load job and report its result.
pub async fn submit_handler(
    State(state): State<WorkerState>,
    payload: Result<Json<ComputeRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(json) => json,
        Err(_) => return (StatusCode::BAD_REQUEST, "Invalid JSON").into_response(),
    };

    if let Err(msg) = request.validate() {
        return (StatusCode::BAD_REQUEST, msg).into_response();
    }

    tracing::info!(
        worker_id = %state.worker_id,
        cpu_load = request.cpu_load,
        load_time = request.load_time,
        "starting CPU load"
    );

    let started = Instant::now();
    let threads = state.threads;
    let (cpu_load, load_time) = (request.cpu_load, request.load_time);

    // The generator blocks its threads; keep it off the async runtime.
    let result =
        tokio::task::spawn_blocking(move || load::generate_cpu_load(cpu_load, load_time, threads))
            .await;

    let result = match result {
        Ok(value) => value,
        Err(e) => {
            tracing::error!(worker_id = %state.worker_id, error = %e, "load generation panicked");
            return (StatusCode::INTERNAL_SERVER_ERROR, "load generation failed").into_response();
        }
    };

    let elapsed = started.elapsed();
    let response = JobResponse {
        job_id: format!("JOB-{}", Uuid::new_v4()),
        worker_id: state.worker_id.clone(),
        result,
        time_taken: format!("{:.2}s", elapsed.as_secs_f64()),
    };

    tracing::info!(
        worker_id = %state.worker_id,
        job_id = %response.job_id,
        result,
        time_taken = %response.time_taken,
        "job finished"
    );

    Json(response).into_response()
}

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
