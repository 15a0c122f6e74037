//! Test harness for scheduler, dispatch, and gateway integration tests.
//!
//! Provides a fake provisioner backed by in-process stub workers listening on
//! real sockets, plus configuration tuned small for fast tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use tokio::sync::Mutex;
use uuid::Uuid;

use coregate::config::{default_slot_catalogue, Config, QueueConfig};
use coregate::error::{GateError, Result as GateResult};
use coregate::protocol::{ComputeRequest, JobResponse};
use coregate::provision::{ProvisionedWorker, Provisioner};
use coregate::registry::{SlotId, Worker};
use coregate::scheduler::Scheduler;

/// Config with zero settle and a fast drain cadence.
pub fn test_config() -> Config {
    Config {
        max_cpu_threshold: 80.0,
        prespawn_threshold: 70.0,
        gateway_port: 0,
        worker_base_port: 0,
        initial_workers: 1,
        worker_image: "stub".to_string(),
        slot_catalogue: default_slot_catalogue(),
        queue: QueueConfig {
            enabled: true,
            max_size: 100,
            timeout: Duration::from_secs(5),
            drain_cadence: Duration::from_millis(50),
        },
        provision_settle: Duration::ZERO,
        dispatch_headroom: Duration::from_secs(5),
    }
}

/// Spawn an in-process stub worker that sleeps for the requested load_time
/// and replies like a real worker would.
pub async fn spawn_stub_worker(worker_id: &str) -> SocketAddr {
    let id = worker_id.to_string();
    let app = Router::new().route(
        "/submit",
        post(move |Json(req): Json<ComputeRequest>| {
            let id = id.clone();
            async move {
                tokio::time::sleep(Duration::from_secs_f64(req.load_time)).await;
                Json(JobResponse {
                    job_id: format!("JOB-{}", Uuid::new_v4()),
                    worker_id: id,
                    result: 3.14159,
                    time_taken: format!("{:.2}s", req.load_time),
                })
            }
        }),
    );
    serve_on_ephemeral_port(app).await
}

/// Stub worker that sleeps a fixed delay regardless of the requested
/// load_time, for driving the dispatcher into its timeout.
#[allow(dead_code)]
pub async fn spawn_slow_stub_worker(delay: Duration) -> SocketAddr {
    let app = Router::new().route(
        "/submit",
        post(move |Json(_req): Json<ComputeRequest>| async move {
            tokio::time::sleep(delay).await;
            Json(JobResponse {
                job_id: format!("JOB-{}", Uuid::new_v4()),
                worker_id: "slow".to_string(),
                result: 3.14159,
                time_taken: format!("{:.2}s", delay.as_secs_f64()),
            })
        }),
    );
    serve_on_ephemeral_port(app).await
}

/// Stub worker that rejects every job with a 500.
#[allow(dead_code)]
pub async fn spawn_erroring_stub_worker() -> SocketAddr {
    let app = Router::new().route(
        "/submit",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "worker exploded") }),
    );
    serve_on_ephemeral_port(app).await
}

/// Stub worker that replies 200 with a body that is not a JobResponse.
#[allow(dead_code)]
pub async fn spawn_garbage_stub_worker() -> SocketAddr {
    let app = Router::new().route("/submit", post(|| async { "not json" }));
    serve_on_ephemeral_port(app).await
}

/// An endpoint with nothing listening behind it.
#[allow(dead_code)]
pub async fn unreachable_endpoint() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

async fn serve_on_ephemeral_port(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// In-memory provisioner: each `start` brings up a fresh in-process stub
/// worker and hands back its real address. Records calls for assertions.
pub struct FakeProvisioner {
    pub started: Mutex<Vec<SlotId>>,
    pub stopped: AtomicUsize,
    /// Models the real provisioner's multi-second container start.
    start_delay: Duration,
}

impl FakeProvisioner {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(start_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            started: Mutex::new(Vec::new()),
            stopped: AtomicUsize::new(0),
            start_delay,
        })
    }

    #[allow(dead_code)]
    pub async fn started_slots(&self) -> Vec<SlotId> {
        self.started.lock().await.clone()
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    async fn start(&self, slot: SlotId) -> GateResult<ProvisionedWorker> {
        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }
        let addr = spawn_stub_worker(&format!("Worker-Core-{slot}")).await;
        self.started.lock().await.push(slot);
        Ok(ProvisionedWorker {
            container_id: format!("fake{}", Uuid::new_v4().simple()),
            host_port: addr.port(),
            endpoint: format!("http://{addr}"),
        })
    }

    async fn stop(&self, _container_id: &str) -> GateResult<()> {
        self.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Provisioner whose every start fails.
pub struct FailingProvisioner;

#[async_trait]
impl Provisioner for FailingProvisioner {
    async fn start(&self, slot: SlotId) -> GateResult<ProvisionedWorker> {
        Err(GateError::ProvisionFailed(format!(
            "no runtime for slot {slot}"
        )))
    }

    async fn stop(&self, _container_id: &str) -> GateResult<()> {
        Ok(())
    }
}

/// Register a live stub worker directly into the scheduler's registry, with
/// an optional standing reservation to simulate in-flight load.
#[allow(dead_code)]
pub async fn register_stub_worker(
    scheduler: &Arc<Scheduler>,
    slot: SlotId,
    reserved: f64,
) -> SocketAddr {
    let addr = spawn_stub_worker(&format!("Worker-Core-{slot}")).await;
    register_worker_at(scheduler, slot, format!("http://{addr}"), addr.port(), reserved).await;
    addr
}

/// Register a worker at an arbitrary endpoint (e.g. an unreachable one).
#[allow(dead_code)]
pub async fn register_worker_at(
    scheduler: &Arc<Scheduler>,
    slot: SlotId,
    endpoint: String,
    host_port: u16,
    reserved: f64,
) {
    let mut registry = scheduler.registry().write().await;
    registry
        .register(Worker::new(
            slot,
            format!("stub-container-{slot}"),
            host_port,
            endpoint,
        ))
        .unwrap();
    if reserved > 0.0 {
        registry.adjust_reserved(slot, reserved);
    }
}
