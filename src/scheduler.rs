use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::{GateError, Result};
use crate::placement::{self, Placement};
use crate::protocol::{ComputeRequest, JobResponse};
use crate::provision::Provisioner;
use crate::queue::{JobQueue, QueueStatus, QueuedJob};
use crate::registry::{SlotId, Worker, WorkerRegistry};

/// How long a requeue after a placement miss may wait before the job fails.
const REQUEUE_GRACE: Duration = Duration::from_secs(1);

/// What the serialized placement section decided for an incoming job.
enum Admission {
    /// Reservation committed on this worker; dispatch it.
    Dispatch(Worker),
    /// The slot was claimed; provision it, then dispatch.
    Provision(SlotId),
    /// Pool saturated; queue or reject.
    Saturated,
}

/// Orchestrates placement, provisioning, dispatch, and queuing for each
/// incoming job.
pub struct Scheduler {
    registry: Arc<RwLock<WorkerRegistry>>,
    provisioner: Arc<dyn Provisioner>,
    dispatcher: Dispatcher,
    queue: Option<JobQueue>,
    config: Config,
}

impl Scheduler {
    pub fn new(config: Config, provisioner: Arc<dyn Provisioner>) -> Arc<Self> {
        let registry = WorkerRegistry::new(config.slot_catalogue.keys().copied());
        let queue = config
            .queue
            .enabled
            .then(|| JobQueue::new(config.queue.max_size));

        if config.queue.enabled {
            tracing::info!(
                max_size = config.queue.max_size,
                timeout_secs = config.queue.timeout.as_secs(),
                "job queuing enabled"
            );
        }

        Arc::new(Self {
            registry: Arc::new(RwLock::new(registry)),
            provisioner,
            dispatcher: Dispatcher::new(config.dispatch_headroom),
            queue,
            config,
        })
    }

    /// The shared capacity registry. Exposed for the status endpoints and
    /// for tests that pre-populate worker state.
    pub fn registry(&self) -> &Arc<RwLock<WorkerRegistry>> {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Provision the initial worker pool. Errors here are startup-fatal for
    /// the caller.
    pub async fn start_initial_workers(self: &Arc<Self>) -> Result<()> {
        for _ in 0..self.config.initial_workers {
            let slot = {
                let mut registry = self.registry.write().await;
                let Some(slot) = registry.next_free_slot() else {
                    tracing::warn!("initial worker count exceeds slot catalogue, stopping early");
                    return Ok(());
                };
                registry.claim_slot(slot)?;
                slot
            };
            // No settle here: nothing dispatches to these workers until a
            // request arrives, which is readiness enough.
            self.spawn_worker(slot, false).await?;
        }
        Ok(())
    }

    /// Start the background queue drainer. Returns `None` when queuing is
    /// disabled. The drainer exits when the token is cancelled; in-flight
    /// dispatches run to completion but no further queue work is taken.
    pub fn start_drainer(self: &Arc<Self>, shutdown: CancellationToken) -> Option<JoinHandle<()>> {
        self.queue.as_ref()?;

        let sched = self.clone();
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(sched.config.queue.drain_cadence);
            tracing::info!("queue drainer started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("queue drainer stopping");
                        return;
                    }
                    _ = interval.tick() => {
                        sched.drain_tick().await;
                    }
                }
            }
        }))
    }

    /// Schedule one job: place it on a worker, provisioning or queuing as
    /// needed, and return its result synchronously.
    pub async fn schedule(self: &Arc<Self>, request: ComputeRequest) -> Result<JobResponse> {
        let estimated_cpu = estimate_cpu(&request);

        tracing::info!(
            cpu_load = estimated_cpu,
            load_time = request.load_time,
            "job request"
        );

        // The write guard is the serialized section: the placement decision
        // and the reservation (or slot claim) commit atomically.
        let admission = {
            let mut registry = self.registry.write().await;
            match placement::select(&registry, estimated_cpu, self.config.max_cpu_threshold) {
                Placement::Hit(worker) => {
                    registry.adjust_reserved(worker.slot_id, estimated_cpu);
                    Admission::Dispatch(worker)
                }
                Placement::Provision(slot) => {
                    registry.claim_slot(slot)?;
                    Admission::Provision(slot)
                }
                Placement::Reject => Admission::Saturated,
            }
        };

        match admission {
            Admission::Dispatch(worker) => {
                tracing::info!(
                    slot = worker.slot_id,
                    port = worker.host_port,
                    reserved_cpu = worker.reserved_cpu,
                    "routing job to worker"
                );
                self.dispatch_reserved(worker, &request, estimated_cpu).await
            }
            Admission::Provision(slot) => {
                tracing::info!(slot, "no suitable worker, provisioning");
                self.spawn_worker(slot, true).await?;

                let worker = {
                    let mut registry = self.registry.write().await;
                    let Some(worker) = registry.get(slot).cloned() else {
                        return Err(GateError::ProvisionFailed(
                            "worker spawned but not found in registry".to_string(),
                        ));
                    };
                    registry.adjust_reserved(slot, estimated_cpu);
                    worker
                };
                self.dispatch_reserved(worker, &request, estimated_cpu).await
            }
            Admission::Saturated => self.enqueue(request, estimated_cpu).await,
        }
    }

    /// Queue statistics for the status endpoints.
    pub fn queue_status(&self) -> QueueStatus {
        match &self.queue {
            Some(queue) => QueueStatus {
                enabled: true,
                queue_size: Some(queue.len()),
                max_size: Some(queue.max_size()),
                timeout: Some(self.config.queue.timeout.as_secs()),
            },
            None => QueueStatus::disabled(),
        }
    }

    /// Stop every provisioned container. Called on orderly shutdown; errors
    /// are logged, not propagated.
    pub async fn stop_all_workers(&self) {
        let workers = self.registry.read().await.workers();
        for worker in workers {
            if let Err(e) = self.provisioner.stop(&worker.container_id).await {
                tracing::warn!(
                    slot = worker.slot_id,
                    container = worker.short_container_id(),
                    error = %e,
                    "failed to stop worker container"
                );
            }
        }
    }

    /// Dispatch a job whose reservation is already committed, then release
    /// the reservation whatever the outcome.
    async fn dispatch_reserved(
        self: &Arc<Self>,
        worker: Worker,
        request: &ComputeRequest,
        estimated_cpu: f64,
    ) -> Result<JobResponse> {
        let result = self.dispatcher.dispatch(&worker, request).await;

        {
            let mut registry = self.registry.write().await;
            registry.adjust_reserved(worker.slot_id, -estimated_cpu);
        }

        if result.is_ok() {
            self.check_prespawn().await;
        }

        result
    }

    /// Queue fallthrough for a saturated pool: offer the job and wait for
    /// whichever outcome the drainer produces first.
    async fn enqueue(&self, request: ComputeRequest, estimated_cpu: f64) -> Result<JobResponse> {
        let Some(queue) = &self.queue else {
            return Err(GateError::NoCapacity);
        };

        tracing::info!(cpu_load = estimated_cpu, "all workers busy, queueing job");

        let timeout = self.config.queue.timeout;
        let (job, outcome) = QueuedJob::new(request, estimated_cpu);
        if queue.offer(job).is_err() {
            return Err(GateError::QueueFull {
                max: queue.max_size(),
            });
        }

        match tokio::time::timeout(timeout, outcome).await {
            Ok(Ok(result)) => result,
            // Drainer dropped the sink without signaling; only possible if it
            // died mid-dispatch.
            Ok(Err(_)) => Err(GateError::Internal(
                "queued job sink dropped without a result".to_string(),
            )),
            Err(_) => Err(GateError::QueueExpired {
                secs: timeout.as_secs(),
            }),
        }
    }

    /// One drainer tick: place as many queued jobs as capacity permits, in
    /// FIFO order. Stops at the first placement miss so the head job is
    /// retried next tick instead of starving behind in-tick retries.
    async fn drain_tick(self: &Arc<Self>) {
        let Some(queue) = &self.queue else { return };
        let timeout = self.config.queue.timeout;

        loop {
            let Some(job) = queue.try_take().await else {
                return;
            };

            if job.expired(timeout) {
                tracing::warn!(
                    waited_secs = job.waited().as_secs_f64(),
                    "queued job timed out, discarding"
                );
                job.complete(Err(GateError::QueueExpired {
                    secs: timeout.as_secs(),
                }));
                continue;
            }

            let placed = {
                let mut registry = self.registry.write().await;
                match placement::select(
                    &registry,
                    job.estimated_cpu,
                    self.config.max_cpu_threshold,
                ) {
                    Placement::Hit(worker) => {
                        registry.adjust_reserved(worker.slot_id, job.estimated_cpu);
                        Some(worker)
                    }
                    // The drainer never provisions; the next direct request
                    // or pre-spawn grows the pool.
                    Placement::Provision(_) | Placement::Reject => None,
                }
            };

            match placed {
                Some(worker) => {
                    tracing::info!(
                        waited_secs = job.waited().as_secs_f64(),
                        slot = worker.slot_id,
                        "dequeued job"
                    );

                    // Dispatch asynchronously so the drainer keeps processing
                    // the rest of the queue this tick.
                    let sched = self.clone();
                    tokio::spawn(async move {
                        let request = job.request.clone();
                        let estimated_cpu = job.estimated_cpu;
                        let result = sched
                            .dispatch_reserved(worker, &request, estimated_cpu)
                            .await;
                        job.complete(result);
                    });
                }
                None => {
                    // Still no capacity: put the job back best-effort and end
                    // the tick.
                    let sched = self.clone();
                    tokio::spawn(async move {
                        let Some(queue) = &sched.queue else { return };
                        if let Err(job) = queue.offer_within(job, REQUEUE_GRACE).await {
                            job.complete(Err(GateError::RequeueFailed));
                        }
                    });
                    return;
                }
            }
        }
    }

    /// Proactive scaling: after a successful dispatch, if every worker sits
    /// at or above the pre-spawn threshold and a slot is free, provision an
    /// extra worker in the background. Failures are logged and swallowed.
    async fn check_prespawn(self: &Arc<Self>) {
        let slot = {
            let mut registry = self.registry.write().await;
            let all_busy = {
                let mut workers = registry.iter().peekable();
                workers.peek().is_some()
                    && workers.all(|w| w.reserved_cpu >= self.config.prespawn_threshold)
            };
            if !all_busy {
                return;
            }
            let Some(slot) = registry.next_free_slot() else {
                tracing::debug!("pre-spawn skipped: no free slot");
                return;
            };
            if registry.claim_slot(slot).is_err() {
                return;
            }
            slot
        };

        tracing::info!(
            threshold = self.config.prespawn_threshold,
            slot,
            "all workers above pre-spawn threshold, provisioning ahead"
        );

        // No settle wait on this path; the next placement discovers the
        // worker once it registers.
        let sched = self.clone();
        tokio::spawn(async move {
            if let Err(e) = sched.spawn_worker(slot, false).await {
                tracing::warn!(slot, error = %e, "pre-spawn failed");
            }
        });
    }

    /// Provision and register a worker on a claimed slot. The claim must
    /// already be held; it is released on failure and replaced by the worker
    /// on success.
    async fn spawn_worker(self: &Arc<Self>, slot: SlotId, settle: bool) -> Result<Worker> {
        let started = match self.provisioner.start(slot).await {
            Ok(started) => started,
            Err(e) => {
                self.registry.write().await.release_claim(slot);
                return Err(e);
            }
        };

        if settle && !self.config.provision_settle.is_zero() {
            tokio::time::sleep(self.config.provision_settle).await;
        }

        let worker = Worker::new(
            slot,
            started.container_id,
            started.host_port,
            started.endpoint,
        );

        {
            let mut registry = self.registry.write().await;
            if let Err(e) = registry.register(worker.clone()) {
                registry.release_claim(slot);
                return Err(GateError::ProvisionFailed(e.to_string()));
            }
        }

        tracing::info!(
            slot,
            container = worker.short_container_id(),
            port = worker.host_port,
            "worker started"
        );

        Ok(worker)
    }
}

/// The scheduler trusts the client's target directly, clamped into range.
fn estimate_cpu(request: &ComputeRequest) -> f64 {
    request.cpu_load.clamp(0.0, 100.0)
}
