use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::error::Result;
use crate::protocol::{ComputeRequest, JobResponse};

/// A job waiting for capacity, paired with its single-shot result sink.
///
/// The sink is a capacity-one oneshot: the producer never blocks and the
/// consumer observes exactly one outcome. Delivering consumes the job, so a
/// second delivery is impossible by construction.
#[derive(Debug)]
pub struct QueuedJob {
    pub request: ComputeRequest,
    /// The value placement used for admission; released after dispatch.
    pub estimated_cpu: f64,
    pub enqueued_at: Instant,
    reply: oneshot::Sender<Result<JobResponse>>,
}

impl QueuedJob {
    pub fn new(
        request: ComputeRequest,
        estimated_cpu: f64,
    ) -> (Self, oneshot::Receiver<Result<JobResponse>>) {
        let (tx, rx) = oneshot::channel();
        let job = Self {
            request,
            estimated_cpu,
            enqueued_at: Instant::now(),
            reply: tx,
        };
        (job, rx)
    }

    pub fn waited(&self) -> Duration {
        self.enqueued_at.elapsed()
    }

    pub fn expired(&self, timeout: Duration) -> bool {
        self.waited() > timeout
    }

    /// Deliver the outcome. If the caller has stopped waiting the value is
    /// discarded, which is the contract: results computed after a caller
    /// disconnect are dropped, not retried.
    pub fn complete(self, outcome: Result<JobResponse>) {
        let _ = self.reply.send(outcome);
    }
}

/// Bounded FIFO of pending jobs. Offers are non-blocking; the background
/// drainer owns the receiving side.
#[derive(Debug)]
pub struct JobQueue {
    tx: mpsc::Sender<QueuedJob>,
    rx: Mutex<mpsc::Receiver<QueuedJob>>,
    max_size: usize,
}

impl JobQueue {
    pub fn new(max_size: usize) -> Self {
        let (tx, rx) = mpsc::channel(max_size);
        Self {
            tx,
            rx: Mutex::new(rx),
            max_size,
        }
    }

    /// Non-blocking enqueue. Returns the job back when the queue is full.
    pub fn offer(&self, job: QueuedJob) -> std::result::Result<(), QueuedJob> {
        match self.tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) | Err(TrySendError::Closed(job)) => Err(job),
        }
    }

    /// Enqueue with a bounded grace period. Used only to put a job back after
    /// a placement miss; returns the job when the grace elapses so the caller
    /// can fail it rather than lose it.
    pub async fn offer_within(
        &self,
        job: QueuedJob,
        grace: Duration,
    ) -> std::result::Result<(), QueuedJob> {
        match self.tx.send_timeout(job, grace).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(job)) | Err(SendTimeoutError::Closed(job)) => Err(job),
        }
    }

    /// Non-blocking take of the queue head.
    pub async fn try_take(&self) -> Option<QueuedJob> {
        self.rx.lock().await.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.max_size - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

/// Queue statistics for the status endpoints. A disabled queue serializes as
/// `{"enabled": false}` alone.
#[derive(Debug, Serialize)]
pub struct QueueStatus {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size: Option<usize>,
    /// Per-job queue deadline in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl QueueStatus {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            queue_size: None,
            max_size: None,
            timeout: None,
        }
    }
}
