use std::time::Duration;

use crate::error::{GateError, Result};
use crate::protocol::{ComputeRequest, JobResponse};
use crate::registry::Worker;

/// Sends a prepared job to a specific worker and returns its result.
///
/// Stateless and safe for concurrent use across workers and jobs. Never
/// retries; failures are classified and reported to the caller, which owns
/// the reservation rollback.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
    /// Added to the job's load_time to form the per-call timeout.
    headroom: Duration,
}

impl Dispatcher {
    pub fn new(headroom: Duration) -> Self {
        Self {
            // Timeout set per request from the job duration.
            client: reqwest::Client::new(),
            headroom,
        }
    }

    /// POST the job to `{endpoint}/submit` and wait for the reply.
    pub async fn dispatch(&self, worker: &Worker, request: &ComputeRequest) -> Result<JobResponse> {
        let url = format!("{}/submit", worker.endpoint);
        let timeout = Duration::from_secs_f64(request.load_time.max(0.0)) + self.headroom;

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| classify_send_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GateError::DispatchStatus(status.as_u16()));
        }

        let job: JobResponse = response
            .json()
            .await
            .map_err(|e| GateError::DispatchDecode(e.to_string()))?;

        tracing::info!(
            job_id = %job.job_id,
            worker_id = %job.worker_id,
            result = job.result,
            time_taken = %job.time_taken,
            "job completed"
        );

        Ok(job)
    }
}

fn classify_send_error(err: reqwest::Error, timeout: Duration) -> GateError {
    if err.is_timeout() {
        GateError::DispatchTimeout {
            secs: timeout.as_secs(),
        }
    } else {
        GateError::DispatchTransport(err.to_string())
    }
}
