use serde::{Deserialize, Serialize};

/// A client job request: burn `cpu_load` percent of a core for `load_time`
/// seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeRequest {
    /// Target CPU utilization percentage (0-100].
    pub cpu_load: f64,
    /// How long to sustain the load, in seconds.
    pub load_time: f64,
}

impl ComputeRequest {
    /// Range check performed at the HTTP edge. The scheduling core assumes
    /// validated input.
    pub fn validate(&self) -> std::result::Result<(), &'static str> {
        if !(self.cpu_load > 0.0 && self.cpu_load <= 100.0) {
            return Err("cpu_load must be between 0 and 100");
        }
        if self.load_time <= 0.0 {
            return Err("load_time must be positive");
        }
        Ok(())
    }
}

/// Result record returned by a worker and relayed verbatim to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResponse {
    pub job_id: String,
    pub worker_id: String,
    /// The math answer computed during the busy phase.
    pub result: f64,
    /// Wall-clock execution time, e.g. "1.24s".
    pub time_taken: String,
}
