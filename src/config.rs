use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use crate::registry::SlotId;

/// Gateway configuration, read from environment variables with sensible
/// defaults. Binaries may override the ports via CLI flags.
#[derive(Debug, Clone)]
pub struct Config {
    /// CPU threshold percentage (0-100) beyond which we don't place on a worker.
    pub max_cpu_threshold: f64,
    /// Spawn an extra worker when every worker is reserved above this %.
    pub prespawn_threshold: f64,
    /// Gateway HTTP port.
    pub gateway_port: u16,
    /// Worker base port; a worker on slot N listens on base + N.
    pub worker_base_port: u16,
    /// Workers to spawn on startup.
    pub initial_workers: usize,
    /// Container image the provisioner starts for each worker.
    pub worker_image: String,
    /// Slot catalogue: slot id -> cpuset string for core pinning.
    pub slot_catalogue: BTreeMap<SlotId, String>,
    pub queue: QueueConfig,
    /// Boot time granted to a freshly provisioned container before dispatch.
    pub provision_settle: Duration,
    /// Added to a job's load_time to form the dispatch timeout.
    pub dispatch_headroom: Duration,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub enabled: bool,
    pub max_size: usize,
    /// Per-job deadline, enforced both by the waiting caller and the drainer.
    pub timeout: Duration,
    /// How often the background drainer scans the queue.
    pub drain_cadence: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_cpu_threshold: 80.0,
            prespawn_threshold: 70.0,
            gateway_port: 3000,
            worker_base_port: 8000,
            initial_workers: 1,
            worker_image: "coregate-worker:latest".to_string(),
            slot_catalogue: default_slot_catalogue(),
            queue: QueueConfig::default(),
            provision_settle: Duration::from_secs(2),
            dispatch_headroom: Duration::from_secs(10),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 100,
            timeout: Duration::from_secs(30),
            drain_cadence: Duration::from_millis(500),
        }
    }
}

impl Config {
    /// Read configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Self {
            max_cpu_threshold: env_as("MAX_CPU_THRESHOLD", defaults.max_cpu_threshold),
            prespawn_threshold: env_as("PRESPAWN_THRESHOLD", defaults.prespawn_threshold),
            gateway_port: env_as("GATEWAY_PORT", defaults.gateway_port),
            worker_base_port: env_as("WORKER_BASE_PORT", defaults.worker_base_port),
            initial_workers: env_as("INITIAL_WORKERS", defaults.initial_workers),
            worker_image: env::var("WORKER_IMAGE").unwrap_or(defaults.worker_image),
            slot_catalogue: defaults.slot_catalogue,
            queue: QueueConfig {
                enabled: env_as("QUEUE_ENABLED", defaults.queue.enabled),
                max_size: env_as("MAX_QUEUE_SIZE", defaults.queue.max_size),
                timeout: Duration::from_secs(env_as("QUEUE_TIMEOUT", 30)),
                drain_cadence: Duration::from_millis(env_as("DRAIN_CADENCE_MS", 500)),
            },
            provision_settle: Duration::from_secs(env_as("PROVISION_SETTLE_SECS", 2)),
            dispatch_headroom: Duration::from_secs(env_as("DISPATCH_HEADROOM_SECS", 10)),
        }
    }
}

/// Default hardware topology: three execution zones on an i5-1135G7, with
/// core 0 left to the gateway and the system. Each slot maps to the physical
/// core's two hyperthreads.
pub fn default_slot_catalogue() -> BTreeMap<SlotId, String> {
    BTreeMap::from([
        (1, "1,5".to_string()),
        (2, "2,6".to_string()),
        (3, "3,7".to_string()),
    ])
}

fn env_as<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
