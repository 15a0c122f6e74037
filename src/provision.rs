use std::collections::BTreeMap;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::Config;
use crate::error::{GateError, Result};
use crate::registry::SlotId;

/// A freshly started worker as reported by the provisioner.
#[derive(Debug, Clone)]
pub struct ProvisionedWorker {
    pub container_id: String,
    pub host_port: u16,
    /// Base URL reachable by the dispatcher once the settle period elapses.
    pub endpoint: String,
}

/// Starts and stops workers on named core slots.
///
/// Provisioning is synchronous and potentially slow (seconds). Failures are
/// surfaced verbatim; the scheduler never retries within a single placement
/// attempt. The settle wait after a successful start is the scheduler's
/// concern, not the driver's.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Start a worker container pinned to the given slot's cores.
    async fn start(&self, slot: SlotId) -> Result<ProvisionedWorker>;

    /// Stop a previously started worker. Used on orderly shutdown only.
    async fn stop(&self, container_id: &str) -> Result<()>;
}

/// Drives the local Docker daemon through the CLI. Pinning is enforced with
/// `--cpuset-cpus` from the slot catalogue; the container's port 8080 is
/// published on `base_port + slot`.
pub struct DockerProvisioner {
    image: String,
    base_port: u16,
    cpusets: BTreeMap<SlotId, String>,
}

impl DockerProvisioner {
    pub fn new(config: &Config) -> Self {
        Self {
            image: config.worker_image.clone(),
            base_port: config.worker_base_port,
            cpusets: config.slot_catalogue.clone(),
        }
    }

    /// Verify we can talk to the Docker daemon. Callers treat a failure here
    /// as fatal at startup.
    pub async fn check_connectivity(&self) -> Result<()> {
        let output = Command::new("docker")
            .args(["info", "--format", "{{.Name}} (CPUs: {{.NCPU}})"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| GateError::ProvisionFailed(format!("cannot reach docker daemon: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GateError::ProvisionFailed(format!(
                "docker daemon not responding: {}",
                stderr.trim()
            )));
        }

        let daemon = String::from_utf8_lossy(&output.stdout);
        tracing::info!(daemon = %daemon.trim(), "Docker daemon connected");
        Ok(())
    }
}

#[async_trait]
impl Provisioner for DockerProvisioner {
    async fn start(&self, slot: SlotId) -> Result<ProvisionedWorker> {
        let cpuset = self.cpusets.get(&slot).ok_or_else(|| {
            GateError::ProvisionFailed(format!(
                "invalid slot {slot} (valid: {:?})",
                self.cpusets.keys().collect::<Vec<_>>()
            ))
        })?;
        let host_port = self.base_port + slot as u16;

        tracing::info!(slot, cpuset = %cpuset, port = host_port, "spawning worker container");

        let output = Command::new("docker")
            .args([
                "run",
                "-d",
                "--rm",
                &format!("--cpuset-cpus={cpuset}"),
                "-p",
                &format!("{host_port}:8080"),
                "-e",
                &format!("WORKER_ID=Worker-Core-{slot}"),
                &self.image,
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| GateError::ProvisionFailed(format!("container start failed: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GateError::ProvisionFailed(format!(
                "container start failed: {}",
                stderr.trim()
            )));
        }

        let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if container_id.is_empty() {
            return Err(GateError::ProvisionFailed(
                "docker run returned no container id".to_string(),
            ));
        }

        Ok(ProvisionedWorker {
            container_id,
            host_port,
            endpoint: format!("http://127.0.0.1:{host_port}"),
        })
    }

    async fn stop(&self, container_id: &str) -> Result<()> {
        let output = Command::new("docker")
            .args(["rm", "-f", container_id])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| GateError::ProvisionFailed(format!("container stop failed: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GateError::ProvisionFailed(format!(
                "container stop failed: {}",
                stderr.trim()
            )));
        }
        Ok(())
    }
}
