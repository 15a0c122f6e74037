use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Utc};

use crate::error::{GateError, Result};

/// Identifies one physical-core reservation. The catalogue of slots is fixed
/// at startup.
pub type SlotId = u32;

/// State and metrics of a running worker container.
#[derive(Debug, Clone)]
pub struct Worker {
    pub slot_id: SlotId,
    /// Opaque handle issued by the provisioner.
    pub container_id: String,
    pub host_port: u16,
    /// Base URL the dispatcher POSTs to.
    pub endpoint: String,
    /// Sum of in-flight job estimates, in percent of one core (0-100).
    /// A bookkeeping figure, not a measurement.
    pub reserved_cpu: f64,
    pub last_heartbeat: DateTime<Utc>,
    pub healthy: bool,
}

impl Worker {
    pub fn new(slot_id: SlotId, container_id: String, host_port: u16, endpoint: String) -> Self {
        Self {
            slot_id,
            container_id,
            host_port,
            endpoint,
            reserved_cpu: 0.0,
            last_heartbeat: Utc::now(),
            healthy: true,
        }
    }

    /// Truncated container ID for display, the way container runtimes print it.
    pub fn short_container_id(&self) -> &str {
        let end = self.container_id.len().min(12);
        &self.container_id[..end]
    }
}

/// Single source of truth for worker state. All reads and mutations funnel
/// through this type; it is composed as `Arc<RwLock<WorkerRegistry>>` and a
/// held write guard serializes compound observe-then-reserve operations.
#[derive(Debug)]
pub struct WorkerRegistry {
    /// The fixed set of provisionable slots.
    catalogue: BTreeSet<SlotId>,
    workers: BTreeMap<SlotId, Worker>,
    /// Slots with provisioning in progress. Skipped by `next_free_slot` so
    /// concurrent placements can never double-provision a slot.
    claimed: HashSet<SlotId>,
}

impl WorkerRegistry {
    pub fn new(catalogue: impl IntoIterator<Item = SlotId>) -> Self {
        Self {
            catalogue: catalogue.into_iter().collect(),
            workers: BTreeMap::new(),
            claimed: HashSet::new(),
        }
    }

    /// Stable snapshot of all workers. Callers may iterate without holding
    /// the registry lock; the copies do not observe later mutations.
    pub fn workers(&self) -> Vec<Worker> {
        self.workers.values().cloned().collect()
    }

    /// Iterate workers in ascending slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Worker> {
        self.workers.values()
    }

    pub fn get(&self, slot: SlotId) -> Option<&Worker> {
        self.workers.get(&slot)
    }

    pub fn count(&self) -> usize {
        self.workers.len()
    }

    /// Insert a newly provisioned worker. Fails if the slot is already
    /// populated; clears any provisioning claim on the slot.
    pub fn register(&mut self, worker: Worker) -> Result<()> {
        let slot = worker.slot_id;
        if self.workers.contains_key(&slot) {
            return Err(GateError::SlotOccupied(slot));
        }
        self.claimed.remove(&slot);
        self.workers.insert(slot, worker);
        Ok(())
    }

    /// Atomically apply `delta` to a worker's reservation, clamping at zero.
    /// The clamp is mandatory: floating drift or a failure-path double
    /// decrement must never produce a negative reservation.
    pub fn adjust_reserved(&mut self, slot: SlotId, delta: f64) {
        if let Some(worker) = self.workers.get_mut(&slot) {
            worker.reserved_cpu = (worker.reserved_cpu + delta).max(0.0);
            worker.last_heartbeat = Utc::now();
        }
    }

    /// Lowest catalogue slot that is neither populated nor claimed.
    pub fn next_free_slot(&self) -> Option<SlotId> {
        self.catalogue
            .iter()
            .copied()
            .find(|slot| !self.workers.contains_key(slot) && !self.claimed.contains(slot))
    }

    /// Mark a slot as provisioning-in-progress so concurrent placements skip
    /// it while the slow start call runs outside the lock.
    pub fn claim_slot(&mut self, slot: SlotId) -> Result<()> {
        if self.workers.contains_key(&slot) {
            return Err(GateError::SlotOccupied(slot));
        }
        if !self.claimed.insert(slot) {
            return Err(GateError::SlotOccupied(slot));
        }
        Ok(())
    }

    /// Release a claim after a failed provisioning attempt.
    pub fn release_claim(&mut self, slot: SlotId) {
        self.claimed.remove(&slot);
    }
}
