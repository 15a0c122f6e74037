use crate::registry::{SlotId, Worker, WorkerRegistry};

/// Outcome of a placement decision. Transient; never persisted.
#[derive(Debug, Clone)]
pub enum Placement {
    /// An existing worker can absorb the load.
    Hit(Worker),
    /// No eligible worker, but this slot is free to provision.
    Provision(SlotId),
    /// Pool saturated and every slot occupied or being provisioned.
    Reject,
}

/// Decide where a job with the given CPU estimate should run.
///
/// Eligible workers satisfy `reserved_cpu + estimated_cpu <= max_threshold`;
/// among those the one with the lowest current reservation wins, ties broken
/// by lowest slot. The caller must hold the registry write guard and commit
/// the reservation before releasing it, otherwise two concurrent placements
/// can both pick the same "lowest" worker and overshoot the threshold.
pub fn select(registry: &WorkerRegistry, estimated_cpu: f64, max_threshold: f64) -> Placement {
    let mut best: Option<&Worker> = None;

    // Ascending slot order, so a strict comparison breaks ties low.
    for worker in registry.iter() {
        if worker.reserved_cpu + estimated_cpu > max_threshold {
            continue;
        }
        match best {
            Some(current) if worker.reserved_cpu >= current.reserved_cpu => {}
            _ => best = Some(worker),
        }
    }

    if let Some(worker) = best {
        return Placement::Hit(worker.clone());
    }

    match registry.next_free_slot() {
        Some(slot) => Placement::Provision(slot),
        None => Placement::Reject,
    }
}
