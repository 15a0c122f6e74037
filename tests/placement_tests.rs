use coregate::placement::{select, Placement};
use coregate::registry::{Worker, WorkerRegistry};

const MAX_THRESHOLD: f64 = 80.0;

fn registry_with(workers: &[(u32, f64)]) -> WorkerRegistry {
    let mut registry = WorkerRegistry::new([1, 2, 3]);
    for &(slot, reserved) in workers {
        registry
            .register(Worker::new(
                slot,
                format!("container-{slot}"),
                8000 + slot as u16,
                format!("http://127.0.0.1:{}", 8000 + slot),
            ))
            .unwrap();
        registry.adjust_reserved(slot, reserved);
    }
    registry
}

#[test]
fn empty_pool_provisions_lowest_slot() {
    let registry = registry_with(&[]);
    let decision = select(&registry, 25.0, MAX_THRESHOLD);
    assert!(matches!(decision, Placement::Provision(1)));
}

#[test]
fn picks_lowest_reservation() {
    let registry = registry_with(&[(1, 50.0), (2, 10.0), (3, 30.0)]);
    match select(&registry, 20.0, MAX_THRESHOLD) {
        Placement::Hit(worker) => assert_eq!(worker.slot_id, 2),
        other => panic!("expected hit, got {other:?}"),
    }
}

#[test]
fn ties_break_to_lowest_slot() {
    let registry = registry_with(&[(1, 40.0), (2, 40.0), (3, 40.0)]);
    match select(&registry, 20.0, MAX_THRESHOLD) {
        Placement::Hit(worker) => assert_eq!(worker.slot_id, 1),
        other => panic!("expected hit, got {other:?}"),
    }
}

#[test]
fn threshold_gate_excludes_overloaded_workers() {
    // Slot 1 is the least loaded but 75 + 20 > 80; slot 2 fits exactly.
    let registry = registry_with(&[(1, 75.0), (2, 60.0)]);
    match select(&registry, 20.0, MAX_THRESHOLD) {
        Placement::Hit(worker) => assert_eq!(worker.slot_id, 2),
        other => panic!("expected hit, got {other:?}"),
    }
}

#[test]
fn exact_threshold_is_eligible() {
    let registry = registry_with(&[(1, 60.0)]);
    match select(&registry, 20.0, MAX_THRESHOLD) {
        Placement::Hit(worker) => assert_eq!(worker.slot_id, 1),
        other => panic!("expected hit, got {other:?}"),
    }
}

#[test]
fn saturated_pool_provisions_free_slot() {
    let registry = registry_with(&[(1, 70.0), (2, 70.0)]);
    let decision = select(&registry, 20.0, MAX_THRESHOLD);
    assert!(matches!(decision, Placement::Provision(3)));
}

#[test]
fn saturated_full_pool_rejects() {
    let registry = registry_with(&[(1, 70.0), (2, 70.0), (3, 70.0)]);
    let decision = select(&registry, 20.0, MAX_THRESHOLD);
    assert!(matches!(decision, Placement::Reject));
}

#[test]
fn claimed_slot_is_not_offered_for_provisioning() {
    let mut registry = registry_with(&[(1, 70.0), (2, 70.0)]);
    registry.claim_slot(3).unwrap();

    let decision = select(&registry, 20.0, MAX_THRESHOLD);
    assert!(matches!(decision, Placement::Reject));
}
