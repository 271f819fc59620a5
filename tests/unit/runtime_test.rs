//! Tests for runtime API surface

use std::sync::Arc;

use grid_scaler::core::{
    Admission, AdmissionController, CapacityEstimator, ExpiryRounding, Release, RunRegistry,
    ScalePolicy, SlotSnapshot, WorkerSnapshot,
};
use grid_scaler::infra::{InMemoryProvisioner, StaticInventory};
use grid_scaler::runtime::{
    claim_free_slots, create_run, delete_run, free_slots, health, CreateRunRequest, RunResponse,
};
use grid_scaler::util::ManualClock;

fn controller(inventory: StaticInventory) -> AdmissionController {
    let browsers = [("chrome".to_string(), 6)].into_iter().collect();
    AdmissionController::new(
        Arc::new(RunRegistry::new(10)),
        CapacityEstimator::new(false, std::time::Duration::from_secs(120)),
        Arc::new(inventory),
        Arc::new(InMemoryProvisioner::new()),
        Arc::new(ManualClock::new(0)),
        ScalePolicy::new(
            &browsers,
            std::time::Duration::from_secs(3300),
            ExpiryRounding::Exact,
            None,
        ),
    )
}

fn two_idle_chrome() -> StaticInventory {
    StaticInventory::new(vec![WorkerSnapshot::new(
        "w-1",
        2,
        vec![SlotSnapshot::idle("chrome", "linux"); 2],
    )])
}

#[tokio::test]
async fn test_create_and_delete_run() {
    let controller = controller(two_idle_chrome());
    let response = create_run(
        &controller,
        CreateRunRequest {
            uuid: Some("run-1".into()),
            browser: Some("chrome".into()),
            os: None,
            thread_count: Some(2),
        },
    )
    .await;
    assert_eq!(response, RunResponse::Admitted(Admission::Fulfilled));
    assert_eq!(response.status_code(), 202);

    let deleted = delete_run(&controller, "run-1");
    assert_eq!(deleted.outcome, Release::Deleted);
    assert_eq!(deleted.status_code(), 202);
    assert_eq!(delete_run(&controller, "run-1").status_code(), 409);
}

#[tokio::test]
async fn test_create_run_rejects_missing_params() {
    let controller = controller(two_idle_chrome());
    let response = create_run(&controller, CreateRunRequest::default()).await;
    assert!(!response.is_admitted());
    assert_eq!(response.status_code(), 400);
    assert!(controller.registry().list_reservation_ids().is_empty());
}

#[test]
fn test_free_slots_and_claim() {
    let controller = controller(two_idle_chrome());
    assert_eq!(free_slots(&controller, "chrome", None).free_slots, 2);

    let claimed = claim_free_slots(&controller, "chrome", None).unwrap();
    assert_eq!(claimed.free_slots, 2);
    assert!(controller.registry().has_reservation("chrome"));
    assert!(claim_free_slots(&controller, "chrome", None).is_err());

    let stats = health(controller.registry()).stats;
    assert_eq!(stats.reserved_slots, 2);
    assert_eq!(stats.available_slots, 8);
}
