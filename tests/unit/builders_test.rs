//! Tests for builder modules

use std::sync::Arc;

use grid_scaler::builders::build_scaler;
use grid_scaler::config::ScalerConfig;
use grid_scaler::core::{InMemoryAuditSink, RunRequest, ScalerError, SharedAuditSink};
use grid_scaler::infra::{InMemoryProvisioner, StaticInventory};
use grid_scaler::util::ManualClock;

#[test]
fn test_build_scaler_shares_registry() {
    let cfg = ScalerConfig {
        hub_slot_ceiling: 12,
        hub_instance_id: Some("i-hub".into()),
        ..ScalerConfig::default()
    };
    let scaler = build_scaler(
        &cfg,
        Arc::new(StaticInventory::default()),
        Arc::new(InMemoryProvisioner::new()),
        Arc::new(ManualClock::new(0)),
        None,
    )
    .unwrap();

    assert_eq!(scaler.registry.ceiling(), 12);
    assert!(Arc::ptr_eq(&scaler.registry, scaler.admission.registry()));
    assert_eq!(scaler.lifecycle.hub_instance_id(), Some("i-hub"));
}

#[test]
fn test_build_scaler_rejects_invalid_config() {
    let cfg = ScalerConfig {
        hub_slot_ceiling: 0,
        ..ScalerConfig::default()
    };
    let result = build_scaler(
        &cfg,
        Arc::new(StaticInventory::default()),
        Arc::new(InMemoryProvisioner::new()),
        Arc::new(ManualClock::new(0)),
        None,
    );
    assert!(matches!(result, Err(ScalerError::Config(_))));
}

#[tokio::test]
async fn test_build_scaler_wires_audit_sink() {
    let sink = InMemoryAuditSink::new(16);
    let shared: SharedAuditSink = Arc::new(sink.clone());
    let scaler = build_scaler(
        &ScalerConfig::default(),
        Arc::new(StaticInventory::default()),
        Arc::new(InMemoryProvisioner::new()),
        Arc::new(ManualClock::new(0)),
        Some(shared),
    )
    .unwrap();

    let outcome = scaler
        .admission
        .request_run(&RunRequest::new("run-1", "chrome", None, 2))
        .await;
    assert!(outcome.is_ok());
    assert_eq!(sink.events().len(), 1);
}
