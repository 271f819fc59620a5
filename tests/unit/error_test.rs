//! Tests for error types

use grid_scaler::core::{AdmissionError, NodeStatus, ProvisioningError, RegistryError, ScalerError};

#[test]
fn test_admission_error_display() {
    let err = AdmissionError::HubCapacityExceeded {
        requested: 11,
        available: 10,
    };
    assert_eq!(err.to_string(), "hub capacity exceeded: requested 11, available 10");

    let err = AdmissionError::DuplicateReservation("run-1".into());
    assert_eq!(err.to_string(), "reservation already exists: run-1");
}

#[test]
fn test_registry_error_display() {
    let err = RegistryError::InvalidTransition {
        node: "i-1".into(),
        from: NodeStatus::Terminated,
        to: NodeStatus::Running,
    };
    assert_eq!(err.to_string(), "invalid transition for node i-1: Terminated -> Running");
}

#[test]
fn test_scaler_error_from() {
    let err: ScalerError = ProvisioningError::Unavailable("no credentials".into()).into();
    assert!(matches!(err, ScalerError::Provisioning(_)));
    assert_eq!(err.to_string(), "provider unavailable: no credentials");

    let err: ScalerError = RegistryError::NodeNotFound("i-9".into()).into();
    assert!(matches!(err, ScalerError::Registry(_)));
}
