//! Error types for admission, registry, and provisioning operations.

use thiserror::Error;

use crate::core::NodeStatus;
use crate::util::serde::{NodeId, ReservationId};

/// Reasons a run request is rejected. None of these are fatal to the process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// A reservation with this id is already tracked.
    #[error("reservation already exists: {0}")]
    DuplicateReservation(ReservationId),
    /// The request exceeds the remaining hub slot ceiling.
    #[error("hub capacity exceeded: requested {requested}, available {available}")]
    HubCapacityExceeded {
        /// Slots requested.
        requested: u32,
        /// Slots left under the ceiling.
        available: u32,
    },
    /// Scaling would be required but the browser cannot be provisioned.
    #[error("browser not supported for scale-out: {0}")]
    UnsupportedBrowser(String),
    /// Launching workers failed; the optimistic reservation was rolled back.
    #[error("provisioning failure: {0}")]
    ProvisioningFailure(String),
    /// Structurally invalid request that slipped past upstream validation.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Errors from registry mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No node is tracked under this id.
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),
    /// A node with this id is already tracked.
    #[error("node already tracked: {0}")]
    DuplicateNode(NodeId),
    /// The requested status change is not a legal lifecycle step.
    #[error("invalid transition for node {node}: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Node being updated.
        node: NodeId,
        /// Current status.
        from: NodeStatus,
        /// Requested status.
        to: NodeStatus,
    },
}

/// Errors reported by a provisioning gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisioningError {
    /// Instances could not be launched.
    #[error("launch failed: {0}")]
    Launch(String),
    /// Termination request failed.
    #[error("terminate failed: {0}")]
    Terminate(String),
    /// Provider unreachable or misconfigured.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Top-level error for wiring and configuration.
#[derive(Debug, Error)]
pub enum ScalerError {
    /// Configuration failed validation.
    #[error("config invalid: {0}")]
    Config(String),
    /// Registry failure.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Provisioning failure.
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
