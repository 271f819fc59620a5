//! Capacity accounting, admission control, and node lifecycle reconciliation.

pub mod admission;
pub mod audit;
pub mod capacity;
pub mod error;
pub mod gate;
pub mod inventory;
pub mod lifecycle;
pub mod provisioning;
pub mod registry;

pub use admission::{Admission, AdmissionController, Release, RunRequest, ScalePolicy};
pub use audit::{
    build_audit_event, AuditAction, AuditEvent, AuditSink, InMemoryAuditSink, SharedAuditSink,
};
pub use capacity::{CapacityEstimator, FreeSlotQuery};
pub use error::{AdmissionError, AppResult, ProvisioningError, RegistryError, ScalerError};
pub use gate::{default_capability_match, Capabilities, CapabilityGate, CapabilityMatcher};
pub use inventory::{InventorySnapshot, InventorySource, SessionInfo, SlotSnapshot, WorkerSnapshot};
pub use lifecycle::{
    plan_hub_termination, plan_node_transitions, plan_reservation_reaping, ExpiryHeadroom,
    LifecycleTimings, NodeCycleReport, NodeLifecycleManager, NodeTransition,
};
pub use provisioning::{launch_count, LaunchRequest, ProvisioningGateway};
pub use registry::{
    DynamicNode, ExpiryRounding, HubStats, NodeStatus, RegistryState, Reservation, RunRegistry,
};
