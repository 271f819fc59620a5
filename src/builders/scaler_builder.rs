//! Builder wiring the registry, admission controller, lifecycle manager and
//! capability gate from configuration.

use std::sync::Arc;

use crate::config::ScalerConfig;
use crate::core::{
    AdmissionController, CapabilityGate, CapacityEstimator, Capabilities, InventorySource,
    LifecycleTimings, NodeLifecycleManager, ProvisioningGateway, RunRegistry, ScalePolicy,
    ScalerError, SharedAuditSink,
};
use crate::util::clock::Clock;

/// Gate type produced by [`build_scaler`].
pub type DefaultGate = CapabilityGate<fn(&Capabilities, &Capabilities) -> bool>;

/// Fully wired scaler sharing one registry.
pub struct Scaler {
    /// Shared run registry.
    pub registry: Arc<RunRegistry>,
    /// Admission controller for run requests.
    pub admission: Arc<AdmissionController>,
    /// Lifecycle manager driven by the periodic loops.
    pub lifecycle: Arc<NodeLifecycleManager>,
    /// Capability gate for the host scheduler.
    pub gate: Arc<DefaultGate>,
}

/// Build a scaler from configuration using the provided collaborators.
pub fn build_scaler(
    cfg: &ScalerConfig,
    inventory: Arc<dyn InventorySource>,
    provisioner: Arc<dyn ProvisioningGateway>,
    clock: Arc<dyn Clock>,
    audit: Option<SharedAuditSink>,
) -> Result<Scaler, ScalerError> {
    cfg.validate().map_err(ScalerError::Config)?;

    let registry = Arc::new(RunRegistry::new(cfg.hub_slot_ceiling));
    let estimator =
        CapacityEstimator::new(cfg.subtract_unstarted_reservations, cfg.unstarted_grace());
    let policy = ScalePolicy::new(
        &cfg.scalable_browsers,
        cfg.node_lifetime(),
        cfg.expiry_rounding,
        cfg.hub_address.clone(),
    );
    let timings = LifecycleTimings {
        reservation_staleness: cfg.reservation_staleness(),
        billing_grace: cfg.billing_grace(),
        billing_increment: cfg.billing_increment(),
        expiry_headroom: cfg.expiry_headroom,
    };

    let mut admission = AdmissionController::new(
        Arc::clone(&registry),
        estimator,
        Arc::clone(&inventory),
        Arc::clone(&provisioner),
        Arc::clone(&clock),
        policy,
    );
    let mut lifecycle = NodeLifecycleManager::new(
        Arc::clone(&registry),
        estimator,
        inventory,
        provisioner,
        clock,
        timings,
    )
    .with_hub_instance_id(cfg.hub_instance_id.clone());
    if let Some(audit) = audit {
        admission = admission.with_audit(Arc::clone(&audit));
        lifecycle = lifecycle.with_audit(audit);
    }

    tracing::info!(
        ceiling = cfg.hub_slot_ceiling,
        browsers = ?cfg.scalable_browsers.keys().collect::<Vec<_>>(),
        hub_instance = ?lifecycle.hub_instance_id(),
        "scaler built"
    );

    Ok(Scaler {
        gate: Arc::new(CapabilityGate::with_default_matcher(Arc::clone(&registry))),
        registry,
        admission: Arc::new(admission),
        lifecycle: Arc::new(lifecycle),
    })
}
