//! Admission control for run requests.
//!
//! The duplicate check, the hub ceiling check, the free-slot estimate and the
//! optimistic reservation all happen under one registry write lock, so two
//! concurrent requests can never both be admitted against the same headroom.
//! The lock is released before the provisioning gateway is called; a failed
//! launch rolls the reservation back.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::audit::{self, AuditAction, SharedAuditSink};
use crate::core::capacity::{CapacityEstimator, FreeSlotQuery};
use crate::core::inventory::InventorySource;
use crate::core::provisioning::{launch_count, LaunchRequest, ProvisioningGateway};
use crate::core::registry::{DynamicNode, ExpiryRounding, Reservation, RunRegistry};
use crate::core::AdmissionError;
use crate::util::clock::Clock;
use crate::util::serde::{normalize_capability, ReservationId};

/// A structured request for N concurrent slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Client-supplied reservation id.
    pub reservation_id: ReservationId,
    /// Requested browser.
    pub browser: String,
    /// Requested operating system.
    pub os: Option<String>,
    /// Requested concurrent slots.
    pub concurrency: u32,
}

impl RunRequest {
    /// Build a request.
    pub fn new(
        reservation_id: impl Into<ReservationId>,
        browser: impl Into<String>,
        os: Option<&str>,
        concurrency: u32,
    ) -> Self {
        Self {
            reservation_id: reservation_id.into(),
            browser: browser.into(),
            os: os.map(str::to_string),
            concurrency,
        }
    }
}

/// Successful admission outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Admission {
    /// Existing idle capacity covers the request.
    Fulfilled,
    /// The given number of workers is being launched to cover the deficit.
    NeedsScaling(u32),
}

/// Outcome of releasing a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Release {
    /// The reservation was removed.
    Deleted,
    /// No reservation with that id was tracked.
    NotFound,
}

/// Scale-out parameters used when admission requires new workers.
#[derive(Debug, Clone)]
pub struct ScalePolicy {
    /// Normalized browser name to slots per launched node.
    node_capacity: BTreeMap<String, u32>,
    /// Lifetime of a fresh node before it is considered for expiry.
    pub node_lifetime: Duration,
    /// How the initial expiry is computed.
    pub expiry_rounding: ExpiryRounding,
    /// Address launched workers register with.
    pub hub_address: Option<String>,
}

impl ScalePolicy {
    /// Policy over the given browser capacities.
    pub fn new(
        scalable_browsers: &BTreeMap<String, u32>,
        node_lifetime: Duration,
        expiry_rounding: ExpiryRounding,
        hub_address: Option<String>,
    ) -> Self {
        Self {
            node_capacity: scalable_browsers
                .iter()
                .map(|(browser, capacity)| (normalize_capability(browser), *capacity))
                .collect(),
            node_lifetime,
            expiry_rounding,
            hub_address,
        }
    }

    /// Slots per node for a scalable browser, `None` when the browser cannot be provisioned.
    pub fn capacity_for(&self, browser: &str) -> Option<u32> {
        self.node_capacity
            .get(&normalize_capability(browser))
            .copied()
            .filter(|c| *c > 0)
    }
}

/// Decides whether run requests are fulfilled, scaled out, or rejected.
///
/// The only writer of new reservations and nodes.
pub struct AdmissionController {
    registry: Arc<RunRegistry>,
    estimator: CapacityEstimator,
    inventory: Arc<dyn InventorySource>,
    provisioner: Arc<dyn ProvisioningGateway>,
    clock: Arc<dyn Clock>,
    policy: ScalePolicy,
    audit: Option<SharedAuditSink>,
}

impl AdmissionController {
    /// Create a controller from its collaborators.
    pub fn new(
        registry: Arc<RunRegistry>,
        estimator: CapacityEstimator,
        inventory: Arc<dyn InventorySource>,
        provisioner: Arc<dyn ProvisioningGateway>,
        clock: Arc<dyn Clock>,
        policy: ScalePolicy,
    ) -> Self {
        Self {
            registry,
            estimator,
            inventory,
            provisioner,
            clock,
            policy,
            audit: None,
        }
    }

    /// Attach an audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: SharedAuditSink) -> Self {
        self.audit = Some(audit);
        self
    }

    /// The registry this controller writes to.
    pub const fn registry(&self) -> &Arc<RunRegistry> {
        &self.registry
    }

    /// Admit, scale out for, or reject a run request.
    pub async fn request_run(&self, request: &RunRequest) -> Result<Admission, AdmissionError> {
        let result = self.admit(request).await;
        let now = self.clock.now_ms();
        match &result {
            Ok(Admission::Fulfilled) => {
                audit::record(
                    self.audit.as_ref(),
                    &request.reservation_id,
                    AuditAction::Admit,
                    now,
                    None,
                );
            }
            Ok(Admission::NeedsScaling(count)) => {
                audit::record(
                    self.audit.as_ref(),
                    &request.reservation_id,
                    AuditAction::Scale,
                    now,
                    Some(format!("launched {count}")),
                );
            }
            Err(e) => {
                tracing::warn!(
                    reservation = %request.reservation_id,
                    error = %e,
                    "run request rejected"
                );
                audit::record(
                    self.audit.as_ref(),
                    &request.reservation_id,
                    AuditAction::Reject,
                    now,
                    Some(e.to_string()),
                );
            }
        }
        result
    }

    async fn admit(&self, request: &RunRequest) -> Result<Admission, AdmissionError> {
        if request.reservation_id.trim().is_empty() {
            return Err(AdmissionError::InvalidRequest("reservation id must not be empty".into()));
        }
        if request.concurrency == 0 {
            return Err(AdmissionError::InvalidRequest("concurrency must be positive".into()));
        }
        tracing::info!(
            reservation = %request.reservation_id,
            browser = %request.browser,
            os = ?request.os,
            concurrency = request.concurrency,
            "run request received"
        );

        let (launch, ticket) = {
            let mut txn = self.registry.transaction();
            if txn.state().has_reservation(&request.reservation_id) {
                return Err(AdmissionError::DuplicateReservation(request.reservation_id.clone()));
            }

            let available = txn.available_hub_slots();
            if request.concurrency > available {
                return Err(AdmissionError::HubCapacityExceeded {
                    requested: request.concurrency,
                    available,
                });
            }

            let now = self.clock.now_ms();
            let inventory = self.inventory.snapshot();
            let query = FreeSlotQuery::new(&request.browser, request.os.as_deref());
            let free = self
                .estimator
                .compute_free_slots(txn.state(), &inventory, &query, now);
            let reservation = Reservation::new(
                request.reservation_id.clone(),
                request.concurrency,
                request.browser.clone(),
                now,
            );

            if free >= request.concurrency {
                txn.add_reservation(reservation);
                tracing::info!(
                    reservation = %request.reservation_id,
                    free,
                    "request fulfilled from existing capacity"
                );
                return Ok(Admission::Fulfilled);
            }

            let deficit = request.concurrency - free;
            let Some(capacity_per_node) = self.policy.capacity_for(&request.browser) else {
                return Err(AdmissionError::UnsupportedBrowser(request.browser.clone()));
            };
            let Some(ticket) = txn.add_reservation(reservation) else {
                return Err(AdmissionError::DuplicateReservation(request.reservation_id.clone()));
            };

            let launch = LaunchRequest {
                reservation_id: request.reservation_id.clone(),
                os: request.os.clone(),
                browser: request.browser.clone(),
                count: launch_count(deficit, capacity_per_node),
                capacity_per_node,
                hub_address: self.policy.hub_address.clone(),
            };
            (launch, ticket)
        };

        tracing::warn!(
            reservation = %launch.reservation_id,
            requested = request.concurrency,
            nodes = launch.count,
            per_node = launch.capacity_per_node,
            "insufficient free slots; launching nodes"
        );
        let count = launch.count;
        let capacity_per_node = launch.capacity_per_node;

        let node_ids = match self.provisioner.launch_nodes(launch).await {
            Ok(ids) => ids,
            Err(e) => {
                // The id may have been released and admitted again while the lock was free.
                if !self.registry.remove_reservation_if(&request.reservation_id, ticket) {
                    tracing::warn!(
                        reservation = %request.reservation_id,
                        "reservation replaced during launch; leaving it in place"
                    );
                }
                tracing::error!(
                    reservation = %request.reservation_id,
                    error = %e,
                    "node launch failed; reservation rolled back"
                );
                return Err(AdmissionError::ProvisioningFailure(e.to_string()));
            }
        };

        if node_ids.len() != count as usize {
            tracing::warn!(
                reservation = %request.reservation_id,
                requested = count,
                launched = node_ids.len(),
                "gateway launched a different number of nodes than requested"
            );
        }

        // All nodes of one launch share a start time.
        let started_at = self.clock.now_ms();
        for node_id in node_ids {
            let node = DynamicNode::new(
                node_id,
                request.reservation_id.clone(),
                request.browser.clone(),
                request.os.clone(),
                started_at,
                capacity_per_node,
                self.policy.node_lifetime,
                self.policy.expiry_rounding,
            );
            tracing::info!(
                node = %node.id,
                expires_at_ms = node.expires_at_ms,
                "tracking launched node"
            );
            if let Err(e) = self.registry.add_node(node) {
                tracing::error!(error = %e, "launched node could not be tracked");
            }
        }

        Ok(Admission::NeedsScaling(count))
    }

    /// Release a reservation.
    pub fn release_run(&self, reservation_id: &str) -> Release {
        if self.registry.remove_reservation(reservation_id) {
            tracing::info!(reservation = %reservation_id, "reservation released");
            audit::record(
                self.audit.as_ref(),
                reservation_id,
                AuditAction::Release,
                self.clock.now_ms(),
                None,
            );
            Release::Deleted
        } else {
            tracing::warn!(reservation = %reservation_id, "release of unknown reservation");
            Release::NotFound
        }
    }

    /// Free matching slots right now, without reserving anything.
    pub fn free_slots(&self, browser: &str, os: Option<&str>) -> u32 {
        let state = self.registry.snapshot();
        let inventory = self.inventory.snapshot();
        self.estimator.compute_free_slots(
            &state,
            &inventory,
            &FreeSlotQuery::new(browser, os),
            self.clock.now_ms(),
        )
    }

    /// Claim every currently free matching slot under a reservation named after
    /// the browser.
    ///
    /// Returns the number of slots claimed; nothing is registered when no slot
    /// is free. Fails with `DuplicateReservation` while an earlier claim for the
    /// same browser is still live.
    pub fn claim_free_slots(&self, browser: &str, os: Option<&str>) -> Result<u32, AdmissionError> {
        let now = self.clock.now_ms();
        let mut txn = self.registry.transaction();
        if txn.state().has_reservation(browser) {
            return Err(AdmissionError::DuplicateReservation(browser.to_string()));
        }
        let inventory = self.inventory.snapshot();
        let free = self.estimator.compute_free_slots(
            txn.state(),
            &inventory,
            &FreeSlotQuery::new(browser, os),
            now,
        );
        let claimed = free.min(txn.available_hub_slots());
        if claimed > 0 {
            txn.add_reservation(Reservation::new(browser, claimed, browser, now));
            drop(txn);
            audit::record(
                self.audit.as_ref(),
                browser,
                AuditAction::Admit,
                now,
                Some(format!("claimed {claimed} free slots")),
            );
        }
        tracing::info!(browser, claimed, "free slots claimed");
        Ok(claimed)
    }
}
