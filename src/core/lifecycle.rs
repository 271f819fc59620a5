//! Periodic reconciliation of reservations, dynamic nodes, and the hub itself.
//!
//! Each loop is split into a pure planner over a registry state and an
//! inventory snapshot, and an applying step on [`NodeLifecycleManager`] that
//! commits the plan under the registry lock and then makes any provisioning
//! calls with the lock released. A unit of work that no longer fits the
//! registry when it is applied is logged and skipped; the next cycle retries.
//!
//! Node lifetimes follow the billing increment: a node expires a few minutes
//! before its paid hour ends, is terminated once idle, and is extended by a
//! whole increment if it is still busy after the grace margin, since the next
//! hour has already been charged.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::audit::{self, AuditAction, SharedAuditSink};
use crate::core::capacity::{CapacityEstimator, FreeSlotQuery};
use crate::core::inventory::{InventorySnapshot, InventorySource};
use crate::core::provisioning::ProvisioningGateway;
use crate::core::registry::{DynamicNode, NodeStatus, RegistryState, RunRegistry};
use crate::util::clock::Clock;
use crate::util::serde::{NodeId, ReservationId};

/// How much headroom an expiring node needs before it is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryHeadroom {
    /// Free slots elsewhere on the hub must cover its capacity.
    #[default]
    ExcludeOwnSlots,
    /// Free slots, the node's own idle slots included, must cover its capacity.
    IncludeOwnSlots,
}

/// Thresholds used by the reaper and the node expirer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleTimings {
    /// Age after which a reservation without sessions is reaped.
    pub reservation_staleness: Duration,
    /// Time past expiry after which an expired node is extended instead of terminated.
    pub billing_grace: Duration,
    /// Expiry extension applied to a node kept for another increment.
    pub billing_increment: Duration,
    /// Headroom rule for expiring running nodes.
    pub expiry_headroom: ExpiryHeadroom,
}

impl Default for LifecycleTimings {
    fn default() -> Self {
        Self {
            reservation_staleness: Duration::from_secs(180),
            billing_grace: Duration::from_secs(6 * 60),
            billing_increment: Duration::from_secs(60 * 60),
            expiry_headroom: ExpiryHeadroom::ExcludeOwnSlots,
        }
    }
}

/// A planned change to one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTransition {
    /// `Running -> Expired`; the hub can absorb losing the node.
    Expire(NodeId),
    /// `Expired -> Running`, expiry pushed out by one billing increment.
    Extend(NodeId),
    /// `Expired -> Terminated`, followed by a terminate call.
    Terminate(NodeId),
}

impl NodeTransition {
    /// Node the transition applies to.
    pub fn node_id(&self) -> &str {
        match self {
            Self::Expire(id) | Self::Extend(id) | Self::Terminate(id) => id,
        }
    }
}

/// What one node-reconciliation cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeCycleReport {
    /// Nodes moved to `Expired`.
    pub expired: Vec<NodeId>,
    /// Nodes extended for another increment.
    pub extended: Vec<NodeId>,
    /// Nodes terminated.
    pub terminated: Vec<NodeId>,
    /// Planned transitions dropped because the registry disagreed.
    pub skipped: usize,
}

/// Reservations older than `staleness` with no session in the inventory.
pub fn plan_reservation_reaping(
    state: &RegistryState,
    inventory: &InventorySnapshot,
    staleness: Duration,
    now_ms: u128,
) -> Vec<ReservationId> {
    let mut stale: Vec<ReservationId> = state
        .reservations()
        .filter(|r| {
            if !r.is_older_than(staleness, now_ms) {
                tracing::debug!(reservation = %r.id, "reservation too young to analyze");
                return false;
            }
            !inventory.has_session_for(&r.id)
        })
        .map(|r| r.id.clone())
        .collect();
    stale.sort();
    stale
}

/// Transitions for every non-terminal node, oldest first.
///
/// Planned expiries are visible to the headroom check of later nodes in the
/// same cycle.
pub fn plan_node_transitions(
    state: &RegistryState,
    inventory: &InventorySnapshot,
    estimator: &CapacityEstimator,
    timings: &LifecycleTimings,
    now_ms: u128,
) -> Vec<NodeTransition> {
    let mut nodes: Vec<&DynamicNode> = state
        .nodes()
        .filter(|n| n.status != NodeStatus::Terminated)
        .collect();
    nodes.sort_by(|a, b| a.started_at_ms.cmp(&b.started_at_ms).then_with(|| a.id.cmp(&b.id)));

    let mut working = state.clone();
    let mut plan = Vec::new();

    for node in nodes {
        match node.status {
            NodeStatus::Running if node.is_past_expiry(now_ms) => {
                let query = FreeSlotQuery::new(&node.browser, node.os.as_deref());
                let query = match timings.expiry_headroom {
                    ExpiryHeadroom::IncludeOwnSlots => query,
                    ExpiryHeadroom::ExcludeOwnSlots => query.excluding_node(&node.id),
                };
                let free = estimator.compute_free_slots(&working, inventory, &query, now_ms);
                if free >= node.capacity {
                    if let Err(e) = working.set_node_status(&node.id, NodeStatus::Expired) {
                        tracing::warn!(node = %node.id, error = %e, "skipping node");
                        continue;
                    }
                    plan.push(NodeTransition::Expire(node.id.clone()));
                } else {
                    tracing::debug!(
                        node = %node.id,
                        free,
                        capacity = node.capacity,
                        "node past expiry but still needed"
                    );
                }
            }
            NodeStatus::Expired => {
                let drift_limit = node.expires_at_ms + timings.billing_grace.as_millis();
                if now_ms > drift_limit {
                    plan.push(NodeTransition::Extend(node.id.clone()));
                } else if inventory.active_sessions_on_node(&node.id) == 0 {
                    if !inventory.contains_node(&node.id) {
                        tracing::warn!(node = %node.id, "expired node not registered with hub");
                    }
                    plan.push(NodeTransition::Terminate(node.id.clone()));
                }
            }
            _ => {}
        }
    }

    plan
}

/// Hub instance to terminate when no worker is registered.
pub fn plan_hub_termination<'a>(
    hub_instance_id: Option<&'a str>,
    inventory: &InventorySnapshot,
) -> Option<&'a str> {
    hub_instance_id.filter(|_| inventory.is_empty())
}

/// Applies lifecycle plans to the registry and the provisioning gateway.
pub struct NodeLifecycleManager {
    registry: Arc<RunRegistry>,
    estimator: CapacityEstimator,
    inventory: Arc<dyn InventorySource>,
    provisioner: Arc<dyn ProvisioningGateway>,
    clock: Arc<dyn Clock>,
    timings: LifecycleTimings,
    hub_instance_id: Option<String>,
    audit: Option<SharedAuditSink>,
}

impl NodeLifecycleManager {
    /// Create a manager.
    pub fn new(
        registry: Arc<RunRegistry>,
        estimator: CapacityEstimator,
        inventory: Arc<dyn InventorySource>,
        provisioner: Arc<dyn ProvisioningGateway>,
        clock: Arc<dyn Clock>,
        timings: LifecycleTimings,
    ) -> Self {
        Self {
            registry,
            estimator,
            inventory,
            provisioner,
            clock,
            timings,
            hub_instance_id: None,
            audit: None,
        }
    }

    /// Enable hub self-termination for a dynamically provisioned hub.
    #[must_use]
    pub fn with_hub_instance_id(mut self, hub_instance_id: Option<String>) -> Self {
        self.hub_instance_id = hub_instance_id.filter(|id| !id.is_empty());
        self
    }

    /// Attach an audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: SharedAuditSink) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Hub instance id, when self-termination is enabled.
    pub fn hub_instance_id(&self) -> Option<&str> {
        self.hub_instance_id.as_deref()
    }

    /// Delete stale reservations that never produced, or no longer have, a session.
    pub fn reap_reservations(&self) -> Vec<ReservationId> {
        let now = self.clock.now_ms();
        let candidates = plan_reservation_reaping(
            &self.registry.snapshot(),
            &self.inventory.snapshot(),
            self.timings.reservation_staleness,
            now,
        );
        if candidates.is_empty() {
            tracing::debug!("no reservations to reap");
            return candidates;
        }

        let inventory = self.inventory.snapshot();
        let mut txn = self.registry.transaction();
        let mut reaped = Vec::with_capacity(candidates.len());
        for id in candidates {
            if inventory.has_session_for(&id) {
                tracing::info!(
                    reservation = %id,
                    "session started before reaping; keeping reservation"
                );
                continue;
            }
            let still_stale = txn
                .state()
                .reservation(&id)
                .is_some_and(|r| r.is_older_than(self.timings.reservation_staleness, now));
            if !still_stale {
                tracing::debug!(reservation = %id, "reservation changed during reap; skipping");
                continue;
            }
            if txn.remove_reservation(&id) {
                tracing::warn!(reservation = %id, "removing reservation with no running sessions");
                reaped.push(id);
            }
        }
        drop(txn);

        for id in &reaped {
            audit::record(self.audit.as_ref(), id, AuditAction::Reap, now, None);
        }
        reaped
    }

    /// Expire, extend, and terminate dynamic nodes.
    pub async fn reconcile_nodes(&self) -> NodeCycleReport {
        let now = self.clock.now_ms();
        let mut report = NodeCycleReport::default();

        {
            let mut txn = self.registry.transaction();
            let inventory = self.inventory.snapshot();
            let plan = plan_node_transitions(
                txn.state(),
                &inventory,
                &self.estimator,
                &self.timings,
                now,
            );

            for transition in plan {
                let applied = match &transition {
                    NodeTransition::Expire(id) => txn.update_node_status(id, NodeStatus::Expired),
                    NodeTransition::Extend(id) => txn
                        .extend_node(id, self.timings.billing_increment)
                        .map(|expires_at_ms| {
                            tracing::info!(
                                node = %id,
                                expires_at_ms,
                                "node still in use after allotted time; extended"
                            );
                        }),
                    NodeTransition::Terminate(id) => {
                        txn.update_node_status(id, NodeStatus::Terminated)
                    }
                };
                if let Err(e) = applied {
                    tracing::warn!(
                        node = %transition.node_id(),
                        error = %e,
                        "skipping node transition"
                    );
                    report.skipped += 1;
                    continue;
                }
                match transition {
                    NodeTransition::Expire(id) => {
                        tracing::info!(node = %id, "node expired");
                        report.expired.push(id);
                    }
                    NodeTransition::Extend(id) => report.extended.push(id),
                    NodeTransition::Terminate(id) => report.terminated.push(id),
                }
            }
        }

        for id in &report.terminated {
            tracing::info!(node = %id, "terminating node");
            if let Err(e) = self.provisioner.terminate(id).await {
                tracing::error!(node = %id, error = %e, "node termination failed");
            }
        }

        let sink = self.audit.as_ref();
        for id in &report.expired {
            audit::record(sink, id, AuditAction::Expire, now, None);
        }
        for id in &report.extended {
            audit::record(sink, id, AuditAction::Extend, now, None);
        }
        for id in &report.terminated {
            audit::record(sink, id, AuditAction::Terminate, now, None);
        }
        report
    }

    /// Terminate this hub when no worker is registered. Returns whether
    /// termination was requested.
    pub async fn check_hub(&self) -> bool {
        let inventory = self.inventory.snapshot();
        let Some(hub_id) = plan_hub_termination(self.hub_instance_id.as_deref(), &inventory) else {
            return false;
        };
        tracing::warn!(hub = %hub_id, "no registered workers; terminating hub");
        if let Err(e) = self.provisioner.terminate(hub_id).await {
            tracing::error!(hub = %hub_id, error = %e, "hub termination failed");
        }
        audit::record(
            self.audit.as_ref(),
            hub_id,
            AuditAction::HubTerminate,
            self.clock.now_ms(),
            None,
        );
        true
    }
}
