//! Run registry: the single shared store of reservations and dynamic nodes.
//!
//! All state lives behind one `parking_lot::RwLock`. Individual operations on
//! [`RunRegistry`] are atomic with respect to each other; multi-step decisions
//! (admission, lifecycle transitions) take a `RegistryTxn` so the read and
//! the write happen under the same write lock.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use parking_lot::{RwLock, RwLockWriteGuard};
use serde::{Deserialize, Serialize};

use crate::core::RegistryError;
use crate::util::serde::{NodeId, ReservationId};

const MINUTE_MS: u128 = 60_000;

/// A tracked claim on N concurrent execution slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Client-supplied id, unique within the registry.
    pub id: ReservationId,
    /// Requested concurrent slots.
    pub concurrency: u32,
    /// Requested browser.
    pub browser: String,
    /// Admission time in milliseconds since epoch.
    pub created_at_ms: u128,
}

impl Reservation {
    /// Create a reservation admitted at `created_at_ms`.
    pub fn new(
        id: impl Into<ReservationId>,
        concurrency: u32,
        browser: impl Into<String>,
        created_at_ms: u128,
    ) -> Self {
        Self {
            id: id.into(),
            concurrency,
            browser: browser.into(),
            created_at_ms,
        }
    }

    /// True once the reservation is strictly older than `threshold`.
    pub fn is_older_than(&self, threshold: Duration, now_ms: u128) -> bool {
        now_ms > self.created_at_ms + threshold.as_millis()
    }
}

/// Lifecycle status of a dynamic node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    /// Serving work; counts as free capacity.
    Running,
    /// Past its lifetime and queued for teardown.
    Expired,
    /// Terminated through the provisioning gateway. Absorbing.
    Terminated,
}

impl NodeStatus {
    /// Whether `self -> next` is a legal lifecycle step.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Running, Self::Expired)
                | (Self::Expired, Self::Running)
                | (Self::Expired, Self::Terminated)
        )
    }
}

/// How a node's initial expiry is derived from its start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryRounding {
    /// Expiry = start + lifetime, to the millisecond.
    #[default]
    Exact,
    /// Expiry = start truncated to its minute + lifetime.
    WholeMinute,
}

impl ExpiryRounding {
    /// Expiry instant for a node started at `started_at_ms`.
    pub const fn expiry_from(self, started_at_ms: u128, lifetime: Duration) -> u128 {
        let base = match self {
            Self::Exact => started_at_ms,
            Self::WholeMinute => started_at_ms - started_at_ms % MINUTE_MS,
        };
        base + lifetime.as_millis()
    }
}

/// A cloud-provisioned worker launched to cover a reservation's deficit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicNode {
    /// Cloud instance id.
    pub id: NodeId,
    /// Reservation that caused the launch.
    pub reservation_id: ReservationId,
    /// Browser the node serves.
    pub browser: String,
    /// Operating system requested at launch, if any.
    pub os: Option<String>,
    /// Launch time in milliseconds since epoch.
    pub started_at_ms: u128,
    /// Current expiry in milliseconds since epoch.
    pub expires_at_ms: u128,
    /// Slots the node provides.
    pub capacity: u32,
    /// Current lifecycle status.
    pub status: NodeStatus,
}

impl DynamicNode {
    /// Create a `Running` node whose expiry is `lifetime` after its start.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<NodeId>,
        reservation_id: impl Into<ReservationId>,
        browser: impl Into<String>,
        os: Option<String>,
        started_at_ms: u128,
        capacity: u32,
        lifetime: Duration,
        rounding: ExpiryRounding,
    ) -> Self {
        Self {
            id: id.into(),
            reservation_id: reservation_id.into(),
            browser: browser.into(),
            os,
            started_at_ms,
            expires_at_ms: rounding.expiry_from(started_at_ms, lifetime),
            capacity,
            status: NodeStatus::Running,
        }
    }

    /// True once `now_ms` is strictly past the expiry.
    pub const fn is_past_expiry(&self, now_ms: u128) -> bool {
        now_ms > self.expires_at_ms
    }
}

/// Aggregate counters for status reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubStats {
    /// Configured slot ceiling.
    pub ceiling: u32,
    /// Live reservations.
    pub reservations: usize,
    /// Slots claimed by live reservations.
    pub reserved_slots: u64,
    /// Slots left under the ceiling.
    pub available_slots: u32,
    /// Nodes currently running.
    pub running_nodes: usize,
    /// Nodes awaiting teardown.
    pub expired_nodes: usize,
    /// Nodes already terminated.
    pub terminated_nodes: usize,
}

/// Identifies one admission of a reservation id.
///
/// A reservation released and admitted again under the same id gets a new ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReservationTicket(u64);

/// Reservations and nodes as seen at one instant.
///
/// Obtained as a copy through [`RunRegistry::snapshot`] or borrowed inside a
/// registry transaction; exposes only reads.
#[derive(Debug, Clone, Default)]
pub struct RegistryState {
    reservations: HashMap<ReservationId, Reservation>,
    tickets: HashMap<ReservationId, ReservationTicket>,
    next_ticket: u64,
    nodes: HashMap<NodeId, DynamicNode>,
}

impl RegistryState {
    /// Whether a reservation is tracked.
    pub fn has_reservation(&self, id: &str) -> bool {
        self.reservations.contains_key(id)
    }

    /// Reservation by id.
    pub fn reservation(&self, id: &str) -> Option<&Reservation> {
        self.reservations.get(id)
    }

    /// All live reservations.
    pub fn reservations(&self) -> impl Iterator<Item = &Reservation> {
        self.reservations.values()
    }

    /// Node by id.
    pub fn node(&self, id: &str) -> Option<&DynamicNode> {
        self.nodes.get(id)
    }

    /// All tracked nodes, terminal ones included.
    pub fn nodes(&self) -> impl Iterator<Item = &DynamicNode> {
        self.nodes.values()
    }

    /// Status of a node, if tracked.
    pub fn node_status(&self, id: &str) -> Option<NodeStatus> {
        self.nodes.get(id).map(|n| n.status)
    }

    /// Sum of concurrency over live reservations.
    pub fn reserved_slots(&self) -> u64 {
        self.reservations
            .values()
            .map(|r| u64::from(r.concurrency))
            .sum()
    }

    /// `ceiling - reserved`, clamped at zero.
    pub fn available_slots(&self, ceiling: u32) -> u32 {
        let free = u64::from(ceiling).saturating_sub(self.reserved_slots());
        u32::try_from(free).unwrap_or(u32::MAX)
    }

    fn insert_reservation(&mut self, reservation: Reservation) -> Option<ReservationTicket> {
        if self.reservations.contains_key(&reservation.id) {
            return None;
        }
        self.next_ticket += 1;
        let ticket = ReservationTicket(self.next_ticket);
        self.tickets.insert(reservation.id.clone(), ticket);
        self.reservations.insert(reservation.id.clone(), reservation);
        Some(ticket)
    }

    fn remove_reservation(&mut self, id: &str) -> bool {
        self.tickets.remove(id);
        self.reservations.remove(id).is_some()
    }

    fn remove_reservation_if(&mut self, id: &str, ticket: ReservationTicket) -> bool {
        if self.tickets.get(id) != Some(&ticket) {
            return false;
        }
        self.remove_reservation(id)
    }

    fn insert_node(&mut self, node: DynamicNode) -> Result<(), RegistryError> {
        if self.nodes.contains_key(&node.id) {
            return Err(RegistryError::DuplicateNode(node.id));
        }
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    pub(crate) fn set_node_status(
        &mut self,
        id: &str,
        status: NodeStatus,
    ) -> Result<(), RegistryError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| RegistryError::NodeNotFound(id.to_string()))?;
        if node.status == status {
            return Ok(());
        }
        if !node.status.can_transition_to(status) {
            return Err(RegistryError::InvalidTransition {
                node: id.to_string(),
                from: node.status,
                to: status,
            });
        }
        node.status = status;
        Ok(())
    }

    fn extend_node(&mut self, id: &str, by: Duration) -> Result<u128, RegistryError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| RegistryError::NodeNotFound(id.to_string()))?;
        if node.status != NodeStatus::Expired {
            return Err(RegistryError::InvalidTransition {
                node: id.to_string(),
                from: node.status,
                to: NodeStatus::Running,
            });
        }
        node.status = NodeStatus::Running;
        node.expires_at_ms += by.as_millis();
        Ok(node.expires_at_ms)
    }

    fn stats(&self, ceiling: u32) -> HubStats {
        let mut stats = HubStats {
            ceiling,
            reservations: self.reservations.len(),
            reserved_slots: self.reserved_slots(),
            available_slots: self.available_slots(ceiling),
            ..HubStats::default()
        };
        for node in self.nodes.values() {
            match node.status {
                NodeStatus::Running => stats.running_nodes += 1,
                NodeStatus::Expired => stats.expired_nodes += 1,
                NodeStatus::Terminated => stats.terminated_nodes += 1,
            }
        }
        stats
    }
}

/// Concurrency-safe store of reservations and dynamic nodes.
///
/// Constructed explicitly and shared via `Arc` by the integration layer.
#[derive(Debug)]
pub struct RunRegistry {
    ceiling: u32,
    state: RwLock<RegistryState>,
}

impl RunRegistry {
    /// Create an empty registry with a total hub slot ceiling.
    pub fn new(ceiling: u32) -> Self {
        Self {
            ceiling,
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Configured slot ceiling.
    pub const fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Add a reservation unless its id is already present (single check-and-set).
    pub fn add_reservation(&self, reservation: Reservation) -> bool {
        self.state.write().insert_reservation(reservation).is_some()
    }

    /// Remove a reservation; false if it was not tracked.
    pub fn remove_reservation(&self, id: &str) -> bool {
        self.state.write().remove_reservation(id)
    }

    /// Remove a reservation only if it is still the admission `ticket` was issued for.
    pub(crate) fn remove_reservation_if(&self, id: &str, ticket: ReservationTicket) -> bool {
        self.state.write().remove_reservation_if(id, ticket)
    }

    /// Whether a reservation is tracked.
    pub fn has_reservation(&self, id: &str) -> bool {
        self.state.read().has_reservation(id)
    }

    /// Copy of a reservation.
    pub fn get_reservation(&self, id: &str) -> Option<Reservation> {
        self.state.read().reservation(id).cloned()
    }

    /// Ids of all live reservations.
    pub fn list_reservation_ids(&self) -> HashSet<ReservationId> {
        self.state.read().reservations.keys().cloned().collect()
    }

    /// Track a new node.
    pub fn add_node(&self, node: DynamicNode) -> Result<(), RegistryError> {
        self.state.write().insert_node(node)
    }

    /// Copy of a node.
    pub fn get_node(&self, id: &str) -> Option<DynamicNode> {
        self.state.read().node(id).cloned()
    }

    /// Current status of a node.
    pub fn node_status(&self, id: &str) -> Option<NodeStatus> {
        self.state.read().node_status(id)
    }

    /// Copy of every tracked node keyed by id.
    pub fn list_nodes(&self) -> HashMap<NodeId, DynamicNode> {
        self.state.read().nodes.clone()
    }

    /// Move a node to `status`, rejecting illegal lifecycle steps.
    pub fn update_node_status(&self, id: &str, status: NodeStatus) -> Result<(), RegistryError> {
        self.state.write().set_node_status(id, status)
    }

    /// Return an expired node to `Running` and push its expiry forward by `by`.
    pub fn extend_node(&self, id: &str, by: Duration) -> Result<u128, RegistryError> {
        self.state.write().extend_node(id, by)
    }

    /// `ceiling - Σ concurrency` over live reservations, never negative.
    pub fn available_hub_slots(&self) -> u32 {
        self.state.read().available_slots(self.ceiling)
    }

    /// Consistent copy of the whole registry.
    pub fn snapshot(&self) -> RegistryState {
        self.state.read().clone()
    }

    /// Aggregate counters.
    pub fn stats(&self) -> HubStats {
        self.state.read().stats(self.ceiling)
    }

    /// Hold the write lock for a multi-step decision.
    pub(crate) fn transaction(&self) -> RegistryTxn<'_> {
        RegistryTxn {
            ceiling: self.ceiling,
            state: self.state.write(),
        }
    }
}

/// Exclusive access to the registry for the duration of one decision.
///
/// Must never be held across a provisioning call.
pub(crate) struct RegistryTxn<'a> {
    ceiling: u32,
    state: RwLockWriteGuard<'a, RegistryState>,
}

impl RegistryTxn<'_> {
    pub(crate) fn state(&self) -> &RegistryState {
        &self.state
    }

    pub(crate) fn available_hub_slots(&self) -> u32 {
        self.state.available_slots(self.ceiling)
    }

    pub(crate) fn add_reservation(
        &mut self,
        reservation: Reservation,
    ) -> Option<ReservationTicket> {
        self.state.insert_reservation(reservation)
    }

    pub(crate) fn remove_reservation(&mut self, id: &str) -> bool {
        self.state.remove_reservation(id)
    }

    pub(crate) fn update_node_status(
        &mut self,
        id: &str,
        status: NodeStatus,
    ) -> Result<(), RegistryError> {
        self.state.set_node_status(id, status)
    }

    pub(crate) fn extend_node(&mut self, id: &str, by: Duration) -> Result<u128, RegistryError> {
        self.state.extend_node(id, by)
    }
}
