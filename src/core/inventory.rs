//! Read-only view of the host hub's registered workers.

use serde::{Deserialize, Serialize};

use crate::util::serde::{NodeId, ReservationId};

/// A session occupying a slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Reservation id the client tagged the session with, if any.
    pub reservation_id: Option<ReservationId>,
}

/// One unit of concurrent execution capacity on a worker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSnapshot {
    /// Declared browser capability.
    pub browser: Option<String>,
    /// Declared platform capability.
    pub platform: Option<String>,
    /// Dynamic node the slot belongs to, if the worker was provisioned by us.
    pub node_id: Option<NodeId>,
    /// Active session, `None` when idle.
    pub session: Option<SessionInfo>,
}

impl SlotSnapshot {
    /// Idle slot declaring a browser and platform.
    pub fn idle(browser: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            browser: Some(browser.into()),
            platform: Some(platform.into()),
            node_id: None,
            session: None,
        }
    }

    /// Bind the slot to a dynamic node.
    #[must_use]
    pub fn on_node(mut self, node_id: impl Into<NodeId>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    /// Occupy the slot with a session tagged for `reservation_id`.
    #[must_use]
    pub fn busy_for(mut self, reservation_id: impl Into<ReservationId>) -> Self {
        self.session = Some(SessionInfo {
            reservation_id: Some(reservation_id.into()),
        });
        self
    }

    /// Occupy the slot with an untagged session.
    #[must_use]
    pub fn busy(mut self) -> Self {
        self.session = Some(SessionInfo::default());
        self
    }

    /// Whether a session occupies the slot.
    pub const fn is_busy(&self) -> bool {
        self.session.is_some()
    }

    /// Reservation id of the occupying session.
    pub fn session_reservation(&self) -> Option<&str> {
        self.session
            .as_ref()
            .and_then(|s| s.reservation_id.as_deref())
    }
}

/// A registered worker (proxy) and its slots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    /// Host-assigned worker id.
    pub id: String,
    /// Maximum concurrent sessions the worker accepts.
    pub max_sessions: u32,
    /// Slots in declaration order.
    pub slots: Vec<SlotSnapshot>,
}

impl WorkerSnapshot {
    /// Worker with the given session limit and slots.
    pub fn new(id: impl Into<String>, max_sessions: u32, slots: Vec<SlotSnapshot>) -> Self {
        Self {
            id: id.into(),
            max_sessions,
            slots,
        }
    }

    /// Whether any slot is bound to `node_id`.
    pub fn hosts_node(&self, node_id: &str) -> bool {
        self.slots
            .iter()
            .any(|s| s.node_id.as_deref() == Some(node_id))
    }
}

/// Every worker registered with the hub at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySnapshot {
    /// Registered workers.
    pub workers: Vec<WorkerSnapshot>,
}

impl InventorySnapshot {
    /// Snapshot over the given workers.
    pub const fn new(workers: Vec<WorkerSnapshot>) -> Self {
        Self { workers }
    }

    /// Whether no worker is registered.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Whether any session is tagged with `reservation_id`.
    pub fn has_session_for(&self, reservation_id: &str) -> bool {
        self.workers
            .iter()
            .flat_map(|w| w.slots.iter())
            .any(|s| s.session_reservation() == Some(reservation_id))
    }

    /// Active sessions on slots bound to `node_id`.
    pub fn active_sessions_on_node(&self, node_id: &str) -> usize {
        self.workers
            .iter()
            .flat_map(|w| w.slots.iter())
            .filter(|s| s.node_id.as_deref() == Some(node_id) && s.is_busy())
            .count()
    }

    /// Whether any worker carries slots bound to `node_id`.
    pub fn contains_node(&self, node_id: &str) -> bool {
        self.workers.iter().any(|w| w.hosts_node(node_id))
    }
}

/// Source of inventory snapshots, implemented by the host hub.
pub trait InventorySource: Send + Sync {
    /// Current snapshot of registered workers.
    fn snapshot(&self) -> InventorySnapshot;
}
