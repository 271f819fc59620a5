//! Inventory source holding a snapshot set by the host integration.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::{InventorySnapshot, InventorySource, WorkerSnapshot};

/// Inventory replaced wholesale by whoever observes the hub.
///
/// Clones share the same snapshot.
#[derive(Debug, Clone, Default)]
pub struct StaticInventory {
    snapshot: Arc<RwLock<InventorySnapshot>>,
}

impl StaticInventory {
    /// Inventory starting with `workers`.
    pub fn new(workers: Vec<WorkerSnapshot>) -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(InventorySnapshot::new(workers))),
        }
    }

    /// Replace the registered workers.
    pub fn set_workers(&self, workers: Vec<WorkerSnapshot>) {
        *self.snapshot.write() = InventorySnapshot::new(workers);
    }

    /// Register one more worker.
    pub fn add_worker(&self, worker: WorkerSnapshot) {
        self.snapshot.write().workers.push(worker);
    }

    /// Drop the worker with `worker_id`. Returns whether it was present.
    pub fn remove_worker(&self, worker_id: &str) -> bool {
        let mut snapshot = self.snapshot.write();
        let before = snapshot.workers.len();
        snapshot.workers.retain(|w| w.id != worker_id);
        snapshot.workers.len() != before
    }

    /// Unregister every worker.
    pub fn clear(&self) {
        self.snapshot.write().workers.clear();
    }
}

impl InventorySource for StaticInventory {
    fn snapshot(&self) -> InventorySnapshot {
        self.snapshot.read().clone()
    }
}
