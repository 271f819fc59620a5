//! In-memory provisioning gateway that records calls instead of reaching a cloud.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::{LaunchRequest, ProvisioningError, ProvisioningGateway};
use crate::util::serde::NodeId;

#[derive(Debug, Default)]
struct Calls {
    launches: Vec<LaunchRequest>,
    launched: Vec<NodeId>,
    terminated: Vec<NodeId>,
}

/// Gateway that fabricates instance ids and keeps a log of every call.
///
/// Clones share the same log. Failures can be switched on to exercise
/// rollback and error paths.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvisioner {
    calls: Arc<Mutex<Calls>>,
    fail_launch: Arc<AtomicBool>,
    fail_terminate: Arc<AtomicBool>,
}

impl InMemoryProvisioner {
    /// Create a new provisioner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent launches fail (or succeed again).
    pub fn set_fail_launch(&self, fail: bool) {
        self.fail_launch.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent terminate calls fail (or succeed again).
    pub fn set_fail_terminate(&self, fail: bool) {
        self.fail_terminate.store(fail, Ordering::SeqCst);
    }

    /// Launch requests received, including failed ones.
    pub fn launches(&self) -> Vec<LaunchRequest> {
        self.calls.lock().launches.clone()
    }

    /// Ids handed out by successful launches.
    pub fn launched(&self) -> Vec<NodeId> {
        self.calls.lock().launched.clone()
    }

    /// Ids terminate was called for, in call order, including failed calls.
    pub fn terminated(&self) -> Vec<NodeId> {
        self.calls.lock().terminated.clone()
    }

    /// How many times terminate was called for `node_id`.
    pub fn terminate_count(&self, node_id: &str) -> usize {
        self.calls
            .lock()
            .terminated
            .iter()
            .filter(|id| id.as_str() == node_id)
            .count()
    }
}

#[async_trait]
impl ProvisioningGateway for InMemoryProvisioner {
    async fn launch_nodes(&self, request: LaunchRequest) -> Result<Vec<NodeId>, ProvisioningError> {
        let mut calls = self.calls.lock();
        let count = request.count;
        calls.launches.push(request);
        if self.fail_launch.load(Ordering::SeqCst) {
            return Err(ProvisioningError::Launch("launch disabled".into()));
        }
        let ids: Vec<NodeId> = (0..count)
            .map(|_| format!("i-{}", &uuid::Uuid::new_v4().simple().to_string()[..17]))
            .collect();
        calls.launched.extend(ids.iter().cloned());
        Ok(ids)
    }

    async fn terminate(&self, node_id: &str) -> Result<(), ProvisioningError> {
        self.calls.lock().terminated.push(node_id.to_string());
        if self.fail_terminate.load(Ordering::SeqCst) {
            return Err(ProvisioningError::Terminate(format!("terminate disabled for {node_id}")));
        }
        Ok(())
    }
}
