//! Interface to the cloud provider that launches and terminates workers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::ProvisioningError;
use crate::util::serde::{NodeId, ReservationId};

/// Parameters for launching workers on behalf of a reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchRequest {
    /// Reservation the workers are tagged with.
    pub reservation_id: ReservationId,
    /// Requested operating system; the gateway picks its default when `None`.
    pub os: Option<String>,
    /// Browser the workers must serve.
    pub browser: String,
    /// Number of instances to launch.
    pub count: u32,
    /// Slots each instance registers with.
    pub capacity_per_node: u32,
    /// Address workers register back to.
    pub hub_address: Option<String>,
}

/// Launches and terminates cloud workers.
///
/// Calls are made without holding the registry lock. `terminate` is best
/// effort; callers log failures and do not retry.
#[async_trait]
pub trait ProvisioningGateway: Send + Sync {
    /// Launch `request.count` instances and return their ids.
    async fn launch_nodes(&self, request: LaunchRequest) -> Result<Vec<NodeId>, ProvisioningError>;

    /// Request termination of an instance.
    async fn terminate(&self, node_id: &str) -> Result<(), ProvisioningError>;
}

/// Instances needed to cover `deficit` slots at `capacity_per_node` each.
pub const fn launch_count(deficit: u32, capacity_per_node: u32) -> u32 {
    if capacity_per_node == 0 {
        return 0;
    }
    deficit.div_ceil(capacity_per_node)
}
