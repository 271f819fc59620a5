//! Infrastructure adapters for provisioning and hub inventory.

pub mod inventory;
pub mod provisioning;

pub use inventory::StaticInventory;
pub use provisioning::InMemoryProvisioner;
