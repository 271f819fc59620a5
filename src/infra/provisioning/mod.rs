//! Provisioning backends.

pub mod memory;

pub use memory::InMemoryProvisioner;
