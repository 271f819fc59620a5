//! Inventory sources.

pub mod memory;

pub use memory::StaticInventory;
