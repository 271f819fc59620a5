//! Builders to construct scaler components from configuration.

pub mod scaler_builder;

pub use scaler_builder::{build_scaler, DefaultGate, Scaler};
