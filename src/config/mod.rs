//! Configuration models for the scaler.

pub mod scaler;

pub use scaler::{ScalerConfig, ENV_PREFIX};
