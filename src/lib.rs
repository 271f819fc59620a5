//! # Grid Scaler
//!
//! Admission control and lifecycle reconciliation for a hub of
//! cloud-provisioned browser test workers.
//!
//! Clients reserve N concurrent slots for a named run. The scaler decides,
//! atomically against a hub-wide slot ceiling, whether existing idle capacity
//! covers the request or whether new workers must be launched, and then keeps
//! the worker fleet in line with demand as runs come and go.
//!
//! ## Key Features
//!
//! - **Run Registry**: Reservations and dynamically launched nodes behind one lock
//! - **Capacity Estimation**: Free matching slots derived from a live inventory snapshot
//! - **Admission Control**: Fulfill, scale out, or reject with a typed reason
//! - **Node Lifecycle**: Reaping of abandoned reservations, billing-aligned node
//!   expiry and termination, and hub self-termination
//! - **Capability Gate**: Keeps workers that are being torn down out of scheduling
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use grid_scaler::builders::build_scaler;
//! use grid_scaler::config::ScalerConfig;
//! use grid_scaler::core::RunRequest;
//! use grid_scaler::infra::{InMemoryProvisioner, StaticInventory};
//! use grid_scaler::util::SystemClock;
//!
//! let cfg = ScalerConfig::from_env()?;
//! let scaler = build_scaler(
//!     &cfg,
//!     Arc::new(StaticInventory::default()),
//!     Arc::new(InMemoryProvisioner::default()),
//!     Arc::new(SystemClock),
//!     None,
//! )?;
//!
//! let outcome = scaler
//!     .admission
//!     .request_run(&RunRequest::new("run-42", "chrome", Some("linux"), 4))
//!     .await?;
//! ```
//!
//! For complete scenarios, see:
//! - `tests/admission_test.rs` - Admission and scale-out
//! - `tests/lifecycle_test.rs` - Reaping, expiry, and termination

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Registry, capacity estimation, admission control, and node lifecycle.
pub mod core;
/// Configuration models for the scaler.
pub mod config;
/// Builders to construct scaler components from configuration.
pub mod builders;
/// Infrastructure adapters for provisioning and hub inventory.
pub mod infra;
/// Runtime adapters, periodic scheduling, and the request/response surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
