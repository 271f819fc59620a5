//! Runtime-agnostic task spawning.

use std::future::Future;

/// Spawner abstraction so the periodic loops are runtime-agnostic.
pub trait Spawn {
    /// Spawn an async task that returns a future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}
