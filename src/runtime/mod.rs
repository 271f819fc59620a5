//! Runtime adapters, periodic scheduling, and the request/response surface.

pub mod api;
#[cfg(feature = "tokio-runtime")]
pub mod scheduler;
pub mod spawn;
#[cfg(feature = "tokio-runtime")]
pub mod tokio_spawner;

pub use api::{
    claim_free_slots, create_run, delete_run, free_slots, health, CreateRunRequest,
    DeleteRunResponse, FreeSlotsResponse, Health, RunResponse, RunResponseBody,
};
#[cfg(feature = "tokio-runtime")]
pub use scheduler::{LifecycleScheduler, LoopSchedule, SchedulerHandle};
pub use spawn::Spawn;
#[cfg(feature = "tokio-runtime")]
pub use tokio_spawner::TokioSpawner;
