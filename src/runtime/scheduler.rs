//! Timer-driven execution of the lifecycle loops.
//!
//! Each loop waits out its initial delay, then ticks at a fixed cadence until
//! the [`SchedulerHandle`] is shut down or dropped. A slow cycle delays the
//! next tick rather than bursting to catch up.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::config::ScalerConfig;
use crate::core::NodeLifecycleManager;
use crate::runtime::Spawn;

/// Initial delay and cadence of one periodic loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSchedule {
    /// Delay before the first cycle.
    pub initial_delay: Duration,
    /// Time between cycles.
    pub interval: Duration,
}

impl LoopSchedule {
    /// Schedule from whole seconds.
    pub const fn from_secs(initial_delay_secs: u64, interval_secs: u64) -> Self {
        Self {
            initial_delay: Duration::from_secs(initial_delay_secs),
            interval: Duration::from_secs(interval_secs),
        }
    }
}

/// Stops the loops started by [`LifecycleScheduler::start`].
///
/// Dropping the handle stops them as well.
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
}

impl SchedulerHandle {
    /// Signal every loop to stop after its current cycle.
    pub fn shutdown(self) {
        let _ = self.shutdown.send(true);
    }
}

/// Drives the reservation reaper, the node expirer and the hub check.
pub struct LifecycleScheduler {
    lifecycle: Arc<NodeLifecycleManager>,
    reaper: LoopSchedule,
    expirer: LoopSchedule,
    hub_check: LoopSchedule,
}

impl LifecycleScheduler {
    /// Scheduler with explicit cadences.
    pub const fn new(
        lifecycle: Arc<NodeLifecycleManager>,
        reaper: LoopSchedule,
        expirer: LoopSchedule,
        hub_check: LoopSchedule,
    ) -> Self {
        Self {
            lifecycle,
            reaper,
            expirer,
            hub_check,
        }
    }

    /// Scheduler with the cadences from `cfg`.
    pub const fn from_config(cfg: &ScalerConfig, lifecycle: Arc<NodeLifecycleManager>) -> Self {
        Self::new(
            lifecycle,
            LoopSchedule::from_secs(cfg.reaper_initial_delay_secs, cfg.reaper_interval_secs),
            LoopSchedule::from_secs(cfg.expirer_initial_delay_secs, cfg.expirer_interval_secs),
            LoopSchedule::from_secs(cfg.hub_check_initial_delay_secs, cfg.hub_check_interval_secs),
        )
    }

    /// Spawn the loops. The hub check only runs when the lifecycle manager
    /// knows the hub's own instance id.
    pub fn start<S: Spawn>(&self, spawner: &S) -> SchedulerHandle {
        let (shutdown, rx) = watch::channel(false);

        let lifecycle = Arc::clone(&self.lifecycle);
        spawner.spawn(run_loop("reservation_reaper", self.reaper, rx.clone(), move || {
            let lifecycle = Arc::clone(&lifecycle);
            async move {
                let reaped = lifecycle.reap_reservations();
                if !reaped.is_empty() {
                    tracing::info!(count = reaped.len(), "reaped stale reservations");
                }
            }
        }));

        let lifecycle = Arc::clone(&self.lifecycle);
        spawner.spawn(run_loop("node_expirer", self.expirer, rx.clone(), move || {
            let lifecycle = Arc::clone(&lifecycle);
            async move {
                let report = lifecycle.reconcile_nodes().await;
                if report.skipped > 0 {
                    tracing::warn!(skipped = report.skipped, "node cycle skipped transitions");
                }
            }
        }));

        if self.lifecycle.hub_instance_id().is_some() {
            let lifecycle = Arc::clone(&self.lifecycle);
            spawner.spawn(run_loop("hub_self_terminator", self.hub_check, rx, move || {
                let lifecycle = Arc::clone(&lifecycle);
                async move {
                    lifecycle.check_hub().await;
                }
            }));
        } else {
            tracing::debug!("no hub instance id; hub self-termination disabled");
        }

        tracing::info!(
            reaper_secs = self.reaper.interval.as_secs(),
            expirer_secs = self.expirer.interval.as_secs(),
            hub_check_secs = self.hub_check.interval.as_secs(),
            "lifecycle loops started"
        );
        SchedulerHandle { shutdown }
    }
}

async fn run_loop<F, Fut>(
    name: &'static str,
    schedule: LoopSchedule,
    mut shutdown: watch::Receiver<bool>,
    mut cycle: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    tokio::select! {
        () = tokio::time::sleep(schedule.initial_delay) => {}
        _ = shutdown.changed() => {
            tracing::debug!(loop_name = name, "stopped before first cycle");
            return;
        }
    }

    let mut interval = tokio::time::interval(schedule.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                tracing::debug!(loop_name = name, "cycle");
                cycle().await;
            }
            _ = shutdown.changed() => break,
        }
    }
    tracing::info!(loop_name = name, "loop stopped");
}
