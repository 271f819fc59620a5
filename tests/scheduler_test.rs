//! Timer-driven lifecycle loops under a paused tokio clock.

use std::sync::Arc;
use std::time::Duration;

use grid_scaler::builders::{build_scaler, Scaler};
use grid_scaler::config::ScalerConfig;
use grid_scaler::core::Reservation;
use grid_scaler::infra::{InMemoryProvisioner, StaticInventory};
use grid_scaler::runtime::{LifecycleScheduler, TokioSpawner};
use grid_scaler::util::ManualClock;

const NOW: u128 = 1_700_000_000_000;

fn scaler(cfg: &ScalerConfig, provisioner: &InMemoryProvisioner) -> Scaler {
    build_scaler(
        cfg,
        Arc::new(StaticInventory::default()),
        Arc::new(provisioner.clone()),
        // Far enough ahead that reservations created at 0 are stale.
        Arc::new(ManualClock::new(NOW)),
        None,
    )
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_reaper_waits_for_initial_delay() {
    let cfg = ScalerConfig::default();
    let provisioner = InMemoryProvisioner::new();
    let scaler = scaler(&cfg, &provisioner);
    scaler.registry.add_reservation(Reservation::new("stale", 1, "chrome", 0));

    let handle = LifecycleScheduler::from_config(&cfg, Arc::clone(&scaler.lifecycle))
        .start(&TokioSpawner::current().unwrap());

    tokio::time::sleep(Duration::from_secs(59)).await;
    assert!(scaler.registry.has_reservation("stale"));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!scaler.registry.has_reservation("stale"));

    // Next cycle a minute later picks up new stale entries.
    scaler.registry.add_reservation(Reservation::new("later", 1, "chrome", 0));
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert!(!scaler.registry.has_reservation("later"));

    handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_hub_check_runs_on_its_own_cadence() {
    let cfg = ScalerConfig {
        hub_instance_id: Some("i-hub".into()),
        ..ScalerConfig::default()
    };
    let provisioner = InMemoryProvisioner::new();
    let scaler = scaler(&cfg, &provisioner);

    let handle = LifecycleScheduler::from_config(&cfg, Arc::clone(&scaler.lifecycle))
        .start(&TokioSpawner::current().unwrap());

    tokio::time::sleep(Duration::from_secs(299)).await;
    assert_eq!(provisioner.terminate_count("i-hub"), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(provisioner.terminate_count("i-hub"), 1);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(provisioner.terminate_count("i-hub"), 2);

    handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_loops() {
    let cfg = ScalerConfig {
        hub_instance_id: Some("i-hub".into()),
        ..ScalerConfig::default()
    };
    let provisioner = InMemoryProvisioner::new();
    let scaler = scaler(&cfg, &provisioner);
    scaler.registry.add_reservation(Reservation::new("stale", 1, "chrome", 0));

    let handle = LifecycleScheduler::from_config(&cfg, Arc::clone(&scaler.lifecycle))
        .start(&TokioSpawner::current().unwrap());
    tokio::time::sleep(Duration::from_secs(30)).await;
    handle.shutdown();

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert!(scaler.registry.has_reservation("stale"));
    assert!(provisioner.terminated().is_empty());
}
