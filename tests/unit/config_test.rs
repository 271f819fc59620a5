//! Tests for configuration validation

use std::collections::HashMap;

use grid_scaler::config::ScalerConfig;
use grid_scaler::core::{ExpiryHeadroom, ExpiryRounding};

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key: &str| vars.get(key).cloned()
}

#[test]
fn test_defaults_are_valid() {
    let cfg = ScalerConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.hub_slot_ceiling, 150);
    assert_eq!(cfg.node_lifetime_secs, 55 * 60);
    assert_eq!(cfg.billing_grace_secs, 6 * 60);
    assert_eq!(cfg.reservation_staleness_secs, 180);
    assert_eq!(cfg.expirer_interval_secs, 15);
    assert_eq!(cfg.hub_check_initial_delay_secs, 300);
    assert_eq!(cfg.scalable_browsers.get("internetexplorer"), Some(&6));
    assert!(cfg.subtract_unstarted_reservations);
    assert_eq!(cfg.expiry_headroom, ExpiryHeadroom::ExcludeOwnSlots);
}

#[test]
fn test_invalid_ceiling() {
    let cfg = ScalerConfig {
        hub_slot_ceiling: 0,
        ..ScalerConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_invalid_interval() {
    let cfg = ScalerConfig {
        expirer_interval_secs: 0,
        ..ScalerConfig::default()
    };
    let err = cfg.validate().unwrap_err();
    assert!(err.contains("expirer_interval_secs"));
}

#[test]
fn test_lifetime_must_fit_in_billing_increment() {
    let cfg = ScalerConfig {
        node_lifetime_secs: 3600,
        ..ScalerConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_browser_capacity_and_presence() {
    let mut cfg = ScalerConfig::default();
    cfg.scalable_browsers.insert("safari".into(), 0);
    assert!(cfg.validate().is_err());

    cfg.scalable_browsers.clear();
    assert!(cfg.validate().is_err());
}

#[test]
fn test_from_json_str_fills_defaults() {
    let cfg = ScalerConfig::from_json_str(
        r#"{"hub_slot_ceiling": 10, "expiry_rounding": "whole_minute", "reservation_staleness_secs": 90}"#,
    )
    .unwrap();
    assert_eq!(cfg.hub_slot_ceiling, 10);
    assert_eq!(cfg.expiry_rounding, ExpiryRounding::WholeMinute);
    assert_eq!(cfg.reservation_staleness_secs, 90);
    assert_eq!(cfg.billing_increment_secs, 3600);
}

#[test]
fn test_from_json_str_rejects_invalid() {
    assert!(ScalerConfig::from_json_str("{not json").is_err());
    assert!(ScalerConfig::from_json_str(r#"{"hub_slot_ceiling": 0}"#).is_err());
}

#[test]
fn test_env_overrides() {
    let cfg = ScalerConfig::default()
        .with_overrides(env(&[
            ("GRID_SCALER_HUB_SLOT_CEILING", "40"),
            ("GRID_SCALER_HUB_INSTANCE_ID", "i-hub"),
            ("GRID_SCALER_EXPIRY_HEADROOM", "INCLUDE_OWN_SLOTS"),
            ("GRID_SCALER_SUBTRACT_UNSTARTED_RESERVATIONS", "false"),
            ("GRID_SCALER_SCALABLE_BROWSERS", "chrome=4,firefox"),
            ("GRID_SCALER_HUB_ADDRESS", "  "),
        ]))
        .unwrap();
    assert_eq!(cfg.hub_slot_ceiling, 40);
    assert_eq!(cfg.hub_instance_id.as_deref(), Some("i-hub"));
    assert_eq!(cfg.hub_address, None);
    assert_eq!(cfg.expiry_headroom, ExpiryHeadroom::IncludeOwnSlots);
    assert!(!cfg.subtract_unstarted_reservations);
    assert_eq!(cfg.scalable_browsers.len(), 2);
    assert_eq!(cfg.scalable_browsers.get("chrome"), Some(&4));
    assert_eq!(cfg.scalable_browsers.get("firefox"), Some(&6));
}

#[test]
fn test_env_overrides_initial_delays() {
    let cfg = ScalerConfig::default()
        .with_overrides(env(&[
            ("GRID_SCALER_REAPER_INITIAL_DELAY_SECS", "5"),
            ("GRID_SCALER_EXPIRER_INITIAL_DELAY_SECS", "0"),
            ("GRID_SCALER_HUB_CHECK_INITIAL_DELAY_SECS", "30"),
        ]))
        .unwrap();
    assert_eq!(cfg.reaper_initial_delay_secs, 5);
    assert_eq!(cfg.expirer_initial_delay_secs, 0);
    assert_eq!(cfg.hub_check_initial_delay_secs, 30);

    assert!(ScalerConfig::default()
        .with_overrides(env(&[("GRID_SCALER_EXPIRER_INITIAL_DELAY_SECS", "-1")]))
        .is_err());
}

#[test]
fn test_env_overrides_reject_bad_values() {
    assert!(ScalerConfig::default()
        .with_overrides(env(&[("GRID_SCALER_HUB_SLOT_CEILING", "lots")]))
        .is_err());
    assert!(ScalerConfig::default()
        .with_overrides(env(&[("GRID_SCALER_EXPIRY_ROUNDING", "hourly")]))
        .is_err());
    assert!(ScalerConfig::default()
        .with_overrides(env(&[("GRID_SCALER_HUB_SLOT_CEILING", "0")]))
        .is_err());
}
