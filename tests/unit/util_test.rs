//! Tests for utility helpers

use std::time::Duration;

use grid_scaler::util::{capability_matches, normalize_capability, Clock, ManualClock, SystemClock};

#[test]
fn test_capability_normalization() {
    assert_eq!(normalize_capability("Internet Explorer"), "internetexplorer");
    assert_eq!(normalize_capability(" ie "), "internetexplorer");
    assert!(capability_matches("WINDOWS 10", "windows"));
    assert!(!capability_matches("linux", "windows"));
}

#[test]
fn test_manual_clock_shared_between_clones() {
    let clock = ManualClock::new(1_000);
    let other = clock.clone();
    clock.advance(Duration::from_secs(2));
    assert_eq!(other.now_ms(), 3_000);
    other.set(10);
    assert_eq!(clock.now_ms(), 10);
}

#[test]
fn test_system_clock_is_after_epoch() {
    assert!(SystemClock.now_ms() > 1_600_000_000_000);
}
