//! Free-slot estimation over the live inventory.
//!
//! A worker contributes `min(idle matching slots, max_sessions - busy)`. Slots
//! bound to a dynamic node that is no longer `Running` end the scan of their
//! worker, and a worker whose busy count reaches its session limit contributes
//! nothing. Reservations admitted within the grace window that have not started
//! a session yet can optionally be charged against the total, since the client
//! has been promised capacity the inventory does not show as taken.

use std::collections::HashSet;
use std::time::Duration;

use crate::core::inventory::{InventorySnapshot, SlotSnapshot, WorkerSnapshot};
use crate::core::registry::{NodeStatus, RegistryState};
use crate::util::serde::capability_matches;

/// What a free-slot estimate is computed for.
#[derive(Debug, Clone, Copy)]
pub struct FreeSlotQuery<'a> {
    /// Requested browser.
    pub browser: &'a str,
    /// Requested operating system; any platform matches when `None`.
    pub os: Option<&'a str>,
    /// Node whose slots are left out of the estimate.
    pub exclude_node: Option<&'a str>,
}

impl<'a> FreeSlotQuery<'a> {
    /// Query for a browser and optional OS.
    pub const fn new(browser: &'a str, os: Option<&'a str>) -> Self {
        Self {
            browser,
            os,
            exclude_node: None,
        }
    }

    /// Leave the slots of `node_id` out of the estimate.
    #[must_use]
    pub const fn excluding_node(mut self, node_id: &'a str) -> Self {
        self.exclude_node = Some(node_id);
        self
    }

    fn slot_matches(&self, slot: &SlotSnapshot) -> bool {
        let browser_ok = slot
            .browser
            .as_deref()
            .is_some_and(|b| capability_matches(b, self.browser));
        let os_ok = self.os.is_none_or(|os| {
            slot.platform
                .as_deref()
                .is_some_and(|p| capability_matches(p, os))
        });
        browser_ok && os_ok
    }
}

/// Computes currently free, browser/OS-matching slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityEstimator {
    subtract_unstarted: bool,
    unstarted_grace: Duration,
}

impl Default for CapacityEstimator {
    fn default() -> Self {
        Self::new(true, Duration::from_secs(120))
    }
}

impl CapacityEstimator {
    /// Create an estimator.
    ///
    /// When `subtract_unstarted` is set, every reservation no older than
    /// `unstarted_grace` without an inventory session is charged in full.
    pub const fn new(subtract_unstarted: bool, unstarted_grace: Duration) -> Self {
        Self {
            subtract_unstarted,
            unstarted_grace,
        }
    }

    /// Whether young unstarted reservations are charged against the estimate.
    pub const fn subtracts_unstarted(&self) -> bool {
        self.subtract_unstarted
    }

    /// Free matching slots, never negative.
    pub fn compute_free_slots(
        &self,
        registry: &RegistryState,
        inventory: &InventorySnapshot,
        query: &FreeSlotQuery<'_>,
        now_ms: u128,
    ) -> u32 {
        let mut total: i64 = inventory
            .workers
            .iter()
            .map(|worker| i64::from(worker_free_slots(registry, worker, query)))
            .sum();

        if self.subtract_unstarted {
            let started: HashSet<&str> = inventory
                .workers
                .iter()
                .flat_map(|w| w.slots.iter())
                .filter_map(SlotSnapshot::session_reservation)
                .collect();
            for reservation in registry.reservations() {
                if reservation.is_older_than(self.unstarted_grace, now_ms)
                    || started.contains(reservation.id.as_str())
                {
                    continue;
                }
                tracing::debug!(
                    reservation = %reservation.id,
                    concurrency = reservation.concurrency,
                    "charging unstarted reservation against free slots"
                );
                total -= i64::from(reservation.concurrency);
            }
        }

        u32::try_from(total.max(0)).unwrap_or(u32::MAX)
    }
}

fn worker_free_slots(
    registry: &RegistryState,
    worker: &WorkerSnapshot,
    query: &FreeSlotQuery<'_>,
) -> u32 {
    let mut capable: u32 = 0;
    let mut busy: u32 = 0;

    for slot in &worker.slots {
        if let Some(node_id) = slot.node_id.as_deref() {
            if query.exclude_node == Some(node_id) {
                continue;
            }
            // Mid-teardown; nothing further on this worker is offered.
            if registry
                .node_status(node_id)
                .is_some_and(|status| status != NodeStatus::Running)
            {
                break;
            }
        }
        if slot.is_busy() {
            busy += 1;
        } else if query.slot_matches(slot) {
            capable += 1;
        }
        if busy >= worker.max_sessions {
            return 0;
        }
    }

    capable.min(worker.max_sessions.saturating_sub(busy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::{DynamicNode, ExpiryRounding, Reservation, RunRegistry};

    const NOW: u128 = 10_000_000;

    fn estimator(subtract: bool) -> CapacityEstimator {
        CapacityEstimator::new(subtract, Duration::from_secs(120))
    }

    fn free(
        registry: &RunRegistry,
        inventory: &InventorySnapshot,
        browser: &str,
        os: Option<&str>,
    ) -> u32 {
        estimator(true).compute_free_slots(
            &registry.snapshot(),
            inventory,
            &FreeSlotQuery::new(browser, os),
            NOW,
        )
    }

    #[test]
    fn test_idle_matching_slots_counted() {
        let registry = RunRegistry::new(10);
        let inv = InventorySnapshot::new(vec![WorkerSnapshot::new(
            "w1",
            5,
            vec![
                SlotSnapshot::idle("chrome", "linux"),
                SlotSnapshot::idle("chrome", "linux"),
                SlotSnapshot::idle("firefox", "linux"),
            ],
        )]);
        assert_eq!(free(&registry, &inv, "chrome", None), 2);
        assert_eq!(free(&registry, &inv, "Fire Fox", None), 1);
        assert_eq!(free(&registry, &inv, "chrome", Some("windows")), 0);
        assert_eq!(free(&registry, &inv, "chrome", Some("LINUX")), 2);
    }

    #[test]
    fn test_ie_alias_matches_internet_explorer() {
        let registry = RunRegistry::new(10);
        let inv = InventorySnapshot::new(vec![WorkerSnapshot::new(
            "w1",
            2,
            vec![SlotSnapshot::idle("internet explorer", "windows")],
        )]);
        assert_eq!(free(&registry, &inv, "ie", None), 1);
        assert_eq!(free(&registry, &inv, "internetexplorer", Some("windows")), 1);
    }

    #[test]
    fn test_remaining_session_capacity_caps_contribution() {
        let registry = RunRegistry::new(10);
        let inv = InventorySnapshot::new(vec![WorkerSnapshot::new(
            "w1",
            3,
            vec![
                SlotSnapshot::idle("chrome", "linux").busy(),
                SlotSnapshot::idle("chrome", "linux").busy(),
                SlotSnapshot::idle("chrome", "linux"),
                SlotSnapshot::idle("chrome", "linux"),
                SlotSnapshot::idle("chrome", "linux"),
            ],
        )]);
        assert_eq!(free(&registry, &inv, "chrome", None), 1);
    }

    #[test]
    fn test_saturated_worker_contributes_nothing() {
        let registry = RunRegistry::new(10);
        let inv = InventorySnapshot::new(vec![WorkerSnapshot::new(
            "w1",
            1,
            vec![
                SlotSnapshot::idle("chrome", "linux"),
                SlotSnapshot::idle("chrome", "linux").busy(),
                SlotSnapshot::idle("chrome", "linux"),
            ],
        )]);
        assert_eq!(free(&registry, &inv, "chrome", None), 0);
    }

    #[test]
    fn test_node_mid_teardown_not_counted() {
        let registry = RunRegistry::new(10);
        registry
            .add_node(DynamicNode::new(
                "i-1",
                "run",
                "chrome",
                None,
                0,
                2,
                Duration::from_secs(3300),
                ExpiryRounding::Exact,
            ))
            .unwrap();
        let inv = InventorySnapshot::new(vec![WorkerSnapshot::new(
            "w1",
            2,
            vec![
                SlotSnapshot::idle("chrome", "linux").on_node("i-1"),
                SlotSnapshot::idle("chrome", "linux").on_node("i-1"),
            ],
        )]);
        assert_eq!(free(&registry, &inv, "chrome", None), 2);

        registry.update_node_status("i-1", NodeStatus::Expired).unwrap();
        assert_eq!(free(&registry, &inv, "chrome", None), 0);
    }

    #[test]
    fn test_excluded_node_slots_skipped() {
        let registry = RunRegistry::new(10);
        let inv = InventorySnapshot::new(vec![
            WorkerSnapshot::new(
                "w1",
                2,
                vec![SlotSnapshot::idle("chrome", "linux").on_node("i-1"); 2],
            ),
            WorkerSnapshot::new("w2", 2, vec![SlotSnapshot::idle("chrome", "linux")]),
        ]);
        let query = FreeSlotQuery::new("chrome", None).excluding_node("i-1");
        assert_eq!(
            estimator(false).compute_free_slots(&registry.snapshot(), &inv, &query, NOW),
            1
        );
    }

    #[test]
    fn test_unstarted_reservation_policy() {
        let registry = RunRegistry::new(10);
        registry.add_reservation(Reservation::new("young", 2, "chrome", NOW - 60_000));
        registry.add_reservation(Reservation::new("old", 2, "chrome", NOW - 180_000));
        registry.add_reservation(Reservation::new("started", 2, "chrome", NOW - 10_000));
        let inv = InventorySnapshot::new(vec![WorkerSnapshot::new(
            "w1",
            6,
            vec![
                SlotSnapshot::idle("chrome", "linux").busy_for("started"),
                SlotSnapshot::idle("chrome", "linux"),
                SlotSnapshot::idle("chrome", "linux"),
                SlotSnapshot::idle("chrome", "linux"),
            ],
        )]);
        let query = FreeSlotQuery::new("chrome", None);
        let snapshot = registry.snapshot();

        assert_eq!(estimator(false).compute_free_slots(&snapshot, &inv, &query, NOW), 3);
        assert_eq!(estimator(true).compute_free_slots(&snapshot, &inv, &query, NOW), 1);
    }

    #[test]
    fn test_never_negative() {
        let registry = RunRegistry::new(100);
        registry.add_reservation(Reservation::new("young", 50, "chrome", NOW));
        let inv = InventorySnapshot::new(vec![WorkerSnapshot::new(
            "w1",
            2,
            vec![SlotSnapshot::idle("chrome", "linux")],
        )]);
        assert_eq!(free(&registry, &inv, "chrome", None), 0);
        assert_eq!(free(&registry, &InventorySnapshot::default(), "chrome", None), 0);
    }
}
