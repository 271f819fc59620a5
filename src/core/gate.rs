//! Capability matching that keeps workers mid-teardown out of scheduling.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::core::registry::{NodeStatus, RunRegistry};
use crate::util::serde::{
    BROWSER_NAME_KEY, INSTANCE_ID_KEY, PLATFORM_KEY, RESERVATION_ID_KEY, VERSION_KEY,
};

/// Capability map as exchanged with the host scheduler.
pub type Capabilities = Map<String, Value>;

const APPLICATION_NAME_KEY: &str = "applicationName";
const WILDCARDS: [&str; 3] = ["", "any", "*"];

/// Decides whether an offered slot satisfies a requested capability set.
pub trait CapabilityMatcher: Send + Sync {
    /// True when `offered` can serve `requested`.
    fn matches(&self, offered: &Capabilities, requested: &Capabilities) -> bool;
}

impl<F> CapabilityMatcher for F
where
    F: Fn(&Capabilities, &Capabilities) -> bool + Send + Sync,
{
    fn matches(&self, offered: &Capabilities, requested: &Capabilities) -> bool {
        self(offered, requested)
    }
}

fn is_wildcard(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => WILDCARDS.contains(&s.trim().to_lowercase().as_str()),
        _ => false,
    }
}

/// The host's default matching: platform, browser name, version and
/// application name must agree when requested; wildcards match anything.
pub fn default_capability_match(offered: &Capabilities, requested: &Capabilities) -> bool {
    for key in [PLATFORM_KEY, BROWSER_NAME_KEY, VERSION_KEY, APPLICATION_NAME_KEY] {
        let Some(wanted) = requested.get(key) else {
            continue;
        };
        if is_wildcard(wanted) {
            continue;
        }
        let Some(have) = offered.get(key) else {
            return false;
        };
        let agrees = if key == PLATFORM_KEY {
            is_wildcard(have)
                || matches!(
                    (have, wanted),
                    (Value::String(h), Value::String(w)) if h.eq_ignore_ascii_case(w)
                )
        } else {
            have == wanted
        };
        if !agrees {
            return false;
        }
    }
    true
}

/// Wraps a base matcher and rejects dynamic nodes that are being torn down.
///
/// A node is withheld when its owning reservation is gone and the registry
/// shows it `Expired` or `Terminated`. Everything else goes to the base matcher.
pub struct CapabilityGate<M> {
    registry: Arc<RunRegistry>,
    base: M,
}

impl<M: CapabilityMatcher> CapabilityGate<M> {
    /// Gate in front of `base`.
    pub const fn new(registry: Arc<RunRegistry>, base: M) -> Self {
        Self { registry, base }
    }

    /// True when `offered` may be scheduled for `requested`.
    pub fn matches(&self, offered: &Capabilities, requested: &Capabilities) -> bool {
        !self.withheld(offered) && self.base.matches(offered, requested)
    }

    fn withheld(&self, offered: &Capabilities) -> bool {
        let (Some(instance_id), Some(reservation_id)) = (
            offered.get(INSTANCE_ID_KEY).and_then(Value::as_str),
            offered.get(RESERVATION_ID_KEY).and_then(Value::as_str),
        ) else {
            return false;
        };
        // The run that launched the node may keep using it.
        if self.registry.has_reservation(reservation_id) {
            return false;
        }
        let tearing_down = matches!(
            self.registry.node_status(instance_id),
            Some(NodeStatus::Expired | NodeStatus::Terminated)
        );
        if tearing_down {
            tracing::info!(node = %instance_id, "node expired or terminated; not matching");
        }
        tearing_down
    }
}

impl CapabilityGate<fn(&Capabilities, &Capabilities) -> bool> {
    /// Gate in front of [`default_capability_match`].
    pub fn with_default_matcher(registry: Arc<RunRegistry>) -> Self {
        Self::new(registry, default_capability_match)
    }
}
