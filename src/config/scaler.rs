//! Scaler configuration structures.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::{AppResult, ExpiryHeadroom, ExpiryRounding};

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "GRID_SCALER_";

/// Slots per launched node unless configured otherwise.
const DEFAULT_NODE_CAPACITY: u32 = 6;

/// Root scaler configuration. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalerConfig {
    /// Total slots the hub may ever have reserved at once.
    pub hub_slot_ceiling: u32,
    /// Cloud instance id of the hub itself; enables hub self-termination.
    pub hub_instance_id: Option<String>,
    /// Address launched workers register with.
    pub hub_address: Option<String>,
    /// Lifetime of a fresh node before it becomes an expiry candidate.
    pub node_lifetime_secs: u64,
    /// How the initial node expiry is computed.
    pub expiry_rounding: ExpiryRounding,
    /// Provider billing increment; expired nodes kept alive are extended by this much.
    pub billing_increment_secs: u64,
    /// Time past expiry after which an expired node is extended rather than terminated.
    pub billing_grace_secs: u64,
    /// Age after which a reservation with no session is reaped.
    pub reservation_staleness_secs: u64,
    /// Window during which an admitted reservation without sessions still holds capacity.
    pub unstarted_grace_secs: u64,
    /// Whether young, unstarted reservations are subtracted from free-slot estimates.
    pub subtract_unstarted_reservations: bool,
    /// Headroom rule applied before expiring a running node.
    pub expiry_headroom: ExpiryHeadroom,
    /// Reservation reaper cadence.
    pub reaper_interval_secs: u64,
    /// Node expirer cadence.
    pub expirer_interval_secs: u64,
    /// Hub self-termination check cadence.
    pub hub_check_interval_secs: u64,
    /// Delay before the first reaper cycle.
    pub reaper_initial_delay_secs: u64,
    /// Delay before the first expirer cycle.
    pub expirer_initial_delay_secs: u64,
    /// Delay before the first hub check.
    pub hub_check_initial_delay_secs: u64,
    /// Browsers eligible for scale-out, mapped to slots per launched node.
    pub scalable_browsers: BTreeMap<String, u32>,
}

impl Default for ScalerConfig {
    fn default() -> Self {
        Self {
            hub_slot_ceiling: 150,
            hub_instance_id: None,
            hub_address: None,
            node_lifetime_secs: 55 * 60,
            expiry_rounding: ExpiryRounding::Exact,
            billing_increment_secs: 60 * 60,
            billing_grace_secs: 6 * 60,
            reservation_staleness_secs: 3 * 60,
            unstarted_grace_secs: 2 * 60,
            subtract_unstarted_reservations: true,
            expiry_headroom: ExpiryHeadroom::ExcludeOwnSlots,
            reaper_interval_secs: 60,
            expirer_interval_secs: 15,
            hub_check_interval_secs: 60,
            reaper_initial_delay_secs: 60,
            expirer_initial_delay_secs: 60,
            hub_check_initial_delay_secs: 5 * 60,
            scalable_browsers: ["chrome", "firefox", "internetexplorer"]
                .into_iter()
                .map(|b| (b.to_string(), DEFAULT_NODE_CAPACITY))
                .collect(),
        }
    }
}

impl ScalerConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.hub_slot_ceiling == 0 {
            return Err("hub_slot_ceiling must be greater than 0".into());
        }
        for (name, secs) in [
            ("node_lifetime_secs", self.node_lifetime_secs),
            ("billing_increment_secs", self.billing_increment_secs),
            ("reservation_staleness_secs", self.reservation_staleness_secs),
            ("reaper_interval_secs", self.reaper_interval_secs),
            ("expirer_interval_secs", self.expirer_interval_secs),
            ("hub_check_interval_secs", self.hub_check_interval_secs),
        ] {
            if secs == 0 {
                return Err(format!("{name} must be greater than 0"));
            }
        }
        if self.node_lifetime_secs >= self.billing_increment_secs {
            return Err("node_lifetime_secs must be shorter than billing_increment_secs".into());
        }
        if self.scalable_browsers.is_empty() {
            return Err("at least one scalable browser must be defined".into());
        }
        for (browser, capacity) in &self.scalable_browsers {
            if *capacity == 0 {
                return Err(format!("browser `{browser}` capacity must be greater than 0"));
            }
        }
        Ok(())
    }

    /// Parse scaler configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from the process environment.
    ///
    /// A `.env` file is read first when present. `GRID_SCALER_CONFIG` may name
    /// a JSON file used as the base; individual `GRID_SCALER_*` variables
    /// override single fields.
    pub fn from_env() -> AppResult<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        let base = match std::env::var(format!("{ENV_PREFIX}CONFIG")) {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading config file {path}"))?;
                serde_json::from_str(&raw).with_context(|| format!("parsing config file {path}"))?
            }
            Err(_) => Self::default(),
        };
        base.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `GRID_SCALER_*` overrides resolved through `lookup`, then validate.
    pub fn with_overrides<F>(mut self, lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |field: &str| {
            lookup(&format!("{ENV_PREFIX}{}", field.to_uppercase()))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        override_parsed(&mut self.hub_slot_ceiling, "hub_slot_ceiling", get("hub_slot_ceiling"))?;
        if let Some(v) = get("hub_instance_id") {
            self.hub_instance_id = Some(v);
        }
        if let Some(v) = get("hub_address") {
            self.hub_address = Some(v);
        }
        override_parsed(
            &mut self.node_lifetime_secs,
            "node_lifetime_secs",
            get("node_lifetime_secs"),
        )?;
        override_enum(&mut self.expiry_rounding, "expiry_rounding", get("expiry_rounding"))?;
        override_parsed(
            &mut self.billing_increment_secs,
            "billing_increment_secs",
            get("billing_increment_secs"),
        )?;
        override_parsed(
            &mut self.billing_grace_secs,
            "billing_grace_secs",
            get("billing_grace_secs"),
        )?;
        override_parsed(
            &mut self.reservation_staleness_secs,
            "reservation_staleness_secs",
            get("reservation_staleness_secs"),
        )?;
        override_parsed(
            &mut self.unstarted_grace_secs,
            "unstarted_grace_secs",
            get("unstarted_grace_secs"),
        )?;
        override_parsed(
            &mut self.subtract_unstarted_reservations,
            "subtract_unstarted_reservations",
            get("subtract_unstarted_reservations"),
        )?;
        override_enum(&mut self.expiry_headroom, "expiry_headroom", get("expiry_headroom"))?;
        override_parsed(
            &mut self.reaper_interval_secs,
            "reaper_interval_secs",
            get("reaper_interval_secs"),
        )?;
        override_parsed(
            &mut self.expirer_interval_secs,
            "expirer_interval_secs",
            get("expirer_interval_secs"),
        )?;
        override_parsed(
            &mut self.hub_check_interval_secs,
            "hub_check_interval_secs",
            get("hub_check_interval_secs"),
        )?;
        override_parsed(
            &mut self.reaper_initial_delay_secs,
            "reaper_initial_delay_secs",
            get("reaper_initial_delay_secs"),
        )?;
        override_parsed(
            &mut self.expirer_initial_delay_secs,
            "expirer_initial_delay_secs",
            get("expirer_initial_delay_secs"),
        )?;
        override_parsed(
            &mut self.hub_check_initial_delay_secs,
            "hub_check_initial_delay_secs",
            get("hub_check_initial_delay_secs"),
        )?;
        if let Some(list) = get("scalable_browsers") {
            self.scalable_browsers = parse_browser_list(&list)?;
        }

        self.validate().map_err(|e| anyhow::anyhow!("config invalid: {e}"))?;
        Ok(self)
    }

    /// Node lifetime.
    pub const fn node_lifetime(&self) -> Duration {
        Duration::from_secs(self.node_lifetime_secs)
    }

    /// Billing increment.
    pub const fn billing_increment(&self) -> Duration {
        Duration::from_secs(self.billing_increment_secs)
    }

    /// Billing grace margin.
    pub const fn billing_grace(&self) -> Duration {
        Duration::from_secs(self.billing_grace_secs)
    }

    /// Reservation staleness threshold.
    pub const fn reservation_staleness(&self) -> Duration {
        Duration::from_secs(self.reservation_staleness_secs)
    }

    /// Grace window for unstarted reservations.
    pub const fn unstarted_grace(&self) -> Duration {
        Duration::from_secs(self.unstarted_grace_secs)
    }
}

fn override_parsed<T>(slot: &mut T, field: &str, raw: Option<String>) -> AppResult<()>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = raw {
        *slot = raw
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {ENV_PREFIX}{}: {e}", field.to_uppercase()))?;
    }
    Ok(())
}

fn override_enum<T: DeserializeOwned>(
    slot: &mut T,
    field: &str,
    raw: Option<String>,
) -> AppResult<()> {
    if let Some(raw) = raw {
        *slot = serde_json::from_value(serde_json::Value::String(raw.to_lowercase()))
            .with_context(|| format!("invalid {ENV_PREFIX}{}", field.to_uppercase()))?;
    }
    Ok(())
}

/// Parse `chrome=6,firefox=4,safari`; a bare name gets the default capacity.
fn parse_browser_list(raw: &str) -> AppResult<BTreeMap<String, u32>> {
    let mut browsers = BTreeMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, capacity) = match entry.split_once('=') {
            Some((name, capacity)) => (
                name.trim(),
                capacity
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid capacity for browser `{}`", name.trim()))?,
            ),
            None => (entry, DEFAULT_NODE_CAPACITY),
        };
        browsers.insert(name.to_string(), capacity);
    }
    Ok(browsers)
}
