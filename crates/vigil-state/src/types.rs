//! Persisted domain types.
//!
//! All timestamps are Unix epoch seconds; `0` means "never".

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Debounced availability of a target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// No probe has been classified yet.
    #[default]
    Unknown,
    Up,
    Down,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Up => "up",
            HealthStatus::Down => "down",
        }
    }
}

/// Per-target counters and timestamps.
///
/// At most one of `fail_streak` / `ok_streak` is non-zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub status: HealthStatus,
    pub fail_streak: u32,
    pub ok_streak: u32,
    /// Last time an alert for this target was accepted for sending.
    pub last_alert_at: u64,
    /// Last time a down transition or reminder fired for this target.
    pub last_reminder_at: u64,
}

impl HealthRecord {
    /// Streak invariant check, used when loading snapshots.
    pub fn is_consistent(&self) -> bool {
        self.fail_streak == 0 || self.ok_streak == 0
    }
}

/// Process-wide suppression windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuppressionState {
    pub storm_until: u64,
    pub global_suppress_until: u64,
}

impl SuppressionState {
    /// A storm is active until `storm_until` has passed.
    pub fn storm_active(&self, now: u64) -> bool {
        now <= self.storm_until && self.storm_until != 0
    }

    pub fn global_active(&self, now: u64) -> bool {
        now < self.global_suppress_until
    }

    /// Whether individual per-target alerts must be withheld.
    pub fn suppresses_alerts(&self, now: u64) -> bool {
        self.global_active(now) || now < self.storm_until
    }
}

/// Everything persisted after a tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub records: BTreeMap<String, HealthRecord>,
    pub suppression: SuppressionState,
}
