//! Debounced per-target health classification.
//!
//! The tracker owns no state: it applies one probe result to a persisted
//! [`HealthRecord`] and reports the alert-worthy transition, if any.

use tracing::{debug, info, warn};

use vigil_core::AlertPolicy;
use vigil_state::{HealthRecord, HealthStatus};

/// An alert-worthy change produced by one probe result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// `Unknown|Up → Down` after `failure_threshold` consecutive failures.
    WentDown,
    /// Still down and the reminder interval has elapsed.
    StillDown,
    /// `Down → Up` after `success_threshold` consecutive successes.
    Recovered,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::WentDown => "down",
            Transition::StillDown => "reminder",
            Transition::Recovered => "recovered",
        }
    }
}

/// Applies the debounce rules to health records.
#[derive(Debug, Clone)]
pub struct HealthTracker {
    /// Consecutive failures before a target is declared down.
    failure_threshold: u32,
    /// Consecutive successes before a down target is declared up.
    success_threshold: u32,
    /// Minimum spacing between reminders, and between delivered alerts.
    cooldown_secs: u64,
}

impl HealthTracker {
    /// Create a tracker from the alerting policy.
    pub fn new(policy: &AlertPolicy) -> Self {
        Self::with_thresholds(
            policy.failure_threshold,
            policy.success_threshold,
            policy.cooldown_secs,
        )
    }

    pub fn with_thresholds(failure_threshold: u32, success_threshold: u32, cooldown_secs: u64) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            success_threshold: success_threshold.max(1),
            cooldown_secs,
        }
    }

    /// Record a probe result taken at `now` and return the transition it caused.
    pub fn record(
        &self,
        name: &str,
        record: &mut HealthRecord,
        healthy: bool,
        now: u64,
    ) -> Option<Transition> {
        if healthy {
            record.fail_streak = 0;
            record.ok_streak = record.ok_streak.saturating_add(1);

            match record.status {
                HealthStatus::Unknown => {
                    info!(target_name = %name, "initial state up");
                    record.status = HealthStatus::Up;
                    None
                }
                HealthStatus::Down if record.ok_streak >= self.success_threshold => {
                    info!(
                        target_name = %name,
                        successes = record.ok_streak,
                        "target recovered"
                    );
                    record.status = HealthStatus::Up;
                    Some(Transition::Recovered)
                }
                HealthStatus::Down => {
                    debug!(
                        target_name = %name,
                        successes = record.ok_streak,
                        threshold = self.success_threshold,
                        "down target answering, waiting for threshold"
                    );
                    None
                }
                HealthStatus::Up => None,
            }
        } else {
            record.ok_streak = 0;
            record.fail_streak = record.fail_streak.saturating_add(1);

            match record.status {
                HealthStatus::Down => {
                    if now.saturating_sub(record.last_reminder_at) >= self.cooldown_secs {
                        record.last_reminder_at = now;
                        Some(Transition::StillDown)
                    } else {
                        None
                    }
                }
                _ if record.fail_streak >= self.failure_threshold => {
                    warn!(
                        target_name = %name,
                        failures = record.fail_streak,
                        threshold = self.failure_threshold,
                        "target marked down"
                    );
                    record.status = HealthStatus::Down;
                    record.last_reminder_at = now;
                    Some(Transition::WentDown)
                }
                _ => {
                    debug!(
                        target_name = %name,
                        failures = record.fail_streak,
                        threshold = self.failure_threshold,
                        "probe failed, below threshold"
                    );
                    None
                }
            }
        }
    }

    /// Whether enough time has passed since the last delivered alert.
    pub fn cooldown_elapsed(&self, record: &HealthRecord, now: u64) -> bool {
        record.last_alert_at == 0 || now.saturating_sub(record.last_alert_at) >= self.cooldown_secs
    }
}
