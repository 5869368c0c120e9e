//! Correlated-outage ("storm") detection over a trailing event window.

use std::collections::VecDeque;

use tracing::{debug, warn};

use vigil_core::AlertPolicy;
use vigil_state::SuppressionState;

/// What happened to a target in the aggregation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggKind {
    Down,
    Up,
    /// An alert was withheld by storm or global suppression.
    Suppressed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggEvent {
    pub at: u64,
    pub target: String,
    pub kind: AggKind,
}

/// Tracks recent transitions and declares a storm when enough targets go
/// down together.
#[derive(Debug)]
pub struct StormDetector {
    window_secs: u64,
    threshold: usize,
    storm_suppress_secs: u64,
    global_suppress_secs: u64,
    events: VecDeque<AggEvent>,
}

impl StormDetector {
    pub fn new(policy: &AlertPolicy) -> Self {
        Self {
            window_secs: policy.agg_window_secs,
            threshold: policy.storm_threshold.max(1) as usize,
            storm_suppress_secs: policy.storm_suppress_secs,
            global_suppress_secs: policy.global_suppress_secs,
            events: VecDeque::new(),
        }
    }

    pub fn record(&mut self, at: u64, target: &str, kind: AggKind) {
        self.events.push_back(AggEvent {
            at,
            target: target.to_string(),
            kind,
        });
    }

    /// Drop events older than the window. The window edge is inclusive.
    pub fn prune(&mut self, now: u64) {
        while let Some(ev) = self.events.front() {
            if now.saturating_sub(ev.at) > self.window_secs {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn events(&self) -> impl Iterator<Item = &AggEvent> {
        self.events.iter()
    }

    fn down_names(&self, now: u64) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for ev in &self.events {
            if ev.kind == AggKind::Down
                && now.saturating_sub(ev.at) <= self.window_secs
                && !names.contains(&ev.target)
            {
                names.push(ev.target.clone());
            }
        }
        names
    }

    /// Declare a storm if the window holds enough down events and none is
    /// active. Returns the names that went down in the window.
    ///
    /// On declaration the storm and global windows are extended in
    /// `suppression`; stamping per-target records is left to the caller.
    pub fn evaluate(&mut self, now: u64, suppression: &mut SuppressionState) -> Option<Vec<String>> {
        self.prune(now);

        if suppression.storm_active(now) {
            return None;
        }

        let downs = self
            .events
            .iter()
            .filter(|ev| ev.kind == AggKind::Down)
            .count();
        if downs < self.threshold {
            if downs > 0 {
                debug!(downs, threshold = self.threshold, "down events in window");
            }
            return None;
        }

        suppression.storm_until = now + self.storm_suppress_secs;
        suppression.global_suppress_until = suppression
            .global_suppress_until
            .max(now + self.global_suppress_secs);

        let names = self.down_names(now);
        warn!(
            downs,
            storm_until = suppression.storm_until,
            global_suppress_until = suppression.global_suppress_until,
            "alert storm declared"
        );
        Some(names)
    }
}
