//! AlertEngine: turns one tick of probe results into notifications.
//!
//! The engine owns every `HealthRecord` and the `SuppressionState`. Each tick
//! runs in a fixed order:
//!
//! 1. prune the aggregation window
//! 2. apply the reference probe (global suppression)
//! 3. apply every target result to its record, collecting transitions
//! 4. evaluate the storm detector
//! 5. dispatch each transition through suppression, cooldown, and the limiter
//! 6. flush deferred messages if the rate window has room

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use vigil_alert::{message, Admission, AggKind, GlobalSuppressor, Notifier, RateLimiter, StormDetector};
use vigil_core::{AlertPolicy, Target};
use vigil_health::{HealthTracker, ProbeOutcome, Transition};
use vigil_state::{HealthRecord, Snapshot, SuppressionState};

/// Counters for messages and withheld alerts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Messages handed to the sink successfully.
    pub sent: u64,
    /// Messages queued by the rate limiter.
    pub deferred: u64,
    /// Per-target alerts withheld by storm or global suppression.
    pub suppressed: u64,
    /// Per-target alerts withheld by the cooldown gate.
    pub cooldown_withheld: u64,
    pub sink_failures: u64,
    pub storms: u64,
    pub global_outages: u64,
}

impl EngineStats {
    fn add(&mut self, other: &EngineStats) {
        self.sent += other.sent;
        self.deferred += other.deferred;
        self.suppressed += other.suppressed;
        self.cooldown_withheld += other.cooldown_withheld;
        self.sink_failures += other.sink_failures;
        self.storms += other.storms;
        self.global_outages += other.global_outages;
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub now: u64,
    pub probed: usize,
    pub unhealthy: usize,
    /// Transitions in target order, before suppression or cooldown.
    pub transitions: Vec<(String, Transition)>,
    pub storm_declared: bool,
    pub global_activated: bool,
    pub stats: EngineStats,
}

pub struct AlertEngine {
    targets: Vec<Target>,
    policy: AlertPolicy,
    tracker: HealthTracker,
    storm: StormDetector,
    global: GlobalSuppressor,
    limiter: RateLimiter,
    notifier: Arc<dyn Notifier>,
    records: BTreeMap<String, HealthRecord>,
    suppression: SuppressionState,
    stats: EngineStats,
}

impl AlertEngine {
    /// Build an engine, resuming from `snapshot`.
    ///
    /// Targets missing from the snapshot start with a fresh record; stored
    /// records for targets no longer configured are dropped.
    pub fn new(
        targets: Vec<Target>,
        reference: Option<Target>,
        policy: AlertPolicy,
        notifier: Arc<dyn Notifier>,
        snapshot: Snapshot,
    ) -> Self {
        let mut stored = snapshot.records;
        let records: BTreeMap<String, HealthRecord> = targets
            .iter()
            .map(|t| {
                let record = stored.remove(&t.name).unwrap_or_default();
                (t.name.clone(), record)
            })
            .collect();
        for name in stored.keys() {
            debug!(target_name = %name, "dropping state for unconfigured target");
        }

        Self {
            tracker: HealthTracker::new(&policy),
            storm: StormDetector::new(&policy),
            global: GlobalSuppressor::new(reference, policy.global_suppress_secs),
            limiter: RateLimiter::from_policy(&policy),
            targets,
            policy,
            notifier,
            records,
            suppression: snapshot.suppression,
            stats: EngineStats::default(),
        }
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn reference(&self) -> Option<&Target> {
        self.global.reference()
    }

    pub fn record(&self, name: &str) -> Option<&HealthRecord> {
        self.records.get(name)
    }

    pub fn suppression(&self) -> SuppressionState {
        self.suppression
    }

    /// Cumulative counters since the engine was built.
    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Messages waiting in the rate limiter.
    pub async fn pending(&self) -> usize {
        self.limiter.pending().await
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            records: self.records.clone(),
            suppression: self.suppression,
        }
    }

    /// Send the "monitoring started" summary and the watchlist.
    pub async fn announce_startup(&mut self, now: u64, interval: Duration) {
        let mut stats = EngineStats::default();
        let started = message::started(&self.targets, interval);
        let watchlist = message::watchlist(&self.targets);
        self.dispatch(started, None, now, &mut stats).await;
        self.dispatch(watchlist, None, now, &mut stats).await;
        self.stats.add(&stats);
    }

    /// Apply one tick. `results` holds one outcome per target, in target
    /// order; `reference` is the reference probe's outcome, if one ran.
    pub async fn apply_tick(
        &mut self,
        now: u64,
        results: Vec<ProbeOutcome>,
        reference: Option<ProbeOutcome>,
    ) -> TickReport {
        debug_assert_eq!(results.len(), self.targets.len());

        let mut report = TickReport {
            now,
            probed: results.len(),
            ..Default::default()
        };
        let mut stats = EngineStats::default();

        self.storm.prune(now);

        if let Some(notice) = self
            .global
            .observe(reference.as_ref(), now, &mut self.suppression)
        {
            report.global_activated = true;
            stats.global_outages += 1;
            self.dispatch(notice, None, now, &mut stats).await;
        }

        let mut pending: Vec<(usize, Transition, String)> = Vec::new();
        for (idx, (target, outcome)) in self.targets.iter().zip(results).enumerate() {
            if !outcome.healthy {
                report.unhealthy += 1;
            }
            let record = self.records.entry(target.name.clone()).or_default();
            let Some(transition) = self
                .tracker
                .record(&target.name, record, outcome.healthy, now)
            else {
                continue;
            };

            match transition {
                Transition::WentDown => self.storm.record(now, &target.name, AggKind::Down),
                Transition::Recovered => self.storm.record(now, &target.name, AggKind::Up),
                Transition::StillDown => {}
            }
            report.transitions.push((target.name.clone(), transition));
            pending.push((idx, transition, outcome.detail));
        }

        if let Some(names) = self.storm.evaluate(now, &mut self.suppression) {
            report.storm_declared = true;
            stats.storms += 1;
            for record in self.records.values_mut() {
                record.last_alert_at = now;
            }
            let body = message::storm(
                &names,
                self.policy.agg_window_secs,
                self.policy.storm_suppress_secs,
            );
            self.dispatch(body, None, now, &mut stats).await;
        }

        for (idx, transition, detail) in pending {
            let target = &self.targets[idx];
            let name = target.name.clone();

            if self.suppression.suppresses_alerts(now) {
                debug!(
                    target_name = %name,
                    transition = transition.as_str(),
                    "alert suppressed"
                );
                self.storm.record(now, &name, AggKind::Suppressed);
                stats.suppressed += 1;
                continue;
            }

            let cooled = self
                .records
                .get(&name)
                .is_none_or(|r| self.tracker.cooldown_elapsed(r, now));
            if !cooled {
                debug!(
                    target_name = %name,
                    transition = transition.as_str(),
                    "alert withheld by cooldown"
                );
                stats.cooldown_withheld += 1;
                continue;
            }

            let body = match transition {
                Transition::WentDown => message::down(target, &detail),
                Transition::StillDown => message::reminder(target, &detail),
                Transition::Recovered if self.policy.recovery_notify => {
                    message::recovered(target, &detail)
                }
                Transition::Recovered => continue,
            };

            if self.dispatch(body, Some(&name), now, &mut stats).await {
                if let Some(record) = self.records.get_mut(&name) {
                    record.last_alert_at = now;
                }
            }
        }

        if let Some(flushed) = self.limiter.flush(now).await {
            for name in &flushed.targets {
                if let Some(record) = self.records.get_mut(name) {
                    record.last_alert_at = now;
                }
            }
            self.deliver(&flushed.body, &mut stats).await;
        }

        self.stats.add(&stats);
        report.stats = stats;
        report
    }

    /// Submit a message to the rate limiter. Returns whether it was admitted.
    async fn dispatch(
        &self,
        body: String,
        target: Option<&str>,
        now: u64,
        stats: &mut EngineStats,
    ) -> bool {
        match self.limiter.submit(body, target, now).await {
            Admission::Send(body) => {
                self.deliver(&body, stats).await;
                true
            }
            Admission::Deferred => {
                stats.deferred += 1;
                false
            }
        }
    }

    async fn deliver(&self, body: &str, stats: &mut EngineStats) {
        match self.notifier.notify(body).await {
            Ok(()) => {
                stats.sent += 1;
                info!(sink = self.notifier.name(), "notification sent");
            }
            Err(e) => {
                stats.sink_failures += 1;
                error!(sink = self.notifier.name(), error = %e, "notification failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use vigil_alert::RecordingNotifier;
    use vigil_core::Endpoint;
    use vigil_health::ProbeFailure;
    use vigil_state::HealthStatus;

    const T0: u64 = 1_700_000_000;

    fn target(name: &str) -> Target {
        Target::new(
            name,
            Endpoint::Tcp {
                host: "10.0.0.1".to_string(),
                port: 22,
            },
        )
    }

    fn ok() -> ProbeOutcome {
        ProbeOutcome::healthy("TCP OK")
    }

    fn fail() -> ProbeOutcome {
        ProbeOutcome::failed("TCP", ProbeFailure::ConnectionRefused)
    }

    fn engine(names: &[&str], policy: AlertPolicy) -> (AlertEngine, Arc<RecordingNotifier>) {
        let sink = Arc::new(RecordingNotifier::new());
        let engine = AlertEngine::new(
            names.iter().map(|n| target(n)).collect(),
            None,
            policy,
            sink.clone(),
            Snapshot::default(),
        );
        (engine, sink)
    }

    #[tokio::test]
    async fn down_then_recovered() {
        let (mut e, sink) = engine(&["nvr"], AlertPolicy::default());

        for i in 0..3 {
            e.apply_tick(T0 + i * 60, vec![fail()], None).await;
        }
        assert_eq!(sink.messages().len(), 1);
        assert!(sink.messages()[0].starts_with("❌ nvr"));
        assert_eq!(e.record("nvr").unwrap().last_alert_at, T0 + 120);

        // Recovery inside the cooldown is withheld.
        e.apply_tick(T0 + 180, vec![ok()], None).await;
        let report = e.apply_tick(T0 + 240, vec![ok()], None).await;
        assert_eq!(report.transitions, vec![("nvr".to_string(), Transition::Recovered)]);
        assert_eq!(report.stats.cooldown_withheld, 1);
        assert_eq!(e.record("nvr").unwrap().status, HealthStatus::Up);
        assert_eq!(sink.messages().len(), 1);
    }

    #[tokio::test]
    async fn recovery_after_cooldown_is_sent() {
        let policy = AlertPolicy {
            cooldown_secs: 60,
            ..Default::default()
        };
        let (mut e, sink) = engine(&["nvr"], policy);
        for i in 0..3 {
            e.apply_tick(T0 + i, vec![fail()], None).await;
        }
        e.apply_tick(T0 + 100, vec![ok()], None).await;
        e.apply_tick(T0 + 110, vec![ok()], None).await;

        let messages = sink.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[1].starts_with("✅ nvr"));
    }

    #[tokio::test]
    async fn recovery_notify_off_still_transitions() {
        let policy = AlertPolicy {
            cooldown_secs: 0,
            recovery_notify: false,
            ..Default::default()
        };
        let (mut e, sink) = engine(&["nvr"], policy);
        for i in 0..3 {
            e.apply_tick(T0 + i, vec![fail()], None).await;
        }
        e.apply_tick(T0 + 10, vec![ok()], None).await;
        e.apply_tick(T0 + 11, vec![ok()], None).await;

        assert_eq!(sink.messages().len(), 1);
        assert_eq!(e.record("nvr").unwrap().status, HealthStatus::Up);
    }

    #[tokio::test]
    async fn sink_failure_is_counted_not_fatal() {
        let sink = Arc::new(RecordingNotifier::failing());
        let mut e = AlertEngine::new(
            vec![target("a")],
            None,
            AlertPolicy {
                failure_threshold: 1,
                ..Default::default()
            },
            sink.clone(),
            Snapshot::default(),
        );
        let report = e.apply_tick(T0, vec![fail()], None).await;
        assert_eq!(report.stats.sink_failures, 1);
        assert_eq!(report.stats.sent, 0);
        // Admitted by the limiter, so the cooldown still starts.
        assert_eq!(e.record("a").unwrap().last_alert_at, T0);
    }

    #[tokio::test]
    async fn resumes_from_snapshot() {
        let mut snapshot = Snapshot::default();
        snapshot.records.insert(
            "a".to_string(),
            HealthRecord {
                status: HealthStatus::Down,
                fail_streak: 7,
                ok_streak: 0,
                last_alert_at: T0,
                last_reminder_at: T0,
            },
        );
        snapshot.records.insert("gone".to_string(), HealthRecord::default());

        let sink = Arc::new(RecordingNotifier::new());
        let mut e = AlertEngine::new(
            vec![target("a"), target("b")],
            None,
            AlertPolicy::default(),
            sink.clone(),
            snapshot,
        );
        assert_eq!(e.record("a").unwrap().fail_streak, 7);
        assert_eq!(e.record("b").unwrap().status, HealthStatus::Unknown);
        assert!(e.record("gone").is_none());

        // Still down, inside the cooldown: no re-alert.
        e.apply_tick(T0 + 60, vec![fail(), ok()], None).await;
        assert!(sink.messages().is_empty());
    }

    #[tokio::test]
    async fn startup_summary_goes_through_limiter() {
        let policy = AlertPolicy {
            max_alerts_per_window: 1,
            ..Default::default()
        };
        let (mut e, sink) = engine(&["a", "b"], policy);
        e.announce_startup(T0, Duration::from_secs(60)).await;

        assert_eq!(sink.messages().len(), 1);
        assert!(sink.messages()[0].starts_with("🔍 Monitoring started"));
        assert_eq!(e.pending().await, 1);
        assert_eq!(e.stats().deferred, 1);
    }

    #[tokio::test]
    async fn flushed_alert_starts_its_target_cooldown() {
        let policy = AlertPolicy {
            failure_threshold: 1,
            success_threshold: 1,
            cooldown_secs: 600,
            max_alerts_per_window: 1,
            rate_window_secs: 60,
            ..Default::default()
        };
        let (mut e, sink) = engine(&["a", "b"], policy);

        e.apply_tick(T0, vec![fail(), fail()], None).await;
        assert_eq!(sink.messages().len(), 1);
        assert_eq!(e.record("b").unwrap().last_alert_at, 0);

        e.apply_tick(T0 + 60, vec![fail(), fail()], None).await;
        let messages = sink.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[1].starts_with("❌ b is unreachable!"));
        assert_eq!(e.record("b").unwrap().last_alert_at, T0 + 60);

        // b recovers inside the cooldown that the flushed alert started.
        let report = e.apply_tick(T0 + 120, vec![fail(), ok()], None).await;
        assert_eq!(report.stats.cooldown_withheld, 1);
        assert_eq!(sink.messages().len(), 2);
        assert_eq!(e.record("b").unwrap().status, HealthStatus::Up);
    }
}
