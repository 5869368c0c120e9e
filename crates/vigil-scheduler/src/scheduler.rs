//! PollScheduler: the fixed-interval probe loop.
//!
//! Each tick fans out one probe per target on a `JoinSet`, bounded by a
//! semaphore of `max_workers` permits, waits for all of them, then hands the
//! results to the [`AlertEngine`] and persists a snapshot. Ticks never
//! overlap; a slow tick simply delays the next one.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use vigil_alert::{build_notifier, Notifier};
use vigil_core::{ProbeTimeouts, Settings, Target};
use vigil_health::{NetworkProbe, Probe, ProbeFailure, ProbeOutcome};
use vigil_state::{Snapshot, StateStore};

use crate::engine::{AlertEngine, TickReport};
use crate::error::{SchedulerError, SchedulerResult};

/// Open the on-disk store, falling back to an in-memory one.
pub fn open_store(path: &Path) -> SchedulerResult<StateStore> {
    match StateStore::open(path) {
        Ok(store) => Ok(store),
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "state store unavailable, continuing with in-memory state"
            );
            Ok(StateStore::open_in_memory()?)
        }
    }
}

fn load_or_fresh(store: &StateStore) -> Snapshot {
    match store.load_snapshot() {
        Ok(snapshot) => {
            debug!(records = snapshot.records.len(), "snapshot loaded");
            snapshot
        }
        Err(e) => {
            warn!(error = %e, "snapshot unreadable, starting fresh");
            Snapshot::default()
        }
    }
}

pub struct PollScheduler {
    engine: AlertEngine,
    probe: Arc<dyn Probe>,
    store: StateStore,
    timeouts: ProbeTimeouts,
    interval: Duration,
    permits: Arc<Semaphore>,
    max_workers: usize,
}

impl PollScheduler {
    /// Wire a scheduler from explicit parts. The engine resumes from
    /// whatever `store` holds.
    pub fn new(
        settings: &Settings,
        probe: Arc<dyn Probe>,
        notifier: Arc<dyn Notifier>,
        store: StateStore,
    ) -> Self {
        let snapshot = load_or_fresh(&store);
        let engine = AlertEngine::new(
            settings.targets.clone(),
            settings.reference.clone(),
            settings.policy.clone(),
            notifier,
            snapshot,
        );
        let max_workers = settings.max_workers.max(1);

        Self {
            engine,
            probe,
            store,
            timeouts: settings.timeouts,
            interval: settings.interval,
            permits: Arc::new(Semaphore::new(max_workers)),
            max_workers,
        }
    }

    /// Wire the production probe, the configured sink and the on-disk store.
    pub fn from_settings(settings: &Settings) -> SchedulerResult<Self> {
        let probe = NetworkProbe::new(settings.timeouts)
            .map_err(|e| SchedulerError::Probe(e.to_string()))?;
        let notifier = build_notifier(&settings.notify, settings.dry_run)?;
        let store = open_store(&settings.state_path)?;
        Ok(Self::new(settings, Arc::new(probe), notifier, store))
    }

    pub fn engine(&self) -> &AlertEngine {
        &self.engine
    }

    pub async fn announce_startup(&mut self) {
        self.engine
            .announce_startup(epoch_secs(), self.interval)
            .await;
    }

    /// Probe every target, apply the results at `now`, and persist.
    pub async fn tick_at(&mut self, now: u64) -> TickReport {
        let (results, reference) = self.probe_all().await;
        let report = self.engine.apply_tick(now, results, reference).await;
        self.persist();
        report
    }

    /// Run until `shutdown` flips to `true` (or its sender is dropped).
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            targets = self.engine.targets().len(),
            interval_secs = self.interval.as_secs(),
            max_workers = self.max_workers,
            "poll loop started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let started = Instant::now();
            let report = self.tick_at(epoch_secs()).await;
            let elapsed = started.elapsed();
            debug!(
                probed = report.probed,
                unhealthy = report.unhealthy,
                transitions = report.transitions.len(),
                sent = report.stats.sent,
                deferred = report.stats.deferred,
                suppressed = report.stats.suppressed,
                elapsed_ms = elapsed.as_millis() as u64,
                "tick complete"
            );
            if elapsed > self.interval {
                warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    interval_secs = self.interval.as_secs(),
                    "tick overran the poll interval"
                );
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval.saturating_sub(elapsed)) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.persist();
        info!("poll loop stopped");
    }

    fn persist(&self) {
        if let Err(e) = self.store.save_snapshot(&self.engine.snapshot()) {
            warn!(error = %e, "failed to persist snapshot");
        }
    }

    async fn probe_all(&self) -> (Vec<ProbeOutcome>, Option<ProbeOutcome>) {
        let reference = self.engine.reference().cloned().map(|target| {
            let probe = Arc::clone(&self.probe);
            let deadline = self.timeouts.deadline(target.kind());
            tokio::spawn(async move { bounded_probe(probe.as_ref(), &target, deadline).await })
        });

        let targets = self.engine.targets();
        let mut set = JoinSet::new();
        for (idx, target) in targets.iter().cloned().enumerate() {
            let probe = Arc::clone(&self.probe);
            let permits = Arc::clone(&self.permits);
            let deadline = self.timeouts.deadline(target.kind());
            set.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                (idx, bounded_probe(probe.as_ref(), &target, deadline).await)
            });
        }

        let mut slots: Vec<Option<ProbeOutcome>> = vec![None; targets.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, outcome)) => slots[idx] = Some(outcome),
                Err(e) => warn!(error = %e, "probe task failed"),
            }
        }

        let results = slots
            .into_iter()
            .zip(targets)
            .map(|(slot, target)| {
                slot.unwrap_or_else(|| {
                    ProbeOutcome::failed(
                        &label(target),
                        ProbeFailure::Other("probe task aborted".to_string()),
                    )
                })
            })
            .collect();

        let reference = match reference {
            Some(handle) => match handle.await {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    warn!(error = %e, "reference probe task failed");
                    None
                }
            },
            None => None,
        };

        (results, reference)
    }
}

async fn bounded_probe(probe: &dyn Probe, target: &Target, deadline: Duration) -> ProbeOutcome {
    match tokio::time::timeout(deadline, probe.probe(target)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            debug!(target_name = %target.name, "probe abandoned at deadline");
            ProbeOutcome::failed(&label(target), ProbeFailure::Timeout)
        }
    }
}

fn label(target: &Target) -> String {
    target.kind().as_str().to_ascii_uppercase()
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
