//! Global outage suppression driven by a reference host.

use tracing::{info, warn};

use vigil_core::Target;
use vigil_health::ProbeOutcome;
use vigil_state::SuppressionState;

use crate::message;

/// Silences individual alerts while the monitoring host itself looks offline.
#[derive(Debug, Clone)]
pub struct GlobalSuppressor {
    reference: Option<Target>,
    suppress_secs: u64,
}

impl GlobalSuppressor {
    pub fn new(reference: Option<Target>, suppress_secs: u64) -> Self {
        Self {
            reference,
            suppress_secs,
        }
    }

    pub fn reference(&self) -> Option<&Target> {
        self.reference.as_ref()
    }

    /// Apply this tick's reference probe.
    ///
    /// Returns the notice to send when suppression is newly activated.
    pub fn observe(
        &self,
        outcome: Option<&ProbeOutcome>,
        now: u64,
        suppression: &mut SuppressionState,
    ) -> Option<String> {
        let (reference, outcome) = match (&self.reference, outcome) {
            (Some(r), Some(o)) => (r, o),
            _ => return None,
        };

        if outcome.healthy {
            if suppression.global_active(now) {
                info!(
                    until = suppression.global_suppress_until,
                    "reference host reachable, suppression window still running"
                );
            }
            return None;
        }
        if suppression.global_active(now) {
            return None;
        }

        suppression.global_suppress_until = now + self.suppress_secs;
        warn!(
            reference = %reference.endpoint,
            detail = %outcome.detail,
            until = suppression.global_suppress_until,
            "reference host unreachable, suppressing individual alerts"
        );
        Some(message::global_outage(
            reference,
            &outcome.detail,
            self.suppress_secs,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::Endpoint;
    use vigil_health::ProbeFailure;

    const T0: u64 = 1_700_000_000;

    fn suppressor() -> GlobalSuppressor {
        let reference = Target::new(
            "reference",
            Endpoint::Ping {
                host: "8.8.8.8".to_string(),
            },
        );
        GlobalSuppressor::new(Some(reference), 600)
    }

    #[test]
    fn failed_reference_activates_once() {
        let g = suppressor();
        let mut s = SuppressionState::default();
        let down = ProbeOutcome::failed("ping", ProbeFailure::NoReply);

        let notice = g.observe(Some(&down), T0, &mut s).expect("notice");
        assert!(notice.contains("ping://8.8.8.8"));
        assert_eq!(s.global_suppress_until, T0 + 600);

        assert_eq!(g.observe(Some(&down), T0 + 60, &mut s), None);
        assert_eq!(s.global_suppress_until, T0 + 600);

        // Expired: a fresh failure re-arms.
        assert!(g.observe(Some(&down), T0 + 600, &mut s).is_some());
        assert_eq!(s.global_suppress_until, T0 + 1200);
    }

    #[test]
    fn healthy_reference_leaves_state_alone() {
        let g = suppressor();
        let mut s = SuppressionState::default();
        let up = ProbeOutcome::healthy("ping reply");
        assert_eq!(g.observe(Some(&up), T0, &mut s), None);
        assert_eq!(s, SuppressionState::default());
    }

    #[test]
    fn disabled_without_reference() {
        let g = GlobalSuppressor::new(None, 600);
        let mut s = SuppressionState::default();
        let down = ProbeOutcome::failed("ping", ProbeFailure::Timeout);
        assert_eq!(g.observe(Some(&down), T0, &mut s), None);
        assert_eq!(g.observe(None, T0, &mut s), None);
    }
}
