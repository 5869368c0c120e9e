//! Sliding-window rate limiter with a deferred-message queue.
//!
//! At most `max_per_window` messages are admitted in any `window_secs`
//! span. Overflow is queued in FIFO order and later released by [`flush`]
//! as a single grouped message, so excess alerts are delayed, never dropped.
//!
//! [`flush`]: RateLimiter::flush

use std::collections::VecDeque;

use tokio::sync::Mutex;
use tracing::debug;

use vigil_core::AlertPolicy;

use crate::message;

/// Decision for a submitted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Send this body now; a window slot has been taken.
    Send(String),
    /// Queued for a later grouped flush.
    Deferred,
}

/// Deferred messages released together by one flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flushed {
    pub body: String,
    /// Targets whose alerts are part of `body`, in queue order.
    pub targets: Vec<String>,
}

#[derive(Debug)]
struct Deferred {
    target: Option<String>,
    body: String,
}

#[derive(Debug, Default)]
struct RateWindow {
    /// Send timestamps still inside the window, oldest first.
    sent: VecDeque<u64>,
    /// Deferred messages, oldest first.
    queue: VecDeque<Deferred>,
}

impl RateWindow {
    fn prune(&mut self, now: u64, window_secs: u64) {
        while let Some(&at) = self.sent.front() {
            if now.saturating_sub(at) >= window_secs {
                self.sent.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Sliding-window admission control over outbound messages.
#[derive(Debug)]
pub struct RateLimiter {
    max_per_window: usize,
    window_secs: u64,
    inner: Mutex<RateWindow>,
}

impl RateLimiter {
    pub fn new(max_per_window: u32, window_secs: u64) -> Self {
        Self {
            max_per_window: max_per_window.max(1) as usize,
            window_secs: window_secs.max(1),
            inner: Mutex::new(RateWindow::default()),
        }
    }

    pub fn from_policy(policy: &AlertPolicy) -> Self {
        Self::new(policy.max_alerts_per_window, policy.rate_window_secs)
    }

    /// Admit `body` if the window has room and nothing is already queued.
    ///
    /// `target` names the target the alert is about, if any; a later flush
    /// reports it so the caller can start that target's cooldown.
    pub async fn submit(&self, body: String, target: Option<&str>, now: u64) -> Admission {
        let mut window = self.inner.lock().await;
        window.prune(now, self.window_secs);

        if window.queue.is_empty() && window.sent.len() < self.max_per_window {
            window.sent.push_back(now);
            Admission::Send(body)
        } else {
            window.queue.push_back(Deferred {
                target: target.map(str::to_string),
                body,
            });
            debug!(
                queued = window.queue.len(),
                sent_in_window = window.sent.len(),
                "notification deferred by rate limiter"
            );
            Admission::Deferred
        }
    }

    /// Release the whole queue as one grouped message.
    ///
    /// Nothing is drained while the window is full, so the queue stays intact
    /// until a slot frees up; the grouped message then takes that slot.
    pub async fn flush(&self, now: u64) -> Option<Flushed> {
        let mut window = self.inner.lock().await;
        window.prune(now, self.window_secs);

        if window.queue.is_empty() || window.sent.len() >= self.max_per_window {
            return None;
        }

        let mut bodies = Vec::with_capacity(window.queue.len());
        let mut targets = Vec::new();
        for deferred in window.queue.drain(..) {
            if let Some(target) = deferred.target {
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }
            bodies.push(deferred.body);
        }
        window.sent.push_back(now);
        debug!(messages = bodies.len(), "deferred notifications flushed");

        Some(Flushed {
            body: message::grouped(bodies),
            targets,
        })
    }

    /// Number of deferred messages waiting for a flush.
    pub async fn pending(&self) -> usize {
        self.inner.lock().await.queue.len()
    }

    /// Number of sends counted in the window ending at `now`.
    pub async fn sent_in_window(&self, now: u64) -> usize {
        let mut window = self.inner.lock().await;
        window.prune(now, self.window_secs);
        window.sent.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 1_700_000_000;

    #[tokio::test]
    async fn admits_up_to_max_then_defers() {
        let limiter = RateLimiter::new(5, 60);

        let mut sent = 0;
        let mut deferred = 0;
        for i in 0..7 {
            match limiter.submit(format!("alert {i}"), None, T0 + i).await {
                Admission::Send(_) => sent += 1,
                Admission::Deferred => deferred += 1,
            }
        }

        assert_eq!(sent, 5);
        assert_eq!(deferred, 2);
        assert_eq!(limiter.pending().await, 2);
    }

    #[tokio::test]
    async fn flush_waits_for_capacity_then_groups() {
        let limiter = RateLimiter::new(5, 60);
        for i in 0..7 {
            let name = format!("t{i}");
            limiter.submit(format!("alert {i}"), Some(&name), T0).await;
        }

        // Window still full: the queue is left alone.
        assert_eq!(limiter.flush(T0 + 30).await, None);
        assert_eq!(limiter.pending().await, 2);

        let flushed = limiter.flush(T0 + 60).await.expect("window has freed");
        let grouped = &flushed.body;
        assert!(grouped.contains("alert 5"));
        assert!(grouped.contains("alert 6"));
        assert!(grouped.find("alert 5") < grouped.find("alert 6"));
        assert_eq!(flushed.targets, vec!["t5", "t6"]);
        assert_eq!(limiter.pending().await, 0);
        assert_eq!(limiter.sent_in_window(T0 + 60).await, 1);
    }

    #[tokio::test]
    async fn flush_reports_each_target_once() {
        let limiter = RateLimiter::new(1, 60);
        limiter.submit("first".into(), Some("a"), T0).await;
        limiter.submit("down b".into(), Some("b"), T0).await;
        limiter.submit("storm".into(), None, T0).await;
        limiter.submit("reminder b".into(), Some("b"), T0).await;

        let flushed = limiter.flush(T0 + 60).await.unwrap();
        assert_eq!(flushed.targets, vec!["b"]);
        assert!(flushed.body.starts_with("📦 3 deferred alerts"));
    }

    #[tokio::test]
    async fn new_messages_queue_behind_deferred_ones() {
        let limiter = RateLimiter::new(1, 60);
        assert!(matches!(limiter.submit("a".into(), None, T0).await, Admission::Send(_)));
        assert_eq!(limiter.submit("b".into(), None, T0 + 1).await, Admission::Deferred);

        // A slot is free again, but "b" is still waiting.
        assert_eq!(limiter.submit("c".into(), None, T0 + 61).await, Admission::Deferred);
        let grouped = limiter.flush(T0 + 61).await.unwrap().body;
        assert!(grouped.find('b') < grouped.find('c'));
    }

    #[tokio::test]
    async fn never_exceeds_max_in_any_window() {
        let limiter = RateLimiter::new(3, 10);
        let mut sends: Vec<u64> = Vec::new();

        for now in T0..T0 + 100 {
            for j in 0..2 {
                let body = format!("m{now}-{j}");
                if let Admission::Send(_) = limiter.submit(body, None, now).await {
                    sends.push(now);
                }
            }
            if limiter.flush(now).await.is_some() {
                sends.push(now);
            }
        }

        for (i, &start) in sends.iter().enumerate() {
            let in_window = sends[i..].iter().filter(|&&t| t < start + 10).count();
            assert!(in_window <= 3, "{in_window} sends in window starting at {start}");
        }
    }

    #[tokio::test]
    async fn single_deferred_message_flushes_unchanged() {
        let limiter = RateLimiter::new(1, 60);
        limiter.submit("first".into(), None, T0).await;
        limiter.submit("second".into(), None, T0).await;
        let flushed = limiter.flush(T0 + 60).await.unwrap();
        assert_eq!(flushed.body, "second");
        assert!(flushed.targets.is_empty());
    }
}
