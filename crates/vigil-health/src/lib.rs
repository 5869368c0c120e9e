//! vigil-health: probes and debounced health classification.
//!
//! # Architecture
//!
//! ```text
//! Probe (trait)
//!   └── NetworkProbe
//!       ├── http://   → hyper http1 GET over a tokio TcpStream
//!       ├── https://  → reqwest (rustls)
//!       ├── tcp://    → tokio TcpStream connect
//!       └── ping://   → system ping helper, killed at the deadline
//!
//! HealthTracker
//!   └── record(&mut HealthRecord, healthy, now) → Option<Transition>
//! ```
//!
//! Probes never return errors: every failure is folded into a
//! [`ProbeOutcome`] with a structured [`ProbeFailure`] and a short detail.
//!
//! The tracker is a pure function over a persisted `HealthRecord`. A target
//! goes down only after `failure_threshold` consecutive failures and comes
//! back only after `success_threshold` consecutive successes.

pub mod checker;
pub mod tracker;

pub use checker::{BoxFuture, NetworkProbe, Probe, ProbeFailure, ProbeOutcome};
pub use tracker::{HealthTracker, Transition};
