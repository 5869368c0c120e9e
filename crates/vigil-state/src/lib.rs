//! vigil-state: durable health snapshot for the vigil monitor.
//!
//! Backed by [redb](https://docs.rs/redb). Every per-target `HealthRecord`
//! is JSON-serialized into the `health` table keyed by target name; the
//! process-wide `SuppressionState` lives under a single key in `meta`.
//!
//! A snapshot is written in one write transaction after every tick, so a
//! restart resumes with the same streaks, status and cooldown timestamps.
//! Unreadable records load as fresh ones rather than failing startup.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
