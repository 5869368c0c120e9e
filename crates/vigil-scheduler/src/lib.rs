//! vigil-scheduler: the poll loop and the per-tick alert engine.
//!
//! # Architecture
//!
//! ```text
//! PollScheduler (one tick at a time)
//!   ├── JoinSet + Semaphore(max_workers) ─► Probe per target
//!   ├── reference probe (outside the worker bound)
//!   ├── AlertEngine::apply_tick(now, results, reference)
//!   │     ├── HealthTracker      (debounce, reminders)
//!   │     ├── GlobalSuppressor   (reference host down)
//!   │     ├── StormDetector      (correlated downs)
//!   │     ├── cooldown gate
//!   │     └── RateLimiter ─► Notifier
//!   └── StateStore::save_snapshot
//! ```
//!
//! Probes run concurrently; every state mutation happens afterwards, on the
//! loop's own task, through `&mut AlertEngine`.

pub mod engine;
pub mod error;
pub mod scheduler;

pub use engine::{AlertEngine, EngineStats, TickReport};
pub use error::{SchedulerError, SchedulerResult};
pub use scheduler::{open_store, PollScheduler};
