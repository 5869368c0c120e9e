//! vigil-alert: everything between a health transition and the sink.
//!
//! # Architecture
//!
//! ```text
//! transition ─► GlobalSuppressor / StormDetector ─► cooldown ─► RateLimiter ─► Notifier
//!                     │                                              │
//!                     └── AggEvent(Suppressed)            deferred queue, flushed
//!                                                         as one grouped message
//! ```
//!
//! The storm detector and global suppressor only mutate a
//! `SuppressionState`; the caller decides what to withhold. The rate
//! limiter guards its window and queue with its own mutex so a flush can
//! run independently of per-target state.

pub mod error;
pub mod limiter;
pub mod message;
pub mod notifier;
pub mod storm;
pub mod suppression;

pub use error::{NotifyError, NotifyResult};
pub use limiter::{Admission, Flushed, RateLimiter};
pub use notifier::{build_notifier, Notifier, RecordingNotifier};
pub use storm::{AggEvent, AggKind, StormDetector};
pub use suppression::GlobalSuppressor;
