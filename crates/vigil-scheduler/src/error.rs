//! Scheduler error types.

use thiserror::Error;

/// Errors that can occur while wiring up the poll loop.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to build probe client: {0}")]
    Probe(String),

    #[error("notifier error: {0}")]
    Notify(#[from] vigil_alert::NotifyError),

    #[error("state store error: {0}")]
    State(#[from] vigil_state::StateError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
