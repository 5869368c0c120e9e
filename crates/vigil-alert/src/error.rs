//! Notification error types.

use thiserror::Error;

/// Result type alias for notification delivery.
pub type NotifyResult<T> = Result<T, NotifyError>;

/// Errors from the notification sink. Always logged, never fatal.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("delivery failed: {0}")]
    Transport(String),

    #[error("sink returned status {0}")]
    Status(u16),

    #[error("sink rejected message: {0}")]
    Rejected(String),
}
