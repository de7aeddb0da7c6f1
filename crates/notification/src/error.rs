//! Notification error types.

use thiserror::Error;

/// Errors raised while delivering a notification.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// The delivery channel rejected or failed the send.
    #[error("Failed to send notification: {0}")]
    SendFailed(String),
}

pub type Result<T> = std::result::Result<T, NotificationError>;
