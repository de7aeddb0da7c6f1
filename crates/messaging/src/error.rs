use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the messaging fabric.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// The broker refused or failed to confirm a publish.
    #[error("Publish to topic '{topic}' failed: {reason}")]
    PublishRejected { topic: String, reason: String },

    /// A partition index outside the topic's partition range was requested.
    #[error("Topic '{topic}' has no partition {partition}")]
    InvalidPartition { topic: String, partition: u32 },

    /// An outbox row referenced by id does not exist.
    #[error("Outbox message not found: {0}")]
    UnknownOutboxMessage(Uuid),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for messaging operations.
pub type Result<T> = std::result::Result<T, MessagingError>;
