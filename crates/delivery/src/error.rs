//! Delivery service error types.

use common::{DeliveryId, OrderId};
use messaging::MessagingError;
use thiserror::Error;

use crate::state::{DeliveryStatus, TransitionError};

/// Errors that can occur during delivery operations.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// No delivery with this id exists.
    #[error("Delivery not found: {0}")]
    NotFound(DeliveryId),

    /// The state machine rejected a status change.
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    /// The order service reports that the order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order service could not be reached or failed.
    #[error("Order service unavailable: {0}")]
    OrderServiceUnavailable(String),

    /// The order already has a delivery.
    #[error("Order {order_id} already has delivery {delivery_id}")]
    DeliveryAlreadyExists {
        order_id: OrderId,
        delivery_id: DeliveryId,
    },

    /// The delivery changed between load and store.
    #[error("Delivery {delivery_id} was modified concurrently (expected status {expected}, found {actual})")]
    ConcurrentModification {
        delivery_id: DeliveryId,
        expected: DeliveryStatus,
        actual: DeliveryStatus,
    },

    /// Messaging error.
    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for delivery results.
pub type Result<T> = std::result::Result<T, DeliveryError>;
