//! Order service error types.

use common::{DeliveryId, OrderId, ProductId, RpcError};
use messaging::MessagingError;
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// No order with this id exists.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// An order needs at least one line item.
    #[error("Order must have at least one item")]
    EmptyOrder,

    /// A line item asked for zero units.
    #[error("Quantity for product {0} must be at least 1")]
    InvalidQuantity(ProductId),

    /// Pricing a line item failed; nothing was stored.
    #[error("Failed to fetch product details for product ID: {product_id}: {source}")]
    ProductService {
        product_id: ProductId,
        #[source]
        source: RpcError,
    },

    /// The order exists but no delivery has been linked to it yet.
    #[error("No delivery assigned to order {0} yet")]
    DeliveryNotAssigned(OrderId),

    /// The linked delivery does not exist in the delivery service.
    #[error("Delivery not found: {0}")]
    DeliveryNotFound(DeliveryId),

    /// The delivery service could not be reached or failed.
    #[error("Delivery service unavailable: {0}")]
    DeliveryServiceUnavailable(String),

    /// The order is already linked to a different delivery.
    #[error("Order {order_id} is already linked to delivery {existing}, refusing {attempted}")]
    DeliveryAlreadyLinked {
        order_id: OrderId,
        existing: DeliveryId,
        attempted: DeliveryId,
    },

    /// A delivery reported as delivered is not the one linked to the order.
    #[error("Order {order_id} is linked to delivery {linked}, but delivery {reported} reported it delivered")]
    DeliveryMismatch {
        order_id: OrderId,
        linked: DeliveryId,
        reported: DeliveryId,
    },

    /// Delivered orders can no longer be changed.
    #[error("Order {0} has been delivered and can no longer be updated")]
    AlreadyDelivered(OrderId),

    /// The order changed between load and store.
    #[error("Order {order_id} was modified concurrently (expected version {expected}, found {actual})")]
    ConcurrentModification {
        order_id: OrderId,
        expected: u64,
        actual: u64,
    },

    /// Messaging error.
    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for order results.
pub type Result<T> = std::result::Result<T, OrderError>;
