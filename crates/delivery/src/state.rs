//! Delivery status state machine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The status of a delivery in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► Shipped ──► Delivered
///    │           │
///    └───────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    /// Created, not yet handed to a carrier.
    #[default]
    Pending,

    /// On its way to the customer.
    Shipped,

    /// Reached the customer (terminal state).
    Delivered,

    /// Abandoned before delivery (terminal state).
    Cancelled,
}

impl DeliveryStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [DeliveryStatus; 4] = [
        DeliveryStatus::Pending,
        DeliveryStatus::Shipped,
        DeliveryStatus::Delivered,
        DeliveryStatus::Cancelled,
    ];

    /// Returns true if `next` is a legal successor of this status.
    pub fn can_transition_to(&self, next: DeliveryStatus) -> bool {
        use DeliveryStatus::*;
        matches!(
            (*self, next),
            (Pending, Shipped) | (Pending, Cancelled) | (Shipped, Delivered) | (Shipped, Cancelled)
        )
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Cancelled)
    }

    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "PENDING",
            DeliveryStatus::Shipped => "SHIPPED",
            DeliveryStatus::Delivered => "DELIVERED",
            DeliveryStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when a status name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown delivery status: {0}")]
pub struct UnknownStatus(pub String);

impl std::str::FromStr for DeliveryStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeliveryStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// A rejected status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Illegal delivery status transition from {current} to {requested}")]
    IllegalTransition {
        current: DeliveryStatus,
        requested: DeliveryStatus,
    },
}

/// Validates a status change and returns the status to persist.
///
/// Pure: the caller is responsible for storing the result.
pub fn transition(
    current: DeliveryStatus,
    requested: DeliveryStatus,
) -> Result<DeliveryStatus, TransitionError> {
    if current.can_transition_to(requested) {
        Ok(requested)
    } else {
        Err(TransitionError::IllegalTransition { current, requested })
    }
}
