//! The delivery record.

use chrono::{DateTime, Duration, Utc};
use common::{DeliveryId, OrderId, UserId};
use serde::{Deserialize, Serialize};

use crate::state::{DeliveryStatus, TransitionError, transition};

/// Days between creation and the expected delivery date when the caller
/// does not choose one.
pub const DEFAULT_DELIVERY_WINDOW_DAYS: i64 = 5;

/// A delivery of one order to one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub delivery_id: DeliveryId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub status: DeliveryStatus,
    pub expected_delivery_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Delivery {
    /// Creates a pending delivery.
    pub fn new(
        delivery_id: DeliveryId,
        order_id: OrderId,
        user_id: UserId,
        expected_delivery_at: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            delivery_id,
            order_id,
            user_id,
            status: DeliveryStatus::Pending,
            expected_delivery_at: expected_delivery_at
                .unwrap_or(now + Duration::days(DEFAULT_DELIVERY_WINDOW_DAYS)),
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the delivery to `requested` if the state machine allows it.
    ///
    /// Returns the previous status. On error the delivery is unchanged.
    pub fn apply_status(
        &mut self,
        requested: DeliveryStatus,
    ) -> Result<DeliveryStatus, TransitionError> {
        let next = transition(self.status, requested)?;
        let previous = self.status;
        self.status = next;
        self.updated_at = Utc::now();
        Ok(previous)
    }
}
