//! Wire contracts exchanged between services.
//!
//! Statuses travel as their string names so consumers do not need the
//! producer's types. Field names are camelCase on the wire.

use chrono::{DateTime, Utc};
use common::{DeliveryId, OrderId, UserId};
use serde::{Deserialize, Serialize};

use crate::Message;

/// Status name a delivery reports once it has reached the customer.
pub const DELIVERED_STATUS: &str = "DELIVERED";

/// An event published between services.
pub trait IntegrationEvent: Serialize {
    /// Returns the type name carried in the record's `event_type`.
    fn event_type(&self) -> &'static str;

    /// Returns the routing key. Events about one entity share a key and so
    /// stay ordered on one partition.
    fn key(&self) -> String;

    /// Serializes the event into a publishable message.
    fn to_message(&self) -> Result<Message, serde_json::Error> {
        Message::from_event(self.key(), self.event_type(), self)
    }
}

/// A delivery was created for an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryCreated {
    pub order_id: OrderId,
    pub delivery_id: DeliveryId,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl IntegrationEvent for DeliveryCreated {
    fn event_type(&self) -> &'static str {
        "DeliveryCreated"
    }

    fn key(&self) -> String {
        self.order_id.to_string()
    }
}

/// A delivery moved from one status to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStatusChanged {
    pub delivery_id: DeliveryId,
    pub order_id: OrderId,
    pub old_status: String,
    pub new_status: String,
    pub changed_at: DateTime<Utc>,
}

impl DeliveryStatusChanged {
    /// Returns true if the delivery reached the customer.
    pub fn is_delivered(&self) -> bool {
        self.new_status == DELIVERED_STATUS
    }
}

impl IntegrationEvent for DeliveryStatusChanged {
    fn event_type(&self) -> &'static str {
        "DeliveryStatusChanged"
    }

    fn key(&self) -> String {
        self.delivery_id.to_string()
    }
}

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    OrderCreated,
    OrderUpdated,
    DeliveryCreated,
    DeliveryStatusChanged,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::OrderCreated => "ORDER_CREATED",
            NotificationKind::OrderUpdated => "ORDER_UPDATED",
            NotificationKind::DeliveryCreated => "DELIVERY_CREATED",
            NotificationKind::DeliveryStatusChanged => "DELIVERY_STATUS_CHANGED",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user-facing notification, shared by every producing service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub event_type: NotificationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_id: Option<DeliveryId>,
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// Creates a notification with no entity references.
    pub fn new(event_type: NotificationKind, user_id: UserId, message: impl Into<String>) -> Self {
        Self {
            event_type,
            order_id: None,
            delivery_id: None,
            user_id,
            user_email: None,
            message: message.into(),
            status: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_order(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_delivery(mut self, delivery_id: DeliveryId) -> Self {
        self.delivery_id = Some(delivery_id);
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.user_email = Some(email.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

impl IntegrationEvent for Notification {
    fn event_type(&self) -> &'static str {
        self.event_type.as_str()
    }

    /// Delivery notifications are keyed by delivery id, order notifications
    /// by order id.
    fn key(&self) -> String {
        match (self.delivery_id, self.order_id) {
            (Some(delivery_id), _) => delivery_id.to_string(),
            (None, Some(order_id)) => order_id.to_string(),
            (None, None) => self.user_id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_created_uses_camel_case_and_order_key() {
        let event = DeliveryCreated {
            order_id: OrderId::new(100),
            delivery_id: DeliveryId::new(7),
            status: "PENDING".to_string(),
            created_at: Utc::now(),
        };

        let message = event.to_message().unwrap();
        assert_eq!(message.key, "100");
        assert_eq!(message.event_type, "DeliveryCreated");
        assert_eq!(message.payload["orderId"], 100);
        assert_eq!(message.payload["deliveryId"], 7);
        assert_eq!(message.payload["status"], "PENDING");
    }

    #[test]
    fn status_change_is_keyed_by_delivery() {
        let event = DeliveryStatusChanged {
            delivery_id: DeliveryId::new(7),
            order_id: OrderId::new(100),
            old_status: "SHIPPED".to_string(),
            new_status: DELIVERED_STATUS.to_string(),
            changed_at: Utc::now(),
        };

        assert_eq!(event.key(), "7");
        assert!(event.is_delivered());
    }

    #[test]
    fn notification_key_prefers_delivery_then_order() {
        let base = Notification::new(NotificationKind::OrderCreated, UserId::new("u-1"), "hi");
        assert_eq!(base.key(), "u-1");

        let order = base.clone().with_order(OrderId::new(100));
        assert_eq!(order.key(), "100");

        let delivery = order.with_delivery(DeliveryId::new(7));
        assert_eq!(delivery.key(), "7");
    }

    #[test]
    fn notification_event_type_uses_kind_name() {
        let notification = Notification::new(
            NotificationKind::DeliveryStatusChanged,
            UserId::new("u-1"),
            "Delivery status updated to: SHIPPED for Order #100",
        )
        .with_order(OrderId::new(100))
        .with_delivery(DeliveryId::new(7))
        .with_status("SHIPPED");

        let message = notification.to_message().unwrap();
        assert_eq!(message.event_type, "DELIVERY_STATUS_CHANGED");
        assert_eq!(message.payload["eventType"], "DELIVERY_STATUS_CHANGED");
        assert_eq!(message.payload["userId"], "u-1");

        let decoded: Notification = serde_json::from_value(message.payload).unwrap();
        assert_eq!(decoded, notification);
    }
}
