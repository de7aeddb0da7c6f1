//! Topic and consumer group names shared by producers and consumers.

/// Carries [`DeliveryCreated`](crate::DeliveryCreated), keyed by order id.
pub const DELIVERY_CREATED: &str = "delivery-created";

/// Carries [`DeliveryStatusChanged`](crate::DeliveryStatusChanged), keyed by delivery id.
pub const DELIVERY_STATUS_CHANGED: &str = "delivery-status-changed";

/// Notifications raised by the delivery service, keyed by delivery id.
pub const DELIVERY_EVENTS: &str = "delivery-events";

/// Notifications raised by the order service, keyed by order id.
pub const ORDER_EVENTS: &str = "order-events";

/// Consumer group of the order service's delivery listeners.
pub const ORDER_SERVICE_GROUP: &str = "order-service-group";

/// Consumer group of the notification fan-in.
pub const NOTIFICATION_GROUP: &str = "notification-group";

const DEAD_LETTER_SUFFIX: &str = ".DLT";

/// Returns the dead-letter topic for `topic`.
pub fn dead_letter_topic(topic: &str) -> String {
    format!("{topic}{DEAD_LETTER_SUFFIX}")
}

/// Every topic that can receive dead letters, in a stable order.
pub fn dead_letter_topics() -> Vec<String> {
    [
        DELIVERY_CREATED,
        DELIVERY_STATUS_CHANGED,
        DELIVERY_EVENTS,
        ORDER_EVENTS,
    ]
    .into_iter()
    .map(dead_letter_topic)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dead_letter_names() {
        assert_eq!(dead_letter_topic(DELIVERY_CREATED), "delivery-created.DLT");
        assert_eq!(dead_letter_topics().len(), 4);
    }
}
