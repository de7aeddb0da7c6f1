//! The order record and its value types.

use chrono::{DateTime, Utc};
use common::{DeliveryId, Money, OrderId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::{OrderError, Result};

/// The status of an order.
///
/// Orders are created `Pending`; only the delivery synchronization consumer
/// moves them to `Delivered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Pending,
    Delivered,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Delivered => "DELIVERED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMode {
    CashOnDelivery,
    Card,
    Upi,
    NetBanking,
}

/// A requested line item, before pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl ItemRequest {
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// A priced line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ProductId,
    pub quantity: u32,

    /// Product price at the time the order was priced.
    pub unit_price: Money,
}

impl OrderItem {
    /// Returns the line total (unit_price * quantity).
    pub fn total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// Outcome of linking a delivery to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// The delivery id was recorded.
    Linked,
    /// The order already carried this delivery id.
    AlreadyLinked,
}

/// A customer order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount: Money,
    pub payment_mode: PaymentMode,
    pub paid: bool,
    pub status: OrderStatus,
    pub delivery_id: Option<DeliveryId>,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Incremented by every stored change.
    pub version: u64,
}

impl Order {
    /// Creates a pending, unpaid order with no delivery.
    pub fn new(
        order_id: OrderId,
        user_id: UserId,
        payment_mode: PaymentMode,
        items: Vec<OrderItem>,
    ) -> Self {
        let now = Utc::now();
        Self {
            order_id,
            user_id,
            amount: total_of(&items),
            payment_mode,
            paid: false,
            status: OrderStatus::Pending,
            delivery_id: None,
            items,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Replaces the line items and payment mode, recomputing the amount.
    pub fn replace_items(&mut self, payment_mode: PaymentMode, items: Vec<OrderItem>) -> Result<()> {
        if self.status == OrderStatus::Delivered {
            return Err(OrderError::AlreadyDelivered(self.order_id));
        }
        self.amount = total_of(&items);
        self.items = items;
        self.payment_mode = payment_mode;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Records the delivery for this order.
    ///
    /// The delivery id is set at most once: the same id again is a no-op,
    /// a different id is rejected.
    pub fn link_delivery(&mut self, delivery_id: DeliveryId) -> Result<LinkOutcome> {
        match self.delivery_id {
            None => {
                self.delivery_id = Some(delivery_id);
                self.updated_at = Utc::now();
                Ok(LinkOutcome::Linked)
            }
            Some(existing) if existing == delivery_id => Ok(LinkOutcome::AlreadyLinked),
            Some(existing) => Err(OrderError::DeliveryAlreadyLinked {
                order_id: self.order_id,
                existing,
                attempted: delivery_id,
            }),
        }
    }

    /// Marks the order delivered. Returns false if it already was.
    pub fn mark_delivered(&mut self) -> bool {
        if self.status == OrderStatus::Delivered {
            return false;
        }
        self.status = OrderStatus::Delivered;
        self.updated_at = Utc::now();
        true
    }
}

fn total_of(items: &[OrderItem]) -> Money {
    items.iter().map(OrderItem::total).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(product: i64, quantity: u32, cents: i64) -> OrderItem {
        OrderItem {
            product_id: ProductId::new(product),
            quantity,
            unit_price: Money::from_cents(cents),
        }
    }

    fn order() -> Order {
        Order::new(
            OrderId::new(100),
            UserId::new("u-1"),
            PaymentMode::Card,
            vec![item(1, 2, 1000), item(2, 1, 2500)],
        )
    }

    #[test]
    fn test_new_order_is_pending_unpaid_and_priced() {
        let order = order();
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(!order.paid);
        assert_eq!(order.delivery_id, None);
        assert_eq!(order.amount, Money::from_cents(4500));
    }

    #[test]
    fn test_link_delivery_is_set_at_most_once() {
        let mut order = order();
        assert_eq!(
            order.link_delivery(DeliveryId::new(7)).unwrap(),
            LinkOutcome::Linked
        );
        assert_eq!(
            order.link_delivery(DeliveryId::new(7)).unwrap(),
            LinkOutcome::AlreadyLinked
        );

        let conflict = order.link_delivery(DeliveryId::new(8));
        assert!(matches!(
            conflict,
            Err(OrderError::DeliveryAlreadyLinked { existing, attempted, .. })
                if existing == DeliveryId::new(7) && attempted == DeliveryId::new(8)
        ));
        assert_eq!(order.delivery_id, Some(DeliveryId::new(7)));
    }

    #[test]
    fn test_mark_delivered_reports_change_once() {
        let mut order = order();
        assert!(order.mark_delivered());
        assert!(!order.mark_delivered());
        assert_eq!(order.status, OrderStatus::Delivered);
    }

    #[test]
    fn test_replace_items_recomputes_amount() {
        let mut order = order();
        order
            .replace_items(PaymentMode::Upi, vec![item(3, 3, 150)])
            .unwrap();
        assert_eq!(order.amount, Money::from_cents(450));
        assert_eq!(order.payment_mode, PaymentMode::Upi);
        assert_eq!(order.items.len(), 1);
    }

    #[test]
    fn test_delivered_order_cannot_be_replaced() {
        let mut order = order();
        order.mark_delivered();
        let before = order.clone();

        let result = order.replace_items(PaymentMode::Upi, vec![item(3, 1, 100)]);
        assert!(matches!(result, Err(OrderError::AlreadyDelivered(_))));
        assert_eq!(order, before);
    }

    #[test]
    fn test_serializes_with_wire_names() {
        let json = serde_json::to_value(order()).unwrap();
        assert_eq!(json["orderId"], 100);
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["paymentMode"], "CARD");
        assert_eq!(json["items"][0]["productId"], 1);
    }
}
