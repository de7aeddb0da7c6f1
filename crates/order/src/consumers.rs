//! Consumers projecting delivery events onto orders.
//!
//! Both handlers are idempotent. A redelivered `DeliveryCreated` finds the
//! delivery already linked and a redelivered `DELIVERED` finds the order
//! already delivered; neither stores anything the second time.

use async_trait::async_trait;
use messaging::{DeliveryCreated, DeliveryStatusChanged, HandlerError, MessageHandler, Record};

use crate::error::OrderError;
use crate::model::LinkOutcome;
use crate::repository::OrderRepository;

impl From<OrderError> for HandlerError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::DeliveryAlreadyLinked { .. }
            | OrderError::DeliveryMismatch { .. }
            | OrderError::Serialization(_) => HandlerError::permanent(err.to_string()),
            // A missing order may still be created, and a concurrent writer
            // means the next attempt reloads fresh state.
            _ => HandlerError::retryable(err.to_string()),
        }
    }
}

/// Links newly created deliveries to their orders.
pub struct DeliveryCreatedHandler<R: OrderRepository> {
    repository: R,
}

impl<R: OrderRepository> DeliveryCreatedHandler<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl<R: OrderRepository> MessageHandler for DeliveryCreatedHandler<R> {
    fn name(&self) -> &'static str {
        "delivery-created"
    }

    #[tracing::instrument(
        skip(self, record),
        fields(
            topic = %record.topic,
            partition = record.partition,
            offset = %record.offset,
            correlation_id = ?record.correlation_id()
        )
    )]
    async fn handle(&self, record: &Record) -> Result<(), HandlerError> {
        let event: DeliveryCreated = record.decode()?;
        let order_id = event.order_id;

        let mut order = self.repository.get(order_id).await?.ok_or_else(|| {
            tracing::warn!(%order_id, delivery_id = %event.delivery_id, "order not found for delivery");
            HandlerError::from(OrderError::NotFound(order_id))
        })?;

        match order.link_delivery(event.delivery_id)? {
            LinkOutcome::AlreadyLinked => {
                tracing::debug!(%order_id, delivery_id = %event.delivery_id, "delivery already linked");
            }
            LinkOutcome::Linked => {
                self.repository.update(order, Vec::new()).await?;
                tracing::info!(%order_id, delivery_id = %event.delivery_id, "delivery linked to order");
            }
        }
        Ok(())
    }
}

/// Marks orders delivered when their delivery reaches `DELIVERED`.
///
/// Other statuses are acknowledged without touching the order; the delivery
/// service owns the state machine.
pub struct DeliveryStatusChangedHandler<R: OrderRepository> {
    repository: R,
}

impl<R: OrderRepository> DeliveryStatusChangedHandler<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl<R: OrderRepository> MessageHandler for DeliveryStatusChangedHandler<R> {
    fn name(&self) -> &'static str {
        "delivery-status-changed"
    }

    #[tracing::instrument(
        skip(self, record),
        fields(
            topic = %record.topic,
            partition = record.partition,
            offset = %record.offset,
            correlation_id = ?record.correlation_id()
        )
    )]
    async fn handle(&self, record: &Record) -> Result<(), HandlerError> {
        let event: DeliveryStatusChanged = record.decode()?;
        if !event.is_delivered() {
            tracing::debug!(
                delivery_id = %event.delivery_id,
                new_status = %event.new_status,
                "status change does not affect order"
            );
            return Ok(());
        }

        let order_id = event.order_id;
        let mut order = self.repository.get(order_id).await?.ok_or_else(|| {
            tracing::warn!(%order_id, delivery_id = %event.delivery_id, "order not found for delivered status");
            HandlerError::from(OrderError::NotFound(order_id))
        })?;

        // Unlinked orders are accepted: DeliveryCreated travels on another
        // topic and may still be in flight.
        if let Some(linked) = order.delivery_id.filter(|id| *id != event.delivery_id) {
            tracing::warn!(
                %order_id,
                linked_delivery_id = %linked,
                reported_delivery_id = %event.delivery_id,
                "delivered status from a delivery not linked to the order"
            );
            return Err(OrderError::DeliveryMismatch {
                order_id,
                linked,
                reported: event.delivery_id,
            }
            .into());
        }

        if order.mark_delivered() {
            self.repository.update(order, Vec::new()).await?;
            tracing::info!(%order_id, delivery_id = %event.delivery_id, "order marked delivered");
        } else {
            tracing::debug!(%order_id, "order already delivered");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Order, OrderStatus, PaymentMode};
    use crate::repository::InMemoryOrderRepository;
    use chrono::Utc;
    use common::{DeliveryId, OrderId, UserId};
    use messaging::{IntegrationEvent, Offset};
    use std::collections::BTreeMap;

    fn record_for<E: IntegrationEvent>(topic: &str, event: &E) -> Record {
        let message = event.to_message().unwrap();
        Record {
            topic: topic.to_string(),
            partition: 0,
            offset: Offset::initial(),
            key: message.key,
            event_type: message.event_type,
            payload: message.payload,
            headers: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    async fn repo_with_order() -> InMemoryOrderRepository {
        let repo = InMemoryOrderRepository::new();
        let order = Order::new(OrderId::new(1), UserId::new("u-1"), PaymentMode::Card, vec![]);
        repo.insert(order, vec![]).await.unwrap();
        repo
    }

    fn created(order: i64, delivery: i64) -> DeliveryCreated {
        DeliveryCreated {
            order_id: OrderId::new(order),
            delivery_id: DeliveryId::new(delivery),
            status: "PENDING".to_string(),
            created_at: Utc::now(),
        }
    }

    fn status_changed(old: &str, new: &str) -> DeliveryStatusChanged {
        DeliveryStatusChanged {
            delivery_id: DeliveryId::new(7),
            order_id: OrderId::new(1),
            old_status: old.to_string(),
            new_status: new.to_string(),
            changed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_delivery_created_twice_links_once() {
        let repo = repo_with_order().await;
        let handler = DeliveryCreatedHandler::new(repo.clone());
        let record = record_for("delivery-created", &created(1, 7));

        handler.handle(&record).await.unwrap();
        handler.handle(&record).await.unwrap();

        let order = repo.get(OrderId::new(1)).await.unwrap().unwrap();
        assert_eq!(order.delivery_id, Some(DeliveryId::new(7)));
        assert_eq!(repo.update_count().await, 1);
    }

    #[tokio::test]
    async fn test_delivery_created_for_missing_order_is_retryable() {
        let repo = InMemoryOrderRepository::new();
        let handler = DeliveryCreatedHandler::new(repo);
        let record = record_for("delivery-created", &created(404, 7));

        let err = handler.handle(&record).await.unwrap_err();
        assert!(!err.is_permanent());
    }

    #[tokio::test]
    async fn test_conflicting_delivery_id_is_permanent() {
        let repo = repo_with_order().await;
        let handler = DeliveryCreatedHandler::new(repo.clone());
        handler
            .handle(&record_for("delivery-created", &created(1, 7)))
            .await
            .unwrap();

        let err = handler
            .handle(&record_for("delivery-created", &created(1, 8)))
            .await
            .unwrap_err();
        assert!(err.is_permanent());

        let order = repo.get(OrderId::new(1)).await.unwrap().unwrap();
        assert_eq!(order.delivery_id, Some(DeliveryId::new(7)));
    }

    #[tokio::test]
    async fn test_non_delivered_status_is_acknowledged_without_change() {
        let repo = repo_with_order().await;
        let handler = DeliveryStatusChangedHandler::new(repo.clone());

        handler
            .handle(&record_for(
                "delivery-status-changed",
                &status_changed("PENDING", "SHIPPED"),
            ))
            .await
            .unwrap();

        let order = repo.get(OrderId::new(1)).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(repo.update_count().await, 0);
    }

    #[tokio::test]
    async fn test_delivered_status_marks_order_once() {
        let repo = repo_with_order().await;
        let handler = DeliveryStatusChangedHandler::new(repo.clone());
        let record = record_for(
            "delivery-status-changed",
            &status_changed("SHIPPED", "DELIVERED"),
        );

        handler.handle(&record).await.unwrap();
        handler.handle(&record).await.unwrap();

        let order = repo.get(OrderId::new(1)).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Delivered);
        assert_eq!(repo.update_count().await, 1);
    }

    #[tokio::test]
    async fn test_delivered_status_from_unlinked_delivery_is_permanent() {
        let repo = repo_with_order().await;
        DeliveryCreatedHandler::new(repo.clone())
            .handle(&record_for("delivery-created", &created(1, 8)))
            .await
            .unwrap();
        let handler = DeliveryStatusChangedHandler::new(repo.clone());

        let err = handler
            .handle(&record_for(
                "delivery-status-changed",
                &status_changed("SHIPPED", "DELIVERED"),
            ))
            .await
            .unwrap_err();
        assert!(err.is_permanent());

        let order = repo.get(OrderId::new(1)).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.delivery_id, Some(DeliveryId::new(8)));
    }

    #[tokio::test]
    async fn test_delivered_status_from_linked_delivery_marks_order() {
        let repo = repo_with_order().await;
        DeliveryCreatedHandler::new(repo.clone())
            .handle(&record_for("delivery-created", &created(1, 7)))
            .await
            .unwrap();

        DeliveryStatusChangedHandler::new(repo.clone())
            .handle(&record_for(
                "delivery-status-changed",
                &status_changed("SHIPPED", "DELIVERED"),
            ))
            .await
            .unwrap();

        let order = repo.get(OrderId::new(1)).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Delivered);
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_permanent() {
        let repo = repo_with_order().await;
        let handler = DeliveryStatusChangedHandler::new(repo);
        let mut record = record_for(
            "delivery-status-changed",
            &status_changed("SHIPPED", "DELIVERED"),
        );
        record.payload = serde_json::json!({"unexpected": true});

        let err = handler.handle(&record).await.unwrap_err();
        assert!(err.is_permanent());
    }
}
