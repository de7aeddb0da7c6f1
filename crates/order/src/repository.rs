//! Order persistence.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OrderId;
use messaging::{OutboxMessage, OutboxStore, OutboxTable, PendingBatch};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{OrderError, Result};
use crate::model::Order;

/// Storage for orders.
///
/// Writes are optimistic: `update` succeeds only if the stored order still
/// has the version the caller loaded, and bumps it. Outbox rows are stored
/// atomically with the order.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Allocates the next order id.
    async fn next_id(&self) -> Result<OrderId>;

    async fn insert(&self, order: Order, outbox: Vec<OutboxMessage>) -> Result<Order>;

    /// Stores `order` if its version matches the stored one. Returns the
    /// order with its new version.
    async fn update(&self, order: Order, outbox: Vec<OutboxMessage>) -> Result<Order>;

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Returns every order ordered by id.
    async fn list(&self) -> Result<Vec<Order>>;
}

#[derive(Debug, Default)]
struct RepositoryState {
    orders: BTreeMap<OrderId, Order>,
    last_id: i64,
    outbox: OutboxTable,
    updates: usize,
}

/// In-memory order repository with an embedded outbox.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderRepository {
    state: Arc<RwLock<RepositoryState>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns how many updates have been stored (for testing).
    pub async fn update_count(&self) -> usize {
        self.state.read().await.updates
    }

    /// Returns a copy of every unsent outbox row (for testing).
    pub async fn outbox_rows(&self) -> Vec<OutboxMessage> {
        self.state.read().await.outbox.rows()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn next_id(&self) -> Result<OrderId> {
        let mut state = self.state.write().await;
        state.last_id += 1;
        Ok(OrderId::new(state.last_id))
    }

    async fn insert(&self, order: Order, outbox: Vec<OutboxMessage>) -> Result<Order> {
        let mut state = self.state.write().await;
        state.orders.insert(order.order_id, order.clone());
        state.outbox.extend(outbox);
        Ok(order)
    }

    async fn update(&self, mut order: Order, outbox: Vec<OutboxMessage>) -> Result<Order> {
        let mut state = self.state.write().await;

        let stored = state
            .orders
            .get_mut(&order.order_id)
            .ok_or(OrderError::NotFound(order.order_id))?;
        if stored.version != order.version {
            return Err(OrderError::ConcurrentModification {
                order_id: order.order_id,
                expected: order.version,
                actual: stored.version,
            });
        }

        order.version += 1;
        *stored = order.clone();
        state.outbox.extend(outbox);
        state.updates += 1;
        Ok(order)
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&order_id).cloned())
    }

    async fn list(&self) -> Result<Vec<Order>> {
        Ok(self.state.read().await.orders.values().cloned().collect())
    }
}

#[async_trait]
impl OutboxStore for InMemoryOrderRepository {
    async fn pending(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> messaging::Result<PendingBatch> {
        Ok(self.state.read().await.outbox.pending(limit, now))
    }

    async fn mark_sent(&self, id: Uuid) -> messaging::Result<()> {
        self.state.write().await.outbox.mark_sent(id)
    }

    async fn record_failure(
        &self,
        id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> messaging::Result<()> {
        self.state
            .write()
            .await
            .outbox
            .record_failure(id, error, next_attempt_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PaymentMode;
    use common::{DeliveryId, UserId};

    async fn stored_order(repo: &InMemoryOrderRepository) -> Order {
        let id = repo.next_id().await.unwrap();
        let order = Order::new(id, UserId::new("u-1"), PaymentMode::Card, vec![]);
        repo.insert(order, vec![]).await.unwrap()
    }

    #[tokio::test]
    async fn update_bumps_version() {
        let repo = InMemoryOrderRepository::new();
        let mut order = stored_order(&repo).await;

        order.link_delivery(DeliveryId::new(7)).unwrap();
        let updated = repo.update(order, vec![]).await.unwrap();

        assert_eq!(updated.version, 1);
        assert_eq!(repo.get(updated.order_id).await.unwrap(), Some(updated));
        assert_eq!(repo.update_count().await, 1);
    }

    #[tokio::test]
    async fn stale_update_is_rejected() {
        let repo = InMemoryOrderRepository::new();
        let order = stored_order(&repo).await;

        let mut first = order.clone();
        first.mark_delivered();
        repo.update(first, vec![]).await.unwrap();

        let mut stale = order;
        stale.link_delivery(DeliveryId::new(7)).unwrap();
        let result = repo.update(stale, vec![]).await;

        assert!(matches!(
            result,
            Err(OrderError::ConcurrentModification {
                expected: 0,
                actual: 1,
                ..
            })
        ));
        let stored = repo.get(OrderId::new(1)).await.unwrap().unwrap();
        assert_eq!(stored.delivery_id, None);
    }

    #[tokio::test]
    async fn update_of_unknown_order_fails() {
        let repo = InMemoryOrderRepository::new();
        let order = Order::new(OrderId::new(9), UserId::new("u-1"), PaymentMode::Card, vec![]);

        let result = repo.update(order, vec![]).await;
        assert!(matches!(result, Err(OrderError::NotFound(_))));
    }
}
