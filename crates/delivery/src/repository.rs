//! Delivery persistence.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{DeliveryId, OrderId};
use messaging::{OutboxMessage, OutboxStore, OutboxTable, PendingBatch};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{DeliveryError, Result};
use crate::model::Delivery;
use crate::state::DeliveryStatus;

/// Storage for delivery records.
///
/// Writes take the outbox rows produced by the change; an implementation
/// must store the entity and the rows atomically.
#[async_trait]
pub trait DeliveryRepository: Send + Sync {
    /// Allocates the next delivery id.
    async fn next_id(&self) -> Result<DeliveryId>;

    /// Stores a new delivery.
    ///
    /// Fails with [`DeliveryError::DeliveryAlreadyExists`] if the order
    /// already has a delivery; nothing is stored in that case.
    async fn insert(&self, delivery: Delivery, outbox: Vec<OutboxMessage>) -> Result<Delivery>;

    /// Replaces an existing delivery whose stored status is still
    /// `expected_status`.
    async fn update(
        &self,
        delivery: Delivery,
        expected_status: DeliveryStatus,
        outbox: Vec<OutboxMessage>,
    ) -> Result<Delivery>;

    async fn get(&self, delivery_id: DeliveryId) -> Result<Option<Delivery>>;

    /// Returns every delivery ordered by id.
    async fn list(&self) -> Result<Vec<Delivery>>;

    async fn find_by_order(&self, order_id: OrderId) -> Result<Option<Delivery>>;
}

#[derive(Debug, Default)]
struct RepositoryState {
    deliveries: BTreeMap<DeliveryId, Delivery>,
    last_id: i64,
    outbox: OutboxTable,
}

/// In-memory delivery repository with an embedded outbox.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDeliveryRepository {
    state: Arc<RwLock<RepositoryState>>,
}

impl InMemoryDeliveryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored deliveries.
    pub async fn delivery_count(&self) -> usize {
        self.state.read().await.deliveries.len()
    }

    /// Returns a copy of every unsent outbox row (for testing).
    pub async fn outbox_rows(&self) -> Vec<OutboxMessage> {
        self.state.read().await.outbox.rows()
    }
}

#[async_trait]
impl DeliveryRepository for InMemoryDeliveryRepository {
    async fn next_id(&self) -> Result<DeliveryId> {
        let mut state = self.state.write().await;
        state.last_id += 1;
        Ok(DeliveryId::new(state.last_id))
    }

    async fn insert(&self, delivery: Delivery, outbox: Vec<OutboxMessage>) -> Result<Delivery> {
        let mut state = self.state.write().await;

        if let Some(existing) = state
            .deliveries
            .values()
            .find(|d| d.order_id == delivery.order_id)
        {
            return Err(DeliveryError::DeliveryAlreadyExists {
                order_id: delivery.order_id,
                delivery_id: existing.delivery_id,
            });
        }

        state
            .deliveries
            .insert(delivery.delivery_id, delivery.clone());
        state.outbox.extend(outbox);
        Ok(delivery)
    }

    async fn update(
        &self,
        delivery: Delivery,
        expected_status: DeliveryStatus,
        outbox: Vec<OutboxMessage>,
    ) -> Result<Delivery> {
        let mut state = self.state.write().await;

        let slot = state
            .deliveries
            .get_mut(&delivery.delivery_id)
            .ok_or(DeliveryError::NotFound(delivery.delivery_id))?;
        if slot.status != expected_status {
            return Err(DeliveryError::ConcurrentModification {
                delivery_id: delivery.delivery_id,
                expected: expected_status,
                actual: slot.status,
            });
        }
        *slot = delivery.clone();
        state.outbox.extend(outbox);
        Ok(delivery)
    }

    async fn get(&self, delivery_id: DeliveryId) -> Result<Option<Delivery>> {
        Ok(self.state.read().await.deliveries.get(&delivery_id).cloned())
    }

    async fn list(&self) -> Result<Vec<Delivery>> {
        Ok(self.state.read().await.deliveries.values().cloned().collect())
    }

    async fn find_by_order(&self, order_id: OrderId) -> Result<Option<Delivery>> {
        Ok(self
            .state
            .read()
            .await
            .deliveries
            .values()
            .find(|d| d.order_id == order_id)
            .cloned())
    }
}

#[async_trait]
impl OutboxStore for InMemoryDeliveryRepository {
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
