//! Delivery service providing the operations exposed to clients.

use chrono::{DateTime, SecondsFormat, Utc};
use common::{DeliveryId, OrderId, RequestContext, RpcError, UserId};
use messaging::{
    DeliveryCreated, DeliveryStatusChanged, Notification, NotificationKind, OutboxMessage, topics,
};

use crate::clients::{OrderClient, OrderProjection, UserClient};
use crate::error::{DeliveryError, Result};
use crate::model::Delivery;
use crate::repository::DeliveryRepository;
use crate::state::DeliveryStatus;

/// Address used in notifications when the user service cannot supply one.
pub const UNKNOWN_EMAIL: &str = "unknown@example.com";

/// Owns delivery records and publishes their lifecycle events.
///
/// Every write stores the delivery and its outgoing events in one repository
/// operation; publishing is left to an outbox dispatcher.
pub struct DeliveryService<R, O, U>
where
    R: DeliveryRepository,
    O: OrderClient,
    U: UserClient,
{
    repository: R,
    orders: O,
    users: U,
}

impl<R, O, U> DeliveryService<R, O, U>
where
    R: DeliveryRepository,
    O: OrderClient,
    U: UserClient,
{
    pub fn new(repository: R, orders: O, users: U) -> Self {
        Self {
            repository,
            orders,
            users,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Creates a pending delivery for an existing order.
    ///
    /// The order is verified with the order service first; if it is missing
    /// or the service cannot answer, nothing is stored or emitted.
    #[tracing::instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id))]
    pub async fn create_delivery(
        &self,
        ctx: &RequestContext,
        order_id: OrderId,
        user_id: UserId,
        expected_delivery_at: Option<DateTime<Utc>>,
    ) -> Result<Delivery> {
        self.fetch_order(ctx, order_id).await?;

        if let Some(existing) = self.repository.find_by_order(order_id).await? {
            return Err(DeliveryError::DeliveryAlreadyExists {
                order_id,
                delivery_id: existing.delivery_id,
            });
        }

        let delivery_id = self.repository.next_id().await?;
        let delivery = Delivery::new(delivery_id, order_id, user_id, expected_delivery_at);
        let email = self.user_email(ctx, &delivery.user_id).await;

        let created = DeliveryCreated {
            order_id,
            delivery_id,
            status: delivery.status.as_str().to_string(),
            created_at: delivery.created_at,
        };
        let notification = Notification::new(
            NotificationKind::DeliveryCreated,
            delivery.user_id.clone(),
            format!(
                "Delivery for your order #{} is scheduled with Delivery ID: {}. Expected delivery: {}",
                order_id,
                delivery_id,
                delivery
                    .expected_delivery_at
                    .to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
        )
        .with_order(order_id)
        .with_delivery(delivery_id)
        .with_email(email)
        .with_status(delivery.status.as_str());

        let outbox = vec![
            OutboxMessage::for_event(topics::DELIVERY_CREATED, &created, ctx.correlation_id)?,
            OutboxMessage::for_event(topics::DELIVERY_EVENTS, &notification, ctx.correlation_id)?,
        ];
        let delivery = self.repository.insert(delivery, outbox).await?;

        metrics::counter!("deliveries_created_total").increment(1);
        tracing::info!(
            delivery_id = %delivery.delivery_id,
            order_id = %delivery.order_id,
            expected_delivery_at = %delivery.expected_delivery_at,
            "delivery created"
        );

        Ok(delivery)
    }

    /// Moves a delivery to `requested`.
    ///
    /// A transition the state machine rejects leaves the delivery unchanged
    /// and emits nothing.
    #[tracing::instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id))]
    pub async fn update_status(
        &self,
        ctx: &RequestContext,
        delivery_id: DeliveryId,
        requested: DeliveryStatus,
    ) -> Result<Delivery> {
        let mut delivery = self.load(delivery_id).await?;

        let previous = delivery.apply_status(requested).map_err(|e| {
            tracing::warn!(%delivery_id, current = %delivery.status, %requested, "status change rejected");
            DeliveryError::from(e)
        })?;
        let email = self.user_email(ctx, &delivery.user_id).await;

        let changed = DeliveryStatusChanged {
            delivery_id,
            order_id: delivery.order_id,
            old_status: previous.as_str().to_string(),
            new_status: requested.as_str().to_string(),
            changed_at: delivery.updated_at,
        };
        let notification = Notification::new(
            NotificationKind::DeliveryStatusChanged,
            delivery.user_id.clone(),
            format!(
                "Delivery status updated to: {} for Order #{}",
                requested, delivery.order_id
            ),
        )
        .with_order(delivery.order_id)
        .with_delivery(delivery_id)
        .with_email(email)
        .with_status(requested.as_str());

        let outbox = vec![
            OutboxMessage::for_event(
                topics::DELIVERY_STATUS_CHANGED,
                &changed,
                ctx.correlation_id,
            )?,
            OutboxMessage::for_event(topics::DELIVERY_EVENTS, &notification, ctx.correlation_id)?,
        ];
        let delivery = self.repository.update(delivery, previous, outbox).await?;

        metrics::counter!(
            "delivery_status_changes_total",
            "from" => previous.as_str(),
            "to" => requested.as_str()
        )
        .increment(1);
        tracing::info!(%delivery_id, from = %previous, to = %requested, "delivery status updated");

        Ok(delivery)
    }

    #[tracing::instrument(skip(self))]
    pub async fn find_by_id(&self, delivery_id: DeliveryId) -> Result<Delivery> {
        self.load(delivery_id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn find_all(&self) -> Result<Vec<Delivery>> {
        self.repository.list().await
    }

    /// Returns the order a delivery belongs to, read through from the order
    /// service.
    #[tracing::instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id))]
    pub async fn find_order_by_delivery_id(
        &self,
        ctx: &RequestContext,
        delivery_id: DeliveryId,
    ) -> Result<OrderProjection> {
        let delivery = self.load(delivery_id).await?;
        self.fetch_order(ctx, delivery.order_id).await
    }

    async fn load(&self, delivery_id: DeliveryId) -> Result<Delivery> {
        self.repository
            .get(delivery_id)
            .await?
            .ok_or(DeliveryError::NotFound(delivery_id))
    }

    async fn fetch_order(&self, ctx: &RequestContext, order_id: OrderId) -> Result<OrderProjection> {
        self.orders
            .get_order(ctx, order_id)
            .await
            .map_err(|e| match e {
                RpcError::NotFound(_) => DeliveryError::OrderNotFound(order_id),
                RpcError::Unavailable(reason) => {
                    tracing::warn!(%order_id, %reason, "order service unavailable");
                    DeliveryError::OrderServiceUnavailable(reason)
                }
            })
    }

    /// Looks up the user's email, degrading to [`UNKNOWN_EMAIL`].
    async fn user_email(&self, ctx: &RequestContext, user_id: &UserId) -> String {
        match self.users.get_user(ctx, user_id).await {
            Ok(user) => match user.email.filter(|e| !e.trim().is_empty()) {
                Some(email) => email,
                None => {
                    tracing::warn!(%user_id, "user has no email");
                    UNKNOWN_EMAIL.to_string()
                }
            },
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "user lookup failed");
                UNKNOWN_EMAIL.to_string()
            }
        }
    }
}
