//! Order service providing the operations exposed to clients.

use common::{DeliveryId, OrderId, RequestContext, RpcError};
use messaging::{Notification, NotificationKind, OutboxMessage, topics};

use crate::clients::{DeliveryClient, DeliveryProjection, ProductClient};
use crate::error::{OrderError, Result};
use crate::model::{ItemRequest, Order, OrderItem, OrderStatus, PaymentMode};
use crate::repository::OrderRepository;

/// Owns order records.
///
/// `delivery_id` and the `Delivered` status are never written here: they
/// are projected from delivery events by the consumers in [`crate::consumers`].
pub struct OrderService<R, P, D>
where
    R: OrderRepository,
    P: ProductClient,
    D: DeliveryClient,
{
    repository: R,
    products: P,
    deliveries: D,
}

impl<R, P, D> OrderService<R, P, D>
where
    R: OrderRepository,
    P: ProductClient,
    D: DeliveryClient,
{
    pub fn new(repository: R, products: P, deliveries: D) -> Self {
        Self {
            repository,
            products,
            deliveries,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Prices the items and stores a pending order for the caller.
    ///
    /// If any product lookup fails nothing is stored or emitted.
    #[tracing::instrument(skip(self, ctx, items), fields(correlation_id = %ctx.correlation_id, items = items.len()))]
    pub async fn create_order(
        &self,
        ctx: &RequestContext,
        items: Vec<ItemRequest>,
        payment_mode: PaymentMode,
    ) -> Result<Order> {
        let items = self.price_items(ctx, &items).await?;

        let order_id = self.repository.next_id().await?;
        let order = Order::new(order_id, ctx.identity.user_id().clone(), payment_mode, items);

        let notification = Notification::new(
            NotificationKind::OrderCreated,
            order.user_id.clone(),
            format!(
                "Order created successfully with ID: {}. Total amount: {}",
                order_id, order.amount
            ),
        )
        .with_order(order_id)
        .with_status(order.status.as_str());
        let outbox = vec![OutboxMessage::for_event(
            topics::ORDER_EVENTS,
            &notification,
            ctx.correlation_id,
        )?];
        let order = self.repository.insert(order, outbox).await?;

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(%order_id, amount = %order.amount, user_id = %order.user_id, "order created");

        Ok(order)
    }

    /// Replaces the items of an order, repricing them.
    ///
    /// Delivered orders are rejected.
    #[tracing::instrument(skip(self, ctx, items), fields(correlation_id = %ctx.correlation_id))]
    pub async fn update_order(
        &self,
        ctx: &RequestContext,
        order_id: OrderId,
        items: Vec<ItemRequest>,
        payment_mode: PaymentMode,
    ) -> Result<Order> {
        let mut order = self.load(order_id).await?;
        if order.status == OrderStatus::Delivered {
            return Err(OrderError::AlreadyDelivered(order_id));
        }

        let items = self.price_items(ctx, &items).await?;
        order.replace_items(payment_mode, items)?;

        let notification = Notification::new(
            NotificationKind::OrderUpdated,
            order.user_id.clone(),
            format!(
                "Order #{} has been updated. New total amount: {}",
                order_id, order.amount
            ),
        )
        .with_order(order_id)
        .with_status(order.status.as_str());
        let outbox = vec![OutboxMessage::for_event(
            topics::ORDER_EVENTS,
            &notification,
            ctx.correlation_id,
        )?];
        let order = self.repository.update(order, outbox).await?;

        tracing::info!(%order_id, amount = %order.amount, version = order.version, "order updated");
        Ok(order)
    }

    #[tracing::instrument(skip(self))]
    pub async fn find_order_by_id(&self, order_id: OrderId) -> Result<Order> {
        self.load(order_id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn find_all_orders(&self) -> Result<Vec<Order>> {
        self.repository.list().await
    }

    /// Returns the delivery linked to an order.
    ///
    /// An order whose `DeliveryCreated` event has not been applied yet fails
    /// with [`OrderError::DeliveryNotAssigned`], distinct from a linked
    /// delivery the delivery service does not know.
    #[tracing::instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id))]
    pub async fn get_delivery_by_order_id(
        &self,
        ctx: &RequestContext,
        order_id: OrderId,
    ) -> Result<DeliveryProjection> {
        let order = self.load(order_id).await?;
        let delivery_id = order
            .delivery_id
            .ok_or(OrderError::DeliveryNotAssigned(order_id))?;
        self.fetch_delivery(ctx, delivery_id).await
    }

    async fn load(&self, order_id: OrderId) -> Result<Order> {
        self.repository
            .get(order_id)
            .await?
            .ok_or(OrderError::NotFound(order_id))
    }

    /// Prices items one at a time, stopping at the first failure.
    async fn price_items(
        &self,
        ctx: &RequestContext,
        requests: &[ItemRequest],
    ) -> Result<Vec<OrderItem>> {
        if requests.is_empty() {
            return Err(OrderError::EmptyOrder);
        }

        let mut items = Vec::with_capacity(requests.len());
        for request in requests {
            if request.quantity == 0 {
                return Err(OrderError::InvalidQuantity(request.product_id));
            }
            let product = self
                .products
                .get_product(ctx, request.product_id)
                .await
                .map_err(|source| {
                    tracing::warn!(product_id = %request.product_id, error = %source, "product lookup failed");
                    OrderError::ProductService {
                        product_id: request.product_id,
                        source,
                    }
                })?;
            items.push(OrderItem {
                product_id: request.product_id,
                quantity: request.quantity,
                unit_price: product.price,
            });
        }
        Ok(items)
    }

    async fn fetch_delivery(
        &self,
        ctx: &RequestContext,
        delivery_id: DeliveryId,
    ) -> Result<DeliveryProjection> {
        self.deliveries
            .get_delivery(ctx, delivery_id)
            .await
            .map_err(|e| match e {
                RpcError::NotFound(_) => OrderError::DeliveryNotFound(delivery_id),
                RpcError::Unavailable(reason) => {
                    tracing::warn!(%delivery_id, %reason, "delivery service unavailable");
                    OrderError::DeliveryServiceUnavailable(reason)
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{InMemoryDeliveryClient, InMemoryProductClient};
    use crate::repository::InMemoryOrderRepository;
    use common::{Identity, Money, ProductId, Role};

    type TestService =
        OrderService<InMemoryOrderRepository, InMemoryProductClient, InMemoryDeliveryClient>;

    async fn service() -> (TestService, InMemoryProductClient) {
        let products = InMemoryProductClient::new();
        products.add_product(ProductId::new(1), "kettle", Money::from_cents(1000)).await;
        products.add_product(ProductId::new(2), "mug", Money::from_cents(2500)).await;
        let service = OrderService::new(
            InMemoryOrderRepository::new(),
            products.clone(),
            InMemoryDeliveryClient::new(),
        );
        (service, products)
    }

    fn ctx() -> RequestContext {
        RequestContext::new(Identity::new("u-1", [Role::User]))
    }

    #[tokio::test]
    async fn test_create_prices_items_and_uses_caller_identity() {
        let (service, _) = service().await;

        let order = service
            .create_order(
                &ctx(),
                vec![ItemRequest::new(ProductId::new(1), 2), ItemRequest::new(ProductId::new(2), 1)],
                PaymentMode::Card,
            )
            .await
            .unwrap();

        assert_eq!(order.amount, Money::from_cents(4500));
        assert_eq!(order.user_id.as_str(), "u-1");
        assert_eq!(order.delivery_id, None);

        let rows = service.repository().outbox_rows().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].topic, topics::ORDER_EVENTS);
    }

    #[tokio::test]
    async fn test_pricing_stops_at_first_failure() {
        let (service, products) = service().await;

        let result = service
            .create_order(
                &ctx(),
                vec![
                    ItemRequest::new(ProductId::new(1), 1),
                    ItemRequest::new(ProductId::new(99), 1),
                    ItemRequest::new(ProductId::new(2), 1),
                ],
                PaymentMode::Card,
            )
            .await;

        assert!(matches!(
            result,
            Err(OrderError::ProductService { source: RpcError::NotFound(_), .. })
        ));
        assert_eq!(products.call_count(), 2);
        assert_eq!(service.repository().order_count().await, 0);
        assert!(service.repository().outbox_rows().await.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_empty_order_and_zero_quantity() {
        let (service, products) = service().await;

        let empty = service
            .create_order(&ctx(), vec![], PaymentMode::Upi)
            .await;
        assert!(matches!(empty, Err(OrderError::EmptyOrder)));

        let zero = service
            .create_order(&ctx(), vec![ItemRequest::new(ProductId::new(1), 0)], PaymentMode::Upi)
            .await;
        assert!(matches!(zero, Err(OrderError::InvalidQuantity(_))));
        assert_eq!(products.call_count(), 0);
    }
}
