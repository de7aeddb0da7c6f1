//! Synchronous dependencies of the delivery service and in-memory fakes.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{DeliveryId, Money, OrderId, RequestContext, RpcError, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// What the delivery service knows about an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderProjection {
    pub order_id: OrderId,
    pub user_id: UserId,
    #[serde(alias = "orderStatus")]
    pub status: String,
    #[serde(default, alias = "orderAmount", with = "common::money::decimal")]
    pub amount: Money,
    #[serde(default)]
    pub delivery_id: Option<DeliveryId>,
}

/// What the delivery service knows about a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProjection {
    pub user_id: UserId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Read access to the order service.
#[async_trait]
pub trait OrderClient: Send + Sync {
    async fn get_order(
        &self,
        ctx: &RequestContext,
        order_id: OrderId,
    ) -> Result<OrderProjection, RpcError>;
}

/// Read access to the user service.
#[async_trait]
pub trait UserClient: Send + Sync {
    async fn get_user(
        &self,
        ctx: &RequestContext,
        user_id: &UserId,
    ) -> Result<UserProjection, RpcError>;
}

#[async_trait]
impl<T: OrderClient + ?Sized> OrderClient for Arc<T> {
    async fn get_order(
        &self,
        ctx: &RequestContext,
        order_id: OrderId,
    ) -> Result<OrderProjection, RpcError> {
        (**self).get_order(ctx, order_id).await
    }
}

#[async_trait]
impl<T: UserClient + ?Sized> UserClient for Arc<T> {
    async fn get_user(
        &self,
        ctx: &RequestContext,
        user_id: &UserId,
    ) -> Result<UserProjection, RpcError> {
        (**self).get_user(ctx, user_id).await
    }
}

/// In-memory order service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderClient {
    orders: Arc<RwLock<HashMap<OrderId, OrderProjection>>>,
    fail_on_get: Arc<AtomicBool>,
}

impl InMemoryOrderClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an order the client will return.
    pub async fn add_order(&self, order_id: OrderId, user_id: impl Into<UserId>) {
        let order = OrderProjection {
            order_id,
            user_id: user_id.into(),
            status: "PENDING".to_string(),
            amount: Money::zero(),
            delivery_id: None,
        };
        self.orders.write().await.insert(order_id, order);
    }

    /// Configures the client to fail every call as if the service were down.
    pub fn set_fail_on_get(&self, fail: bool) {
        self.fail_on_get.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl OrderClient for InMemoryOrderClient {
    async fn get_order(
        &self,
        _ctx: &RequestContext,
        order_id: OrderId,
    ) -> Result<OrderProjection, RpcError> {
        if self.fail_on_get.load(Ordering::SeqCst) {
            return Err(RpcError::Unavailable(
                "simulated order service outage".to_string(),
            ));
        }
        self.orders
            .read()
            .await
            .get(&order_id)
            .cloned()
            .ok_or_else(|| RpcError::NotFound(format!("order {order_id}")))
    }
}

/// In-memory user service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserClient {
    users: Arc<RwLock<HashMap<UserId, UserProjection>>>,
    fail_on_get: Arc<AtomicBool>,
}

impl InMemoryUserClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, user_id: impl Into<UserId>, email: impl Into<String>) {
        let user_id = user_id.into();
        let user = UserProjection {
            user_id: user_id.clone(),
            name: None,
            email: Some(email.into()),
        };
        self.users.write().await.insert(user_id, user);
    }

    pub fn set_fail_on_get(&self, fail: bool) {
        self.fail_on_get.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl UserClient for InMemoryUserClient {
    async fn get_user(
        &self,
        _ctx: &RequestContext,
        user_id: &UserId,
    ) -> Result<UserProjection, RpcError> {
        if self.fail_on_get.load(Ordering::SeqCst) {
            return Err(RpcError::Unavailable(
                "simulated user service outage".to_string(),
            ));
        }
        self.users
            .read()
            .await
            .get(user_id)
            .cloned()
            .ok_or_else(|| RpcError::NotFound(format!("user {user_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Identity, Role};

    fn ctx() -> RequestContext {
        RequestContext::new(Identity::new("u-1", [Role::User]))
    }

    #[tokio::test]
    async fn order_client_distinguishes_missing_from_unavailable() {
        let client = InMemoryOrderClient::new();
        client.add_order(OrderId::new(100), "u-1").await;

        let order = client.get_order(&ctx(), OrderId::new(100)).await.unwrap();
        assert_eq!(order.user_id.as_str(), "u-1");

        let missing = client.get_order(&ctx(), OrderId::new(1)).await.unwrap_err();
        assert!(matches!(missing, RpcError::NotFound(_)));

        client.set_fail_on_get(true);
        let down = client.get_order(&ctx(), OrderId::new(100)).await.unwrap_err();
        assert!(matches!(down, RpcError::Unavailable(_)));
    }

    #[test]
    fn order_projection_ignores_extra_fields() {
        let json = serde_json::json!({
            "orderId": 100,
            "userId": "u-1",
            "status": "PENDING",
            "paymentMode": "CARD",
            "items": []
        });
        let order: OrderProjection = serde_json::from_value(json).unwrap();
        assert_eq!(order.order_id, OrderId::new(100));
        assert_eq!(order.delivery_id, None);
    }

    #[test]
    fn order_projection_reads_order_service_dto() {
        let json = serde_json::json!({
            "orderId": 100,
            "userId": "u-1",
            "orderAmount": 39.98,
            "orderStatus": "SHIPPED",
            "isPaid": false,
            "deliveryId": 7,
            "createdAt": "2024-05-01T10:00:00"
        });
        let order: OrderProjection = serde_json::from_value(json).unwrap();
        assert_eq!(order.status, "SHIPPED");
        assert_eq!(order.amount, Money::from_cents(3998));
        assert_eq!(order.delivery_id, Some(DeliveryId::new(7)));
    }

    #[test]
    fn order_projection_reads_own_order_json() {
        let json = serde_json::json!({
            "orderId": 100,
            "userId": "u-1",
            "status": "PENDING",
            "amount": { "cents": 1999 }
        });
        let order: OrderProjection = serde_json::from_value(json).unwrap();
        assert_eq!(order.amount, Money::from_cents(1999));
    }
}
