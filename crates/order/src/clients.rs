//! Synchronous dependencies of the order service and in-memory fakes.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{DeliveryId, Money, OrderId, ProductId, RequestContext, RpcError, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// What the order service knows about a product.
///
/// The catalog answers with `productName` and a decimal `productPrice`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductProjection {
    pub product_id: ProductId,
    #[serde(rename = "productName", alias = "name", default)]
    pub name: Option<String>,
    #[serde(rename = "productPrice", alias = "price", with = "common::money::decimal")]
    pub price: Money,
}

/// What the order service knows about a delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryProjection {
    pub delivery_id: DeliveryId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub status: String,
    pub expected_delivery_at: Option<DateTime<Utc>>,
}

/// Read access to the product catalog.
#[async_trait]
pub trait ProductClient: Send + Sync {
    async fn get_product(
        &self,
        ctx: &RequestContext,
        product_id: ProductId,
    ) -> Result<ProductProjection, RpcError>;
}

/// Read access to the delivery service.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    async fn get_delivery(
        &self,
        ctx: &RequestContext,
        delivery_id: DeliveryId,
    ) -> Result<DeliveryProjection, RpcError>;
}

#[async_trait]
impl<T: ProductClient + ?Sized> ProductClient for Arc<T> {
    async fn get_product(
        &self,
        ctx: &RequestContext,
        product_id: ProductId,
    ) -> Result<ProductProjection, RpcError> {
        (**self).get_product(ctx, product_id).await
    }
}

#[async_trait]
impl<T: DeliveryClient + ?Sized> DeliveryClient for Arc<T> {
    async fn get_delivery(
        &self,
        ctx: &RequestContext,
        delivery_id: DeliveryId,
    ) -> Result<DeliveryProjection, RpcError> {
        (**self).get_delivery(ctx, delivery_id).await
    }
}

/// In-memory product catalog for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProductClient {
    products: Arc<RwLock<HashMap<ProductId, ProductProjection>>>,
    fail_on_get: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl InMemoryProductClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_product(&self, product_id: impl Into<ProductId>, name: &str, price: Money) {
        let product_id = product_id.into();
        let product = ProductProjection {
            product_id,
            name: Some(name.to_string()),
            price,
        };
        self.products.write().await.insert(product_id, product);
    }

    pub fn set_fail_on_get(&self, fail: bool) {
        self.fail_on_get.store(fail, Ordering::SeqCst);
    }

    /// Returns how many lookups were made.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProductClient for InMemoryProductClient {
    async fn get_product(
        &self,
        _ctx: &RequestContext,
        product_id: ProductId,
    ) -> Result<ProductProjection, RpcError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on_get.load(Ordering::SeqCst) {
            return Err(RpcError::Unavailable(
                "simulated product service outage".to_string(),
            ));
        }
        self.products
            .read()
            .await
            .get(&product_id)
            .cloned()
            .ok_or_else(|| RpcError::NotFound(format!("product {product_id}")))
    }
}

/// In-memory delivery service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDeliveryClient {
    deliveries: Arc<RwLock<HashMap<DeliveryId, DeliveryProjection>>>,
    fail_on_get: Arc<AtomicBool>,
}

impl InMemoryDeliveryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_delivery(&self, delivery: DeliveryProjection) {
        self.deliveries
            .write()
            .await
            .insert(delivery.delivery_id, delivery);
    }

    pub fn set_fail_on_get(&self, fail: bool) {
        self.fail_on_get.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DeliveryClient for InMemoryDeliveryClient {
    async fn get_delivery(
        &self,
        _ctx: &RequestContext,
        delivery_id: DeliveryId,
    ) -> Result<DeliveryProjection, RpcError> {
        if self.fail_on_get.load(Ordering::SeqCst) {
            return Err(RpcError::Unavailable(
                "simulated delivery service outage".to_string(),
            ));
        }
        self.deliveries
            .read()
            .await
            .get(&delivery_id)
            .cloned()
            .ok_or_else(|| RpcError::NotFound(format!("delivery {delivery_id}")))
    }
}
