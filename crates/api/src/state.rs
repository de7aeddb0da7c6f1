//! Shared application state and its wiring.

use std::sync::Arc;

use delivery::{DeliveryService, InMemoryDeliveryRepository, OrderClient, UserClient};
use messaging::InMemoryBroker;
use order::{DeliveryClient, InMemoryOrderRepository, OrderService, ProductClient};

use crate::clients::{
    HttpDeliveryClient, HttpOrderClient, HttpProductClient, HttpRpcClient, HttpUserClient,
};
use crate::config::Config;

pub type Deliveries =
    DeliveryService<InMemoryDeliveryRepository, Arc<dyn OrderClient>, Arc<dyn UserClient>>;

pub type Orders =
    OrderService<InMemoryOrderRepository, Arc<dyn ProductClient>, Arc<dyn DeliveryClient>>;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub deliveries: Deliveries,
    pub orders: Orders,
    pub broker: InMemoryBroker,
    pub gateway_token: Option<String>,
}

/// The RPC dependencies of both services.
pub struct Upstreams {
    pub orders: Arc<dyn OrderClient>,
    pub users: Arc<dyn UserClient>,
    pub products: Arc<dyn ProductClient>,
    pub deliveries: Arc<dyn DeliveryClient>,
}

impl Upstreams {
    /// HTTP clients for the configured service URLs.
    pub fn http(config: &Config) -> Result<Self, reqwest::Error> {
        let client = |target: &'static str, url: &str| {
            HttpRpcClient::new(
                target,
                url,
                config.rpc_timeout,
                config.gateway_token.clone(),
            )
        };

        Ok(Self {
            orders: Arc::new(HttpOrderClient(client(
                "order-service",
                &config.order_service_url,
            )?)),
            users: Arc::new(HttpUserClient(client(
                "user-service",
                &config.user_service_url,
            )?)),
            products: Arc::new(HttpProductClient(client(
                "product-service",
                &config.product_service_url,
            )?)),
            deliveries: Arc::new(HttpDeliveryClient(client(
                "delivery-service",
                &config.delivery_service_url,
            )?)),
        })
    }
}

impl AppState {
    /// Creates the state with fresh in-memory repositories.
    pub fn new(
        broker: InMemoryBroker,
        upstreams: Upstreams,
        gateway_token: Option<String>,
    ) -> Self {
        Self {
            deliveries: DeliveryService::new(
                InMemoryDeliveryRepository::new(),
                upstreams.orders,
                upstreams.users,
            ),
            orders: OrderService::new(
                InMemoryOrderRepository::new(),
                upstreams.products,
                upstreams.deliveries,
            ),
            broker,
            gateway_token,
        }
    }
}
