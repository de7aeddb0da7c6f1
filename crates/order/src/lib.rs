//! Order service core.
//!
//! - [`Order`]: the order record with its line items and delivery link
//! - [`OrderRepository`]: persistence with an embedded outbox
//! - [`ProductClient`]/[`DeliveryClient`]: synchronous dependencies
//! - [`OrderService`]: create, update and read orders
//! - [`consumers`]: keep `delivery_id` and the delivered status in sync with
//!   the delivery service's events

pub mod clients;
pub mod consumers;
pub mod error;
pub mod model;
pub mod repository;
pub mod service;

pub use clients::{
    DeliveryClient, DeliveryProjection, InMemoryDeliveryClient, InMemoryProductClient,
    ProductClient, ProductProjection,
};
pub use consumers::{DeliveryCreatedHandler, DeliveryStatusChangedHandler};
pub use error::{OrderError, Result};
pub use model::{ItemRequest, LinkOutcome, Order, OrderItem, OrderStatus, PaymentMode};
pub use repository::{InMemoryOrderRepository, OrderRepository};
pub use service::OrderService;
