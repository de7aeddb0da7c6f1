//! Delivery service core.
//!
//! - [`state`]: the delivery status state machine
//! - [`Delivery`]: the delivery record
//! - [`DeliveryRepository`]: persistence with an embedded outbox
//! - [`OrderClient`]/[`UserClient`]: synchronous dependencies
//! - [`DeliveryService`]: create and update deliveries, emitting
//!   `DeliveryCreated`, `DeliveryStatusChanged` and user notifications

pub mod clients;
pub mod error;
pub mod model;
pub mod repository;
pub mod service;
pub mod state;

pub use clients::{
    InMemoryOrderClient, InMemoryUserClient, OrderClient, OrderProjection, UserClient,
    UserProjection,
};
pub use error::{DeliveryError, Result};
pub use model::{DEFAULT_DELIVERY_WINDOW_DAYS, Delivery};
pub use repository::{DeliveryRepository, InMemoryDeliveryRepository};
pub use service::{DeliveryService, UNKNOWN_EMAIL};
pub use state::{DeliveryStatus, TransitionError, UnknownStatus, transition};
