//! Types shared by every service in the fulfillment backend.
//!
//! - Entity identifiers ([`OrderId`], [`DeliveryId`], [`ProductId`], [`UserId`])
//! - [`Money`] amounts in minor units
//! - [`Identity`] and [`RequestContext`], the explicit per-request caller context
//! - [`RpcError`], how a failed call to another service is classified

pub mod context;
pub mod identity;
pub mod money;
pub mod rpc;
pub mod types;

pub use context::RequestContext;
pub use identity::{Identity, IdentityError, Role};
pub use money::Money;
pub use rpc::RpcError;
pub use types::{DeliveryId, OrderId, ProductId, UserId};
