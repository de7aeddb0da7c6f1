//! Notification fan-in.
//!
//! One consumer group reads both `order-events` and `delivery-events`,
//! decodes each record into a [`messaging::Notification`] and hands it to a
//! [`NotificationSender`].

pub mod error;
pub mod handler;
pub mod sender;

pub use error::{NotificationError, Result};
pub use handler::{NotificationHandler, fan_in_config};
pub use sender::{LogSender, NotificationSender, RecordingSender, recipient};
