//! Messaging fabric for the fulfillment services.
//!
//! Models the delivery semantics the services depend on:
//! - [`MessageBroker`]: named topics split into ordered partitions, key-based
//!   routing, and a committed read offset per consumer group and partition
//! - [`Consumer`]: a polling loop that commits only after its handler
//!   succeeds, with a bounded attempt counter and a dead-letter topic
//! - [`OutboxDispatcher`]: publishes rows written atomically with entity
//!   changes, retrying with backoff until the broker accepts them
//! - [`events`]: the wire contracts exchanged between services

pub mod broker;
pub mod consumer;
pub mod error;
pub mod events;
pub mod memory;
pub mod outbox;
pub mod record;
pub mod topics;

pub use broker::{MessageBroker, partition_for_key};
pub use consumer::{Consumer, ConsumerConfig, HandlerError, MessageHandler, PollStats};
pub use error::{MessagingError, Result};
pub use events::{
    DeliveryCreated, DeliveryStatusChanged, IntegrationEvent, Notification, NotificationKind,
};
pub use memory::InMemoryBroker;
pub use outbox::{
    Backoff, DispatchStats, InMemoryOutbox, OutboxConfig, OutboxDispatcher, OutboxMessage,
    OutboxStore, OutboxTable, PendingBatch,
};
pub use record::{Message, Offset, Record};
