//! The fan-in consumer handing notification records to a sender.

use async_trait::async_trait;
use messaging::{ConsumerConfig, HandlerError, MessageHandler, Notification, Record, topics};

use crate::sender::NotificationSender;

/// Consumer settings for the fan-in: one group over both notification topics.
pub fn fan_in_config() -> ConsumerConfig {
    ConsumerConfig::new(
        topics::NOTIFICATION_GROUP,
        [topics::ORDER_EVENTS, topics::DELIVERY_EVENTS],
    )
}

/// Decodes notification records and sends them.
///
/// A record is acknowledged only after the sender succeeds; a failed send
/// is retried on redelivery.
pub struct NotificationHandler<S: NotificationSender> {
    sender: S,
}

impl<S: NotificationSender> NotificationHandler<S> {
    pub fn new(sender: S) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl<S: NotificationSender> MessageHandler for NotificationHandler<S> {
    fn name(&self) -> &'static str {
        "notification"
    }

    #[tracing::instrument(
        skip(self, record),
        fields(
            topic = %record.topic,
            partition = record.partition,
            offset = %record.offset,
            correlation_id = ?record.correlation_id()
        )
    )]
    async fn handle(&self, record: &Record) -> Result<(), HandlerError> {
        let notification: Notification = record.decode()?;

        self.sender.send(&notification).await.map_err(|e| {
            tracing::warn!(event_type = %notification.event_type, error = %e, "notification send failed");
            HandlerError::retryable(e.to_string())
        })?;

        metrics::counter!(
            "notifications_sent_total",
            "event_type" => notification.event_type.as_str()
        )
        .increment(1);
        Ok(())
    }
}
