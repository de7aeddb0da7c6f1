//! Delivery channels for notifications.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use messaging::Notification;
use tokio::sync::RwLock;

use crate::error::{NotificationError, Result};

/// Sends a notification to its user.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Returns the address a notification goes to: the email when known,
/// otherwise the user id.
pub fn recipient(notification: &Notification) -> String {
    notification
        .user_email
        .clone()
        .unwrap_or_else(|| notification.user_id.to_string())
}

/// Default sender: writes each notification to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSender;

#[async_trait]
impl NotificationSender for LogSender {
    async fn send(&self, notification: &Notification) -> Result<()> {
        tracing::info!(
            order_id = ?notification.order_id,
            delivery_id = ?notification.delivery_id,
            "{} | To: {} | {}",
            notification.event_type,
            recipient(notification),
            notification.message
        );
        Ok(())
    }
}

/// Keeps every sent notification in memory (for testing).
#[derive(Debug, Clone, Default)]
pub struct RecordingSender {
    sent: Arc<RwLock<Vec<Notification>>>,
    fail_on_send: Arc<AtomicBool>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_send(&self, fail: bool) {
        self.fail_on_send.store(fail, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    async fn send(&self, notification: &Notification) -> Result<()> {
        if self.fail_on_send.load(Ordering::SeqCst) {
            return Err(NotificationError::SendFailed(
                "simulated send failure".to_string(),
            ));
        }
        self.sent.write().await.push(notification.clone());
        Ok(())
    }
}
