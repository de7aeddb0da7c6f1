//! Transactional outbox.
//!
//! Services write outbox rows in the same repository operation as the entity
//! change that produced them. An [`OutboxDispatcher`] later publishes the
//! rows to the broker, retrying with capped exponential backoff until the
//! broker accepts them. Rows that share a topic and key are published in
//! creation order: a failing row holds back the rows queued behind it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, watch};
use uuid::Uuid;

use crate::{IntegrationEvent, Message, MessageBroker, MessagingError, Result};

/// A message waiting to be published.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxMessage {
    pub id: Uuid,
    pub topic: String,
    pub message: Message,
    pub created_at: DateTime<Utc>,

    /// Failed publish attempts so far.
    pub attempts: u32,

    /// The row is not retried before this instant.
    pub next_attempt_at: DateTime<Utc>,

    pub last_error: Option<String>,
}

impl OutboxMessage {
    pub fn new(topic: impl Into<String>, message: Message) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            message,
            created_at: now,
            attempts: 0,
            next_attempt_at: now,
            last_error: None,
        }
    }

    /// Serializes an event into a row, stamping the correlation id of the
    /// request that produced it.
    pub fn for_event<E: IntegrationEvent>(
        topic: impl Into<String>,
        event: &E,
        correlation_id: Uuid,
    ) -> std::result::Result<Self, serde_json::Error> {
        let message = event.to_message()?.with_correlation_id(correlation_id);
        Ok(Self::new(topic, message))
    }

    /// Rows with the same lane are published strictly in creation order.
    fn lane(&self) -> (&str, &str) {
        (&self.topic, &self.message.key)
    }
}

/// Rows that may be published now, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingBatch {
    pub rows: Vec<OutboxMessage>,

    /// Unsent rows held back because they, or an older row on their lane,
    /// are still backing off.
    pub deferred: usize,
}

/// Unsent outbox rows in creation order.
///
/// Repositories embed a table next to their entities so that both are
/// written under the same lock. Rows are removed once published.
#[derive(Debug, Clone, Default)]
pub struct OutboxTable {
    rows: BTreeMap<u64, OutboxMessage>,
    index: HashMap<Uuid, u64>,
    next_seq: u64,
    sent: u64,
}

impl OutboxTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: OutboxMessage) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.index.insert(row.id, seq);
        self.rows.insert(seq, row);
    }

    pub fn extend(&mut self, rows: impl IntoIterator<Item = OutboxMessage>) {
        for row in rows {
            self.push(row);
        }
    }

    /// Returns up to `limit` rows that are due at `now` and not queued behind
    /// a backing-off row on their lane.
    pub fn pending(&self, limit: usize, now: DateTime<Utc>) -> PendingBatch {
        let mut batch = PendingBatch::default();
        let mut blocked: HashSet<(&str, &str)> = HashSet::new();

        for row in self.rows.values() {
            let lane = row.lane();
            if blocked.contains(&lane) || row.next_attempt_at > now {
                blocked.insert(lane);
                batch.deferred += 1;
                continue;
            }
            if batch.rows.len() == limit {
                break;
            }
            batch.rows.push(row.clone());
        }

        batch
    }

    pub fn pending_count(&self) -> usize {
        self.rows.len()
    }

    /// Returns how many rows have been published and removed.
    pub fn sent_count(&self) -> u64 {
        self.sent
    }

    /// Removes a published row.
    pub fn mark_sent(&mut self, id: Uuid) -> Result<()> {
        let seq = self
            .index
            .remove(&id)
            .ok_or(MessagingError::UnknownOutboxMessage(id))?;
        self.rows.remove(&seq);
        self.sent += 1;
        Ok(())
    }

    pub fn record_failure(
        &mut self,
        id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<()> {
        let row = self.row_mut(id)?;
        row.attempts += 1;
        row.last_error = Some(error.to_string());
        row.next_attempt_at = next_attempt_at;
        Ok(())
    }

    /// Every unsent row in creation order.
    pub fn rows(&self) -> Vec<OutboxMessage> {
        self.rows.values().cloned().collect()
    }

    fn row_mut(&mut self, id: Uuid) -> Result<&mut OutboxMessage> {
        self.index
            .get(&id)
            .and_then(|seq| self.rows.get_mut(seq))
            .ok_or(MessagingError::UnknownOutboxMessage(id))
    }
}

/// Storage the dispatcher reads pending rows from.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Returns up to `limit` rows that may be published at `now`, in
    /// creation order.
    async fn pending(&self, limit: usize, now: DateTime<Utc>) -> Result<PendingBatch>;

    /// Removes a row the broker accepted.
    async fn mark_sent(&self, id: Uuid) -> Result<()>;

    /// Counts a failed attempt and defers the row until `next_attempt_at`.
    async fn record_failure(
        &self,
        id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<()>;
}

/// Stand-alone in-memory outbox.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOutbox {
    table: Arc<RwLock<OutboxTable>>,
}

impl InMemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn enqueue(&self, row: OutboxMessage) {
        self.table.write().await.push(row);
    }

    /// Returns a copy of every unsent row (for testing).
    pub async fn rows(&self) -> Vec<OutboxMessage> {
        self.table.read().await.rows()
    }

    /// Returns how many rows have been published (for testing).
    pub async fn sent_count(&self) -> u64 {
        self.table.read().await.sent_count()
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutbox {
    async fn pending(&self, limit: usize, now: DateTime<Utc>) -> Result<PendingBatch> {
        Ok(self.table.read().await.pending(limit, now))
    }

    async fn mark_sent(&self, id: Uuid) -> Result<()> {
        self.table.write().await.mark_sent(id)
    }

    async fn record_failure(
        &self,
        id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<()> {
        self.table
            .write()
            .await
            .record_failure(id, error, next_attempt_at)
    }
}

/// Capped exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(30),
            multiplier: 2,
        }
    }
}

impl Backoff {
    /// Delay before the next attempt, after `attempts` failures.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }
        let factor = self.multiplier.max(1).saturating_pow(attempts - 1);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

/// Dispatcher settings.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    pub batch_size: usize,
    pub poll_interval: Duration,
    pub backoff: Backoff,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            poll_interval: Duration::from_millis(200),
            backoff: Backoff::default(),
        }
    }
}

impl OutboxConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Counts from one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub published: usize,
    pub failed: usize,
    /// Rows skipped because they are backing off or queued behind one that is.
    pub deferred: usize,
}

/// Publishes pending outbox rows to the broker.
pub struct OutboxDispatcher<O: OutboxStore, B: MessageBroker> {
    name: String,
    store: O,
    broker: B,
    config: OutboxConfig,
}

impl<O: OutboxStore, B: MessageBroker> OutboxDispatcher<O, B> {
    pub fn new(name: impl Into<String>, store: O, broker: B, config: OutboxConfig) -> Self {
        Self {
            name: name.into(),
            store,
            broker,
            config,
        }
    }

    /// Runs one pass over the pending rows.
    #[tracing::instrument(skip(self), fields(outbox = %self.name))]
    pub async fn dispatch_once(&self) -> Result<DispatchStats> {
        let now = Utc::now();
        let batch = self.store.pending(self.config.batch_size, now).await?;

        let mut stats = DispatchStats {
            deferred: batch.deferred,
            ..DispatchStats::default()
        };
        let mut blocked: HashSet<(String, String)> = HashSet::new();

        for row in batch.rows {
            let lane = (row.topic.clone(), row.message.key.clone());
            if blocked.contains(&lane) {
                stats.deferred += 1;
                continue;
            }

            match self.broker.publish(&row.topic, row.message.clone()).await {
                Ok(record) => {
                    self.store.mark_sent(row.id).await?;
                    stats.published += 1;
                    metrics::counter!(
                        "outbox_published_total",
                        "outbox" => self.name.clone(),
                        "topic" => row.topic.clone()
                    )
                    .increment(1);
                    tracing::debug!(
                        topic = %record.topic,
                        partition = record.partition,
                        offset = %record.offset,
                        key = %record.key,
                        event_type = %record.event_type,
                        "outbox message published"
                    );
                }
                Err(e) => {
                    let attempts = row.attempts + 1;
                    let delay = self.config.backoff.delay_for(attempts);
                    let next_attempt_at = now
                        + chrono::Duration::from_std(delay)
                            .unwrap_or_else(|_| chrono::Duration::hours(1));
                    self.store
                        .record_failure(row.id, &e.to_string(), next_attempt_at)
                        .await?;

                    stats.failed += 1;
                    blocked.insert(lane);
                    metrics::counter!(
                        "outbox_publish_failures_total",
                        "outbox" => self.name.clone(),
                        "topic" => row.topic.clone()
                    )
                    .increment(1);
                    tracing::warn!(
                        outbox_id = %row.id,
                        topic = %row.topic,
                        key = %row.message.key,
                        attempts,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "outbox publish failed"
                    );
                }
            }
        }

        Ok(stats)
    }

    /// Dispatches on the configured interval until `shutdown` flips to true
    /// or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(outbox = %self.name, "outbox dispatcher started");

        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.dispatch_once().await {
                        tracing::warn!(outbox = %self.name, error = %e, "outbox dispatch failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(outbox = %self.name, "outbox dispatcher stopped");
    }
}
