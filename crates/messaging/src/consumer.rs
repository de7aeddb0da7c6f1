//! Consumer runtime: polls partitions for a group and hands records to a
//! handler, committing only after the handler succeeds.
//!
//! Retries are bounded. A record whose handler keeps failing is copied to the
//! topic's dead-letter topic together with its provenance, then committed so
//! the partition can make progress.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use thiserror::Error;
use tokio::sync::{Mutex, watch};

use crate::topics::dead_letter_topic;
use crate::{MessageBroker, Offset, Record, Result};

/// Header naming the topic a dead-lettered record came from.
pub const ORIGINAL_TOPIC_HEADER: &str = "x-original-topic";
/// Header naming the partition a dead-lettered record came from.
pub const ORIGINAL_PARTITION_HEADER: &str = "x-original-partition";
/// Header holding the offset a dead-lettered record had.
pub const ORIGINAL_OFFSET_HEADER: &str = "x-original-offset";
/// Header holding the last handler error.
pub const ERROR_HEADER: &str = "x-error";
/// Header holding the number of attempts made.
pub const ATTEMPTS_HEADER: &str = "x-attempts";

/// Outcome of a failed handler invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// The record may succeed later (missing dependency, upstream outage).
    #[error("{0}")]
    Retryable(String),

    /// The record will never succeed (undecodable payload, conflicting data).
    #[error("{0}")]
    Permanent(String),
}

impl HandlerError {
    pub fn retryable(reason: impl Into<String>) -> Self {
        Self::Retryable(reason.into())
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        Self::Permanent(reason.into())
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Permanent(format!("undecodable payload: {err}"))
    }
}

/// Processes records delivered to a consumer.
///
/// Handlers must be idempotent: a record is redelivered until it is
/// committed, so the same record can arrive more than once.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Name used in logs and metric labels.
    fn name(&self) -> &'static str;

    async fn handle(&self, record: &Record) -> std::result::Result<(), HandlerError>;
}

/// Consumer settings.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub group: String,
    pub topics: Vec<String>,

    /// Maximum records fetched per partition per poll.
    pub max_batch: usize,

    /// Attempts before a retryable failure is dead-lettered.
    pub max_attempts: u32,

    pub poll_interval: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            group: "default-group".to_string(),
            topics: Vec::new(),
            max_batch: 100,
            max_attempts: 5,
            poll_interval: Duration::from_millis(200),
        }
    }
}

impl ConsumerConfig {
    /// Creates a config for `group` subscribed to `topics`.
    pub fn new<I, S>(group: impl Into<String>, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            group: group.into(),
            topics: topics.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch.max(1);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Counts from one or more polls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    /// Records handled successfully and committed.
    pub processed: usize,
    /// Records that failed and were left uncommitted for redelivery.
    pub retried: usize,
    /// Records copied to a dead-letter topic and committed.
    pub dead_lettered: usize,
}

impl PollStats {
    fn merge(&mut self, other: PollStats) {
        self.processed += other.processed;
        self.retried += other.retried;
        self.dead_lettered += other.dead_lettered;
    }
}

type AttemptKey = (String, u32, Offset);

/// A consumer group member reading every partition of its topics.
///
/// Partitions are polled concurrently; records of a single partition are
/// handled strictly in offset order, and a failing record holds back the
/// records behind it until it succeeds or is dead-lettered.
pub struct Consumer<B: MessageBroker> {
    broker: B,
    handler: Arc<dyn MessageHandler>,
    config: ConsumerConfig,
    attempts: Mutex<HashMap<AttemptKey, u32>>,
}

impl<B: MessageBroker> Consumer<B> {
    pub fn new(broker: B, handler: Arc<dyn MessageHandler>, config: ConsumerConfig) -> Self {
        Self {
            broker,
            handler,
            config,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Polls every partition of every subscribed topic once.
    ///
    /// Broker errors on one partition are logged and do not stop the others.
    #[tracing::instrument(skip(self), fields(group = %self.config.group, handler = self.handler.name()))]
    pub async fn poll_once(&self) -> Result<PollStats> {
        let mut assignments = Vec::new();
        for topic in &self.config.topics {
            let partitions = self.broker.partition_count(topic).await?;
            assignments.extend((0..partitions).map(|partition| (topic.as_str(), partition)));
        }

        let results = join_all(
            assignments
                .iter()
                .map(|(topic, partition)| self.poll_partition(topic, *partition)),
        )
        .await;

        let mut stats = PollStats::default();
        for ((topic, partition), result) in assignments.iter().zip(results) {
            match result {
                Ok(partition_stats) => stats.merge(partition_stats),
                Err(e) => {
                    tracing::warn!(topic, partition, error = %e, "partition poll failed");
                }
            }
        }

        Ok(stats)
    }

    /// Polls until a poll handles nothing, returning the accumulated counts.
    ///
    /// Records that keep failing are retried on every round until they are
    /// dead-lettered, so this always terminates.
    pub async fn drain(&self) -> Result<PollStats> {
        let mut total = PollStats::default();
        loop {
            let stats = self.poll_once().await?;
            total.merge(stats);
            if stats == PollStats::default() {
                return Ok(total);
            }
        }
    }

    async fn poll_partition(&self, topic: &str, partition: u32) -> Result<PollStats> {
        let group = self.config.group.as_str();
        let records = self
            .broker
            .fetch(group, topic, partition, self.config.max_batch)
            .await?;

        let mut stats = PollStats::default();
        for record in records {
            tracing::debug!(
                topic = %record.topic,
                partition = record.partition,
                offset = %record.offset,
                key = %record.key,
                event_type = %record.event_type,
                correlation_id = ?record.correlation_id(),
                "received record"
            );

            match self.handler.handle(&record).await {
                Ok(()) => {
                    self.commit(&record).await?;
                    stats.processed += 1;
                    metrics::counter!(
                        "consumer_records_processed_total",
                        "group" => self.config.group.clone(),
                        "topic" => record.topic.clone()
                    )
                    .increment(1);
                }
                Err(err) => {
                    let attempts = self.record_attempt(&record).await;
                    metrics::counter!(
                        "consumer_handler_errors_total",
                        "group" => self.config.group.clone(),
                        "topic" => record.topic.clone()
                    )
                    .increment(1);

                    if err.is_permanent() || attempts >= self.config.max_attempts {
                        self.dead_letter(&record, &err, attempts).await?;
                        self.commit(&record).await?;
                        stats.dead_lettered += 1;
                    } else {
                        tracing::warn!(
                            handler = self.handler.name(),
                            topic = %record.topic,
                            partition = record.partition,
                            offset = %record.offset,
                            attempts,
                            max_attempts = self.config.max_attempts,
                            error = %err,
                            "handler failed, record will be redelivered"
                        );
                        stats.retried += 1;
                        break;
                    }
                }
            }
        }

        self.report_lag(topic, partition).await?;
        Ok(stats)
    }

    async fn commit(&self, record: &Record) -> Result<()> {
        self.broker
            .commit(
                &self.config.group,
                &record.topic,
                record.partition,
                record.offset.next(),
            )
            .await?;
        self.attempts
            .lock()
            .await
            .remove(&(record.topic.clone(), record.partition, record.offset));
        Ok(())
    }

    async fn record_attempt(&self, record: &Record) -> u32 {
        let mut attempts = self.attempts.lock().await;
        let count = attempts
            .entry((record.topic.clone(), record.partition, record.offset))
            .or_insert(0);
        *count += 1;
        *count
    }

    async fn dead_letter(&self, record: &Record, err: &HandlerError, attempts: u32) -> Result<()> {
        let target = dead_letter_topic(&record.topic);
        let message = record
            .to_message()
            .with_header(ORIGINAL_TOPIC_HEADER, record.topic.clone())
            .with_header(ORIGINAL_PARTITION_HEADER, record.partition.to_string())
            .with_header(ORIGINAL_OFFSET_HEADER, record.offset.to_string())
            .with_header(ERROR_HEADER, err.to_string())
            .with_header(ATTEMPTS_HEADER, attempts.to_string());

        self.broker.publish(&target, message).await?;

        tracing::error!(
            handler = self.handler.name(),
            group = %self.config.group,
            topic = %record.topic,
            partition = record.partition,
            offset = %record.offset,
            key = %record.key,
            attempts,
            error = %err,
            dead_letter_topic = %target,
            "record dead-lettered"
        );
        metrics::counter!(
            "consumer_dead_lettered_total",
            "group" => self.config.group.clone(),
            "topic" => record.topic.clone()
        )
        .increment(1);

        Ok(())
    }

    async fn report_lag(&self, topic: &str, partition: u32) -> Result<()> {
        let end = self.broker.end_offset(topic, partition).await?;
        let committed = self
            .broker
            .committed_offset(&self.config.group, topic, partition)
            .await?;
        let lag = end.as_u64().saturating_sub(committed.as_u64());

        metrics::gauge!(
            "consumer_lag",
            "group" => self.config.group.clone(),
            "topic" => topic.to_string(),
            "partition" => partition.to_string()
        )
        .set(lag as f64);
        Ok(())
    }

    /// Polls on the configured interval until `shutdown` flips to true or its
    /// sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            group = %self.config.group,
            topics = ?self.config.topics,
            handler = self.handler.name(),
            "consumer started"
        );

        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.poll_once().await {
                        tracing::warn!(group = %self.config.group, error = %e, "poll failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(group = %self.config.group, "consumer stopped");
    }
}
