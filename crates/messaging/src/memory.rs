use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    Message, MessagingError, Offset, Record, Result, broker::MessageBroker,
    broker::partition_for_key,
};

/// Default partition count for topics created on first use.
pub const DEFAULT_PARTITIONS: u32 = 3;

#[derive(Default)]
struct BrokerState {
    topics: HashMap<String, Vec<Vec<Record>>>,
    committed: HashMap<(String, String, u32), Offset>,
}

impl BrokerState {
    fn topic_mut(&mut self, topic: &str, default_partitions: u32) -> &mut Vec<Vec<Record>> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| vec![Vec::new(); default_partitions.max(1) as usize])
    }
}

/// In-memory broker with Kafka-like delivery semantics.
///
/// Topics are created on first use. Cloning shares the underlying log, so a
/// producer and its consumers can hold separate handles.
#[derive(Clone)]
pub struct InMemoryBroker {
    state: Arc<RwLock<BrokerState>>,
    default_partitions: u32,
    fail_on_publish: Arc<AtomicBool>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    /// Creates an empty broker using [`DEFAULT_PARTITIONS`].
    pub fn new() -> Self {
        Self::with_partitions(DEFAULT_PARTITIONS)
    }

    /// Creates an empty broker whose auto-created topics have `partitions`
    /// partitions.
    pub fn with_partitions(partitions: u32) -> Self {
        Self {
            state: Arc::new(RwLock::new(BrokerState::default())),
            default_partitions: partitions.max(1),
            fail_on_publish: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Creates a topic with an explicit partition count. Existing topics are
    /// left untouched.
    pub async fn create_topic(&self, topic: &str, partitions: u32) {
        let mut state = self.state.write().await;
        state.topic_mut(topic, partitions);
    }

    /// Configures the broker to reject every publish.
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.fail_on_publish.store(fail, Ordering::SeqCst);
    }

    /// Returns every record of a topic, partition by partition, each in
    /// offset order.
    pub async fn records(&self, topic: &str) -> Vec<Record> {
        let state = self.state.read().await;
        state
            .topics
            .get(topic)
            .map(|partitions| partitions.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the number of records in a topic across all partitions.
    pub async fn record_count(&self, topic: &str) -> usize {
        let state = self.state.read().await;
        state
            .topics
            .get(topic)
            .map(|partitions| partitions.iter().map(Vec::len).sum())
            .unwrap_or(0)
    }

    fn check_partition(topic: &str, partitions: &[Vec<Record>], partition: u32) -> Result<()> {
        if (partition as usize) < partitions.len() {
            Ok(())
        } else {
            Err(MessagingError::InvalidPartition {
                topic: topic.to_string(),
                partition,
            })
        }
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn publish(&self, topic: &str, message: Message) -> Result<Record> {
        if self.fail_on_publish.load(Ordering::SeqCst) {
            return Err(MessagingError::PublishRejected {
                topic: topic.to_string(),
                reason: "broker unavailable".to_string(),
            });
        }

        let mut state = self.state.write().await;
        let partitions = state.topic_mut(topic, self.default_partitions);
        let partition = partition_for_key(&message.key, partitions.len() as u32);
        let log = &mut partitions[partition as usize];

        let record = Record {
            topic: topic.to_string(),
            partition,
            offset: Offset::new(log.len() as u64),
            key: message.key,
            event_type: message.event_type,
            payload: message.payload,
            headers: message.headers,
            timestamp: Utc::now(),
        };
        log.push(record.clone());

        Ok(record)
    }

    async fn partition_count(&self, topic: &str) -> Result<u32> {
        let mut state = self.state.write().await;
        Ok(state.topic_mut(topic, self.default_partitions).len() as u32)
    }

    async fn fetch(
        &self,
        group: &str,
        topic: &str,
        partition: u32,
        max_records: usize,
    ) -> Result<Vec<Record>> {
        let mut state = self.state.write().await;
        let committed = state
            .committed
            .get(&(group.to_string(), topic.to_string(), partition))
            .copied()
            .unwrap_or_default();

        let partitions = state.topic_mut(topic, self.default_partitions);
        Self::check_partition(topic, partitions, partition)?;

        Ok(partitions[partition as usize]
            .iter()
            .skip(committed.as_u64() as usize)
            .take(max_records)
            .cloned()
            .collect())
    }

    async fn commit(&self, group: &str, topic: &str, partition: u32, next: Offset) -> Result<()> {
        let mut state = self.state.write().await;
        let partitions = state.topic_mut(topic, self.default_partitions);
        Self::check_partition(topic, partitions, partition)?;

        state
            .committed
            .insert((group.to_string(), topic.to_string(), partition), next);
        Ok(())
    }

    async fn committed_offset(&self, group: &str, topic: &str, partition: u32) -> Result<Offset> {
        let state = self.state.read().await;
        Ok(state
            .committed
            .get(&(group.to_string(), topic.to_string(), partition))
            .copied()
            .unwrap_or_default())
    }

    async fn end_offset(&self, topic: &str, partition: u32) -> Result<Offset> {
        let mut state = self.state.write().await;
        let partitions = state.topic_mut(topic, self.default_partitions);
        Self::check_partition(topic, partitions, partition)?;
        Ok(Offset::new(partitions[partition as usize].len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(key: &str, n: u64) -> Message {
        Message::new(key, "TestEvent", serde_json::json!({ "n": n }))
    }

    #[tokio::test]
    async fn publish_assigns_sequential_offsets_per_partition() {
        let broker = InMemoryBroker::with_partitions(1);

        let r0 = broker.publish("t", message("a", 0)).await.unwrap();
        let r1 = broker.publish("t", message("b", 1)).await.unwrap();

        assert_eq!(r0.partition, 0);
        assert_eq!(r0.offset, Offset::new(0));
        assert_eq!(r1.offset, Offset::new(1));
        assert_eq!(broker.record_count("t").await, 2);
    }

    #[tokio::test]
    async fn same_key_lands_on_same_partition_in_publish_order() {
        let broker = InMemoryBroker::with_partitions(4);

        let mut partitions = Vec::new();
        for n in 0..5 {
            let record = broker.publish("t", message("delivery-9", n)).await.unwrap();
            partitions.push(record.partition);
        }
        partitions.dedup();
        assert_eq!(partitions.len(), 1);

        let fetched = broker.fetch("g", "t", partitions[0], 10).await.unwrap();
        let ns: Vec<u64> = fetched
            .iter()
            .map(|r| r.payload["n"].as_u64().unwrap())
            .collect();
        assert_eq!(ns, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn uncommitted_records_are_redelivered() {
        let broker = InMemoryBroker::with_partitions(1);
        broker.publish("t", message("k", 0)).await.unwrap();
        broker.publish("t", message("k", 1)).await.unwrap();

        let first = broker.fetch("g", "t", 0, 10).await.unwrap();
        let again = broker.fetch("g", "t", 0, 10).await.unwrap();
        assert_eq!(first, again);

        broker.commit("g", "t", 0, first[0].offset.next()).await.unwrap();
        let after_commit = broker.fetch("g", "t", 0, 10).await.unwrap();
        assert_eq!(after_commit.len(), 1);
        assert_eq!(after_commit[0].offset, Offset::new(1));
    }

    #[tokio::test]
    async fn consumer_groups_track_offsets_independently() {
        let broker = InMemoryBroker::with_partitions(1);
        broker.publish("t", message("k", 0)).await.unwrap();

        broker.commit("g1", "t", 0, Offset::new(1)).await.unwrap();

        assert!(broker.fetch("g1", "t", 0, 10).await.unwrap().is_empty());
        assert_eq!(broker.fetch("g2", "t", 0, 10).await.unwrap().len(), 1);
        assert_eq!(
            broker.committed_offset("g2", "t", 0).await.unwrap(),
            Offset::initial()
        );
    }

    #[tokio::test]
    async fn fetch_respects_batch_limit() {
        let broker = InMemoryBroker::with_partitions(1);
        for n in 0..5 {
            broker.publish("t", message("k", n)).await.unwrap();
        }

        let batch = broker.fetch("g", "t", 0, 2).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(broker.end_offset("t", 0).await.unwrap(), Offset::new(5));
    }

    #[tokio::test]
    async fn failing_broker_rejects_publish() {
        let broker = InMemoryBroker::new();
        broker.set_fail_on_publish(true);

        let result = broker.publish("t", message("k", 0)).await;
        assert!(matches!(
            result,
            Err(MessagingError::PublishRejected { .. })
        ));
        assert_eq!(broker.record_count("t").await, 0);

        broker.set_fail_on_publish(false);
        assert!(broker.publish("t", message("k", 0)).await.is_ok());
    }

    #[tokio::test]
    async fn invalid_partition_is_rejected() {
        let broker = InMemoryBroker::with_partitions(2);
        let result = broker.fetch("g", "t", 5, 1).await;
        assert!(matches!(
            result,
            Err(MessagingError::InvalidPartition { partition: 5, .. })
        ));
    }

    #[tokio::test]
    async fn explicit_topic_partition_count_wins() {
        let broker = InMemoryBroker::with_partitions(3);
        broker.create_topic("wide", 8).await;
        assert_eq!(broker.partition_count("wide").await.unwrap(), 8);
        assert_eq!(broker.partition_count("auto").await.unwrap(), 3);
    }
}
