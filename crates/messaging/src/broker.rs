use async_trait::async_trait;

use crate::{Message, Offset, Record, Result};

/// Core trait for message broker implementations.
///
/// A broker stores named topics, each split into a fixed number of
/// partitions. Every partition is an append-only log; records in one
/// partition are delivered in append order, records in different partitions
/// carry no relative ordering. Consumer groups track a committed offset per
/// partition independently of each other.
///
/// Delivery is at-least-once: a group re-reads from its committed offset, so
/// anything fetched but not committed is delivered again.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Appends a message to the partition selected by its key.
    ///
    /// Returns the stored record, including its partition and offset.
    async fn publish(&self, topic: &str, message: Message) -> Result<Record>;

    /// Returns the number of partitions of a topic.
    ///
    /// Unknown topics are created with the broker's default partition count.
    async fn partition_count(&self, topic: &str) -> Result<u32>;

    /// Fetches up to `max_records` records for a group, starting at the
    /// group's committed offset for the partition.
    async fn fetch(
        &self,
        group: &str,
        topic: &str,
        partition: u32,
        max_records: usize,
    ) -> Result<Vec<Record>>;

    /// Commits the group's read position: `next` is the offset of the next
    /// record the group will receive.
    async fn commit(&self, group: &str, topic: &str, partition: u32, next: Offset) -> Result<()>;

    /// Returns the group's committed offset (initial if never committed).
    async fn committed_offset(&self, group: &str, topic: &str, partition: u32) -> Result<Offset>;

    /// Returns the offset the next appended record will receive.
    async fn end_offset(&self, topic: &str, partition: u32) -> Result<Offset>;
}

/// Maps a routing key onto a partition.
///
/// Uses 32-bit FNV-1a so the mapping is stable across processes and builds.
pub fn partition_for_key(key: &str, partitions: u32) -> u32 {
    const FNV_OFFSET: u32 = 0x811c_9dc5;
    const FNV_PRIME: u32 = 0x0100_0193;

    if partitions <= 1 {
        return 0;
    }

    let hash = key.bytes().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME)
    });
    hash % partitions
}
