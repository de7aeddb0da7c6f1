use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::context::CORRELATION_ID_HEADER;

/// Position of a record within a partition.
///
/// Offsets start at 0 for the first record appended to a partition. A
/// committed offset names the *next* record a consumer group will read.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Offset(u64);

impl Offset {
    /// Creates an offset from a raw value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the offset of the first record in a partition.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the following offset.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw offset value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Offset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Offset {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// A message as handed to the broker by a producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Routing key; all messages with the same key land on the same partition.
    pub key: String,

    /// The type of the payload (e.g., "DeliveryCreated").
    pub event_type: String,

    /// The payload as JSON.
    pub payload: serde_json::Value,

    /// Free-form string headers (correlation id, dead-letter provenance, ...).
    pub headers: BTreeMap<String, String>,
}

impl Message {
    /// Creates a message from a raw JSON payload.
    pub fn new(
        key: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            key: key.into(),
            event_type: event_type.into(),
            payload,
            headers: BTreeMap::new(),
        }
    }

    /// Creates a message by serializing an event payload.
    pub fn from_event<T: Serialize + ?Sized>(
        key: impl Into<String>,
        event_type: impl Into<String>,
        event: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(key, event_type, serde_json::to_value(event)?))
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Stamps the correlation id header.
    pub fn with_correlation_id(self, correlation_id: Uuid) -> Self {
        self.with_header(CORRELATION_ID_HEADER, correlation_id.to_string())
    }
}

/// A message after it has been appended to a partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub topic: String,
    pub partition: u32,
    pub offset: Offset,
    pub key: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub headers: BTreeMap<String, String>,

    /// When the broker appended the record.
    pub timestamp: DateTime<Utc>,
}

impl Record {
    /// Deserializes the payload into a typed event.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    /// Returns a header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Returns the correlation id stamped by the producer, if any.
    pub fn correlation_id(&self) -> Option<Uuid> {
        self.header(CORRELATION_ID_HEADER)
            .and_then(|v| Uuid::parse_str(v).ok())
    }

    /// Converts the record back into a publishable message, keeping key,
    /// type, payload and headers.
    pub fn to_message(&self) -> Message {
        Message {
            key: self.key.clone(),
            event_type: self.event_type.clone(),
            payload: self.payload.clone(),
            headers: self.headers.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_ordering() {
        let o0 = Offset::initial();
        let o1 = o0.next();
        assert!(o0 < o1);
        assert_eq!(o1.as_u64(), 1);
    }

    #[test]
    fn from_event_accepts_unsized_payloads() {
        let ids = [1, 2, 3];
        let message = Message::from_event("k", "Batch", &ids[..]).unwrap();
        assert_eq!(message.payload, serde_json::json!([1, 2, 3]));
        assert_eq!(message.event_type, "Batch");
    }

    #[test]
    fn message_carries_correlation_id_into_record() {
        let correlation_id = Uuid::new_v4();
        let message = Message::new("100", "TestEvent", serde_json::json!({"n": 1}))
            .with_correlation_id(correlation_id);

        let record = Record {
            topic: "t".to_string(),
            partition: 0,
            offset: Offset::initial(),
            key: message.key.clone(),
            event_type: message.event_type.clone(),
            payload: message.payload.clone(),
            headers: message.headers.clone(),
            timestamp: Utc::now(),
        };

        assert_eq!(record.correlation_id(), Some(correlation_id));
        assert_eq!(record.to_message(), message);
    }

    #[test]
    fn decode_reports_shape_mismatch() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Expected {
            id: i64,
        }

        let record = Record {
            topic: "t".to_string(),
            partition: 0,
            offset: Offset::initial(),
            key: "k".to_string(),
            event_type: "Other".to_string(),
            payload: serde_json::json!({"unexpected": true}),
            headers: BTreeMap::new(),
            timestamp: Utc::now(),
        };

        assert!(record.decode::<Expected>().is_err());
    }
}
