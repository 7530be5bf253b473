use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Topic of events carrying an embedded allocation.
pub const ALLOCATION_TOPIC: &str = "Allocation";
/// Event type emitted whenever an allocation changes.
pub const ALLOCATION_UPDATED_TYPE: &str = "AllocationUpdated";

/// Stable identity of a Nomad event.
///
/// Derived from the fields that identify one event in the Nomad event stream,
/// so a redelivered event always maps to the same uid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventUid([u8; 32]);

impl EventUid {
    pub fn derive(topic: &str, event_type: &str, key: &str, index: u64) -> Self {
        let mut hasher = Sha256::new();
        for part in [topic, event_type, key] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(index.to_be_bytes());
        Self(hasher.finalize().into())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for EventUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for EventUid {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| CoreError::InvalidEventUid(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for EventUid {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EventUid> for String {
    fn from(uid: EventUid) -> Self {
        uid.to_hex()
    }
}

/// One event from the Nomad event stream.
///
/// Everything except `handled` is immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NomadEvent {
    pub uid: EventUid,
    pub topic: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub key: String,
    #[serde(default)]
    pub filter_keys: Vec<String>,
    pub index: u64,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub handled: bool,
}

impl NomadEvent {
    pub fn new(
        topic: impl Into<String>,
        event_type: impl Into<String>,
        key: impl Into<String>,
        index: u64,
        payload: serde_json::Value,
    ) -> Self {
        let topic = topic.into();
        let event_type = event_type.into();
        let key = key.into();
        Self {
            uid: EventUid::derive(&topic, &event_type, &key, index),
            topic,
            event_type,
            key,
            filter_keys: Vec::new(),
            index,
            payload,
            handled: false,
        }
    }

    pub fn with_filter_keys(mut self, filter_keys: Vec<String>) -> Self {
        self.filter_keys = filter_keys;
        self
    }
}
