//! Message definitions for the broker
//!
//! `Message` is the envelope every publish carries. It is wrapped in an
//! `Arc` as soon as it enters the broker and is never mutated afterwards, so
//! one instance can be handed to any number of concurrent handlers.
//!
//! Notes on fields:
//! - `topic`: routing text matched against subscription patterns; usually a
//!   serialized [`Topic`]
//! - `payload`: message body as a String (JSON by convention)
//! - `custom_properties`: ordered name/value pairs, e.g. `replyTo`
//! - `timestamp`: milliseconds since UNIX epoch, stamped at construction

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::broker::topic::Topic;

/// Custom property naming the channel a reply should be published on.
pub const REPLY_TO: &str = "replyTo";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub topic: String,
    pub payload: String,
    #[serde(default)]
    pub custom_properties: Vec<(String, String)>,
    pub timestamp: i64,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            custom_properties: Vec::new(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Append a custom property, keeping insertion order.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_properties.push((name.into(), value.into()));
        self
    }

    /// First value recorded for `name`, if any.
    pub fn property(&self, name: &str) -> Option<&str> {
        self.custom_properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn reply_to(&self) -> Option<&str> {
        self.property(REPLY_TO)
    }

    /// The structured topic, when `topic` is in `channel|id|version` form.
    pub fn parsed_topic(&self) -> Option<Topic> {
        Topic::parse(&self.topic)
    }
}

/// Delivery scope of a subscription or broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RoutingOptions {
    /// Deliver to every matching recipient.
    #[default]
    All,
    /// Deliver to the single recipient named by the broadcast's key.
    Targeted,
}

/// One fan-out target produced for the broadcast queue.
#[derive(Debug, Clone)]
pub struct BroadcastMessage {
    pub topic: Topic,
    pub message: Arc<Message>,
    pub recipient_key: String,
    pub routing: RoutingOptions,
}

impl BroadcastMessage {
    pub fn new(
        topic: Topic,
        message: Arc<Message>,
        recipient_key: impl Into<String>,
        routing: RoutingOptions,
    ) -> Self {
        Self {
            topic,
            message,
            recipient_key: recipient_key.into(),
            routing,
        }
    }
}
