//! Topic identity
//!
//! A `Topic` names one message: the channel it travels on, a unique message
//! id and the protocol version. Its text form is `channel|message_id|version`
//! with trailing empty fields omitted.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Version assumed when a topic string carries none.
pub const DEFAULT_VERSION: &str = "1.0.0";

const DELIMITER: char = '|';

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic {
    pub channel: String,
    pub message_id: String,
    pub version: String,
}

impl Topic {
    /// Create a topic for `channel` with the default protocol version.
    pub fn new(channel: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self::with_version(channel, message_id, DEFAULT_VERSION)
    }

    pub fn with_version(
        channel: impl Into<String>,
        message_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            message_id: message_id.into(),
            version: version.into(),
        }
    }

    /// Parse the `channel|message_id[|version]` text form.
    ///
    /// Returns `None` when fewer than two segments are present. A missing or
    /// empty third segment yields [`DEFAULT_VERSION`]; segments past the third
    /// are ignored.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.split(DELIMITER);
        let channel = parts.next()?;
        let message_id = parts.next()?;
        let version = parts
            .next()
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_VERSION);

        Some(Self::with_version(channel, message_id, version))
    }

    /// Channel part of a topic string, or the whole string when it is not a
    /// serialized topic.
    pub fn channel_of(text: &str) -> &str {
        match text.split_once(DELIMITER) {
            Some((channel, _)) => channel,
            None => text,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version.is_empty() {
            write!(f, "{}{DELIMITER}{}", self.channel, self.message_id)
        } else {
            write!(
                f,
                "{}{DELIMITER}{}{DELIMITER}{}",
                self.channel, self.message_id, self.version
            )
        }
    }
}
