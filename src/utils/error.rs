//! The `error` module defines the error types used within `switchboard`.
//!
//! Publishers and subscribers never see a failure from the matching and
//! dispatch path; these types surface only at setup time (configuration,
//! runtime, storage) and from handlers back into the dispatcher, which logs
//! and isolates them.

use thiserror::Error;

/// Errors raised while setting up or operating the bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// A component that schedules work was created outside a Tokio runtime.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),

    /// A required configuration value is missing or invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Loading configuration sources failed.
    #[error(transparent)]
    ConfigSource(#[from] config::ConfigError),

    /// The storage collaborator failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A payload could not be encoded or decoded.
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Errors raised by a [`KeyValueStore`](crate::persistence::KeyValueStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("value is not valid utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Failure reported by a subscription handler.
///
/// The dispatcher logs it together with the handler identity and the topic;
/// it never reaches the publisher.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        Self(format!("payload decoding failed: {e}"))
    }
}

impl From<StoreError> for HandlerError {
    fn from(e: StoreError) -> Self {
        Self(e.to_string())
    }
}

/// Result returned by subscription handlers.
pub type HandlerResult = Result<(), HandlerError>;
