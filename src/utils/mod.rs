//! The `utils` module provides utilities shared across the `switchboard`
//! crate: the error types every layer returns and the logging bootstrap.

pub mod error;
pub mod logging;

pub use error::{BusError, HandlerError, HandlerResult, StoreError};
