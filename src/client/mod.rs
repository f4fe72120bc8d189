//! Request/response on top of the broker.
//!
//! A request carries a `replyTo` property naming a topic under the client's
//! reply channel. Pending requests are expired by counting heartbeat beats.

pub mod heartbeat;
pub mod request;

pub use heartbeat::Heartbeat;
pub use request::{PendingRequest, RequestClient, RequestOutcome};

#[cfg(test)]
mod tests;
