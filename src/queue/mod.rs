//! The `queue` module holds the per-recipient batching pipeline that sits
//! between the broker and transports which must deliver to each recipient in
//! order.

pub mod broadcast;

pub use broadcast::{BatchProcessor, BroadcastQueue};
