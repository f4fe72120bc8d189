//! # Switchboard
//!
//! `switchboard` is an in-process publish/subscribe fabric with wildcard
//! topic routing, non-blocking dispatch and the plumbing remote transports
//! build on: per-recipient batching, control-channel handler chains with
//! single-use tokens, and liveness tracking of peer registries.
//!
//! ## Core Modules
//!
//! - `broker`: topics, wildcard matching, the subscription registry and the dispatcher.
//! - `queue`: the broadcast queue batching outbound messages per recipient.
//! - `handlers`: ordered control-message handler chains and token issuing/checking.
//! - `lifetime`: up/down tracking of remote registries and alive announcements.
//! - `client`: request/response with heartbeat-driven timeouts.
//! - `config`: layered node configuration.
//! - `persistence`: key/value storage areas backed by sled or memory.
//! - `utils`: error types and logging setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod handlers;
pub mod lifetime;
pub mod persistence;
pub mod queue;
pub mod utils;
