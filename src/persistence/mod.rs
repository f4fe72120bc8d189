//! The `persistence` module provides the key/value storage collaborator used
//! by components that must keep small pieces of state outside the process
//! memory of a single handler (for example issued authorization tokens).
//!
//! Two implementations are available: `SledStore`, backed by the `sled`
//! embedded database, and `MemoryStore` for tests and single-process setups.
//! Both apply the same area-name normalization so they can share data with
//! existing stores.

pub mod memory_store;
pub mod sled_store;
pub mod store;

pub use memory_store::MemoryStore;
pub use sled_store::SledStore;
pub use store::{KeyValueStore, normalize_area};

#[cfg(test)]
mod tests;
