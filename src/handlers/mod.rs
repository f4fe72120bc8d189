//! The `handlers` module routes in-band control messages: an ordered chain of
//! handlers where the first one whose predicate matches takes the message,
//! plus the token issuance and verification handlers built on it.

pub mod chain;
pub mod token;

pub use chain::{ControlHandler, FnHandler, HandlerChain};
pub use token::{Access, CheckTokenHandler, GetTokenHandler, TokenAuthority};
