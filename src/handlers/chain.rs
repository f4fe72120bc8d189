//! Chain of responsibility for control messages
//!
//! Handlers are held in an ordered list. `handle` runs the first handler
//! whose predicate matches and stops there; a message nobody claims is
//! dropped silently.

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::broker::topic::DEFAULT_VERSION;
use crate::broker::{Broker, Message, SubscriptionHandle};

pub trait ControlHandler: Send + Sync {
    /// Whether this handler claims the message. Must not have side effects.
    fn can_handle_this(&self, version: &str, message: &Message) -> bool;

    fn handle_this(&self, version: &str, message: &Message);

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Handler assembled from a predicate and an action.
pub struct FnHandler<P, A> {
    name: String,
    predicate: P,
    action: A,
}

impl<P, A> FnHandler<P, A>
where
    P: Fn(&str, &Message) -> bool + Send + Sync,
    A: Fn(&str, &Message) + Send + Sync,
{
    pub fn new(name: impl Into<String>, predicate: P, action: A) -> Self {
        Self {
            name: name.into(),
            predicate,
            action,
        }
    }
}

impl<P, A> ControlHandler for FnHandler<P, A>
where
    P: Fn(&str, &Message) -> bool + Send + Sync,
    A: Fn(&str, &Message) + Send + Sync,
{
    fn can_handle_this(&self, version: &str, message: &Message) -> bool {
        (self.predicate)(version, message)
    }

    fn handle_this(&self, version: &str, message: &Message) {
        (self.action)(version, message)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Clone, Default)]
pub struct HandlerChain {
    handlers: Vec<Arc<dyn ControlHandler>>,
}

impl HandlerChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` at the end of the chain.
    pub fn then<H: ControlHandler + 'static>(mut self, handler: H) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn push(&mut self, handler: Arc<dyn ControlHandler>) {
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn can_handle(&self, version: &str, message: &Message) -> bool {
        self.handlers
            .iter()
            .any(|h| h.can_handle_this(version, message))
    }

    /// Run the first matching handler. Returns whether one ran.
    pub fn handle(&self, version: &str, message: &Message) -> bool {
        match self
            .handlers
            .iter()
            .find(|h| h.can_handle_this(version, message))
        {
            Some(handler) => {
                trace!(handler = handler.name(), topic = %message.topic, "Control message handled");
                handler.handle_this(version, message);
                true
            }
            None => {
                trace!(topic = %message.topic, "Control message unhandled");
                false
            }
        }
    }

    /// Subscribe the chain on `broker` for `pattern`. The protocol version is
    /// taken from the message topic, defaulting to `1.0.0`.
    pub fn attach(self, broker: &Broker, pattern: &str) -> SubscriptionHandle {
        broker.subscribe(Some(pattern), move |message: &Message| {
            let version = message
                .parsed_topic()
                .map(|t| t.version)
                .unwrap_or_else(|| DEFAULT_VERSION.to_string());
            self.handle(&version, message);
            Ok(())
        })
    }
}

impl fmt::Debug for HandlerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.handlers.iter().map(|h| h.name()))
            .finish()
    }
}
