//! Type-resolved handlers
//!
//! Typed subscriptions store only a [`HandlerType`]; the concrete handler is
//! resolved through a [`HandlerResolver`] each time a message is dispatched,
//! the way a host's service container would hand out instances.

use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::broker::message::Message;
use crate::broker::subscription::SubscriptionId;
use crate::utils::HandlerResult;

/// A handler subscribed by type rather than by closure.
pub trait TopicHandler: Send + Sync + 'static {
    fn handle(&self, message: &Message) -> HandlerResult;
}

/// Identity of a handler type, used as the key into the resolver.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerType {
    id: TypeId,
    name: &'static str,
}

impl HandlerType {
    pub fn of<H: TopicHandler>() -> Self {
        Self {
            id: TypeId::of::<H>(),
            name: type_name::<H>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for HandlerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Supplies handler instances for typed subscriptions at dispatch time.
pub trait HandlerResolver: Send + Sync {
    fn resolve(&self, handler: &HandlerType) -> Option<Arc<dyn TopicHandler>>;
}

type Factory = Arc<dyn Fn() -> Arc<dyn TopicHandler> + Send + Sync>;

/// Minimal resolver mapping handler types to factories.
#[derive(Default)]
pub struct ServiceRegistry {
    factories: RwLock<HashMap<TypeId, Factory>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory producing a fresh handler per dispatch.
    pub fn register<H, F>(&self, factory: F)
    where
        H: TopicHandler,
        F: Fn() -> H + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move || Arc::new(factory()) as Arc<dyn TopicHandler>);
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(TypeId::of::<H>(), factory);
    }

    /// Register one shared instance handed out on every dispatch.
    pub fn register_instance<H: TopicHandler>(&self, instance: Arc<H>) {
        let factory: Factory = Arc::new(move || instance.clone() as Arc<dyn TopicHandler>);
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(TypeId::of::<H>(), factory);
    }
}

impl HandlerResolver for ServiceRegistry {
    fn resolve(&self, handler: &HandlerType) -> Option<Arc<dyn TopicHandler>> {
        let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);
        factories.get(&handler.id).map(|factory| factory())
    }
}

/// Entry of the typed-handler index.
#[derive(Debug)]
pub struct TypedRoute {
    id: SubscriptionId,
    pattern: String,
    handler: HandlerType,
    active: AtomicBool,
}

impl TypedRoute {
    pub(crate) fn new(id: SubscriptionId, pattern: String, handler: HandlerType) -> Self {
        Self {
            id,
            pattern,
            handler,
            active: AtomicBool::new(true),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn handler(&self) -> HandlerType {
        self.handler
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn detach(&self) {
        self.active.store(false, Ordering::Release);
    }
}
