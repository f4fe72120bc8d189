//! Broker engine
//!
//! This module contains the in-process dispatcher responsible for:
//! - registering callback and typed subscriptions
//! - resolving the subscriptions matching a published topic
//! - running each matched handler as its own unit of work
//!
//! Concurrency and usage notes:
//! - `publish` never waits for handlers. It runs the trace hook, snapshots
//!   the matching routes and schedules one blocking-pool task per delivery,
//!   then returns.
//! - A handler that fails or panics is logged with its identity and the
//!   topic; its siblings still run and the publisher never sees the error.
//! - No ordering is promised between subscriptions or between successive
//!   deliveries to one subscription. Use the broadcast queue when a
//!   transport needs per-recipient ordering.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{debug, error, trace, warn};

use crate::broker::message::{Message, RoutingOptions};
use crate::broker::registry::SubscriptionRegistry;
use crate::broker::resolver::{HandlerResolver, HandlerType, TopicHandler, TypedRoute};
use crate::broker::subscription::{Callback, MATCH_ALL, Subscription, SubscriptionHandle};
use crate::utils::{BusError, HandlerResult};

/// Hook run synchronously on the publisher's thread before dispatch.
pub type TraceHook = Arc<dyn Fn(&Message) + Send + Sync>;

#[derive(Clone)]
pub struct Broker {
    registry: Arc<SubscriptionRegistry>,
    resolver: Option<Arc<dyn HandlerResolver>>,
    trace_hook: Option<TraceHook>,
    runtime: Handle,
}

impl Broker {
    /// Create a broker bound to the current Tokio runtime.
    pub fn new() -> Result<Self, BusError> {
        let runtime = Handle::try_current().map_err(|e| BusError::NoRuntime(e.to_string()))?;
        Ok(Self::with_handle(runtime))
    }

    /// Create a broker that schedules deliveries on `runtime`.
    pub fn with_handle(runtime: Handle) -> Self {
        Self {
            registry: Arc::new(SubscriptionRegistry::new()),
            resolver: None,
            trace_hook: None,
            runtime,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn HandlerResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_trace_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.trace_hook = Some(Arc::new(hook));
        self
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    /// Subscribe `callback` to `pattern`; `None` subscribes to every topic.
    pub fn subscribe<F>(&self, pattern: Option<&str>, callback: F) -> SubscriptionHandle
    where
        F: Fn(&Message) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe_with(
            [pattern.unwrap_or(MATCH_ALL)],
            RoutingOptions::All,
            callback,
        )
    }

    /// Subscribe one callback to several patterns at once.
    pub fn subscribe_with<I, S, F>(
        &self,
        patterns: I,
        routing: RoutingOptions,
        callback: F,
    ) -> SubscriptionHandle
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&Message) -> HandlerResult + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(callback);
        self.registry.subscribe(patterns, routing, callback)
    }

    /// Subscribe handler type `H`, resolved through the resolver at dispatch.
    pub fn subscribe_typed<H: TopicHandler>(&self, pattern: Option<&str>) -> SubscriptionHandle {
        if self.resolver.is_none() {
            warn!(
                handler = std::any::type_name::<H>(),
                "Typed subscription registered on a broker without a resolver"
            );
        }
        self.registry
            .subscribe_typed(pattern.unwrap_or(MATCH_ALL), HandlerType::of::<H>())
    }

    /// Remove a subscription. Unknown or already removed handles are ignored.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        self.registry.unsubscribe(handle)
    }

    /// Publish `message` to every matching subscription.
    ///
    /// Returns once the deliveries are scheduled, with their count.
    pub fn publish(&self, message: Message) -> usize {
        if let Some(hook) = &self.trace_hook {
            hook(&message);
        }

        let snapshot = self.registry.snapshot(&message.topic);
        if snapshot.is_empty() {
            trace!(topic = %message.topic, "No subscribers for topic");
            return 0;
        }

        let scheduled = snapshot.len();
        let message = Arc::new(message);

        for subscription in snapshot.callbacks {
            let message = message.clone();
            self.runtime
                .spawn_blocking(move || deliver_callback(&subscription, &message));
        }

        for route in snapshot.typed {
            let message = message.clone();
            let resolver = self.resolver.clone();
            self.runtime
                .spawn_blocking(move || deliver_typed(resolver.as_deref(), &route, &message));
        }

        debug!(topic = %message.topic, deliveries = scheduled, "Message published");
        scheduled
    }

    /// Publish `payload` on the reply topic named by `request`'s `replyTo`
    /// property. Returns `None` when the request carries no reply topic.
    pub fn reply(&self, request: &Message, payload: impl Into<String>) -> Option<usize> {
        let Some(reply_to) = request.reply_to() else {
            warn!(topic = %request.topic, "Request has no reply topic");
            return None;
        };
        Some(self.publish(Message::new(reply_to, payload)))
    }
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("subscriptions", &self.registry.len())
            .field("resolver", &self.resolver.is_some())
            .field("trace_hook", &self.trace_hook.is_some())
            .finish()
    }
}

fn deliver_callback(subscription: &Subscription, message: &Message) {
    let outcome = catch_unwind(AssertUnwindSafe(|| subscription.invoke(message)));
    let handler = subscription.id().to_string();
    match outcome {
        Ok(Some(result)) => report(&handler, message, result),
        Ok(None) => trace!(handler = %handler, topic = %message.topic, "Skipped detached subscription"),
        Err(panic) => report_panic(&handler, message, panic),
    }
}

fn deliver_typed(resolver: Option<&dyn HandlerResolver>, route: &TypedRoute, message: &Message) {
    if !route.is_active() {
        return;
    }
    let handler_type = route.handler();
    let handler = format!("{}#{}", handler_type.name(), route.id());

    let Some(instance) = resolver.and_then(|r| r.resolve(&handler_type)) else {
        warn!(handler, topic = %message.topic, "Could not resolve typed handler");
        return;
    };

    match catch_unwind(AssertUnwindSafe(|| instance.handle(message))) {
        Ok(result) => report(&handler, message, result),
        Err(panic) => report_panic(&handler, message, panic),
    }
}

fn report(handler: &str, message: &Message, result: HandlerResult) {
    if let Err(e) = result {
        error!(handler, topic = %message.topic, error = %e, "Handler failed");
    }
}

fn report_panic(handler: &str, message: &Message, panic: Box<dyn Any + Send>) {
    let reason = panic_message(panic.as_ref());
    error!(handler, topic = %message.topic, reason, "Handler panicked");
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
