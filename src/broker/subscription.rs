//! Subscriptions and their handles
//!
//! A `Subscription` binds one callback to a set of patterns. Patterns are
//! OR-combined: the subscription fires when any of them matches. Once
//! detached the callback reference is dropped.
//!
//! `invoke` checks the active flag on entry and again right before calling,
//! without holding a lock across the call so a handler may unsubscribe
//! itself. A delivery that passed the second check when `unsubscribe` runs
//! still completes: at most the deliveries already in flight finish after
//! `unsubscribe` returns, and none starts later.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::broker::message::{Message, RoutingOptions};
use crate::broker::wildcard;
use crate::utils::HandlerResult;

/// Pattern that matches every topic.
pub const MATCH_ALL: &str = "*";

/// Closure invoked for every matching message.
pub type Callback = Arc<dyn Fn(&Message) -> HandlerResult + Send + Sync>;

/// Registry-assigned identity of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Which index a handle lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteKind {
    Typed,
    Callback,
}

/// Opaque token returned by subscribe calls and accepted by unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    kind: RouteKind,
}

impl SubscriptionHandle {
    pub(crate) fn new(id: SubscriptionId, kind: RouteKind) -> Self {
        Self { id, kind }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn kind(&self) -> RouteKind {
        self.kind
    }
}

/// True when `pattern` selects `topic`: the match-all pattern, an exact
/// string match, or a wildcard match.
pub fn route_matches(pattern: &str, topic: &str) -> bool {
    pattern == MATCH_ALL || pattern == topic || wildcard::is_match(topic, pattern)
}

pub struct Subscription {
    id: SubscriptionId,
    patterns: BTreeSet<String>,
    routing: RoutingOptions,
    callback: Mutex<Option<Callback>>,
    active: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriptionId,
        patterns: BTreeSet<String>,
        routing: RoutingOptions,
        callback: Callback,
    ) -> Self {
        Self {
            id,
            patterns,
            routing,
            callback: Mutex::new(Some(callback)),
            active: AtomicBool::new(true),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn patterns(&self) -> &BTreeSet<String> {
        &self.patterns
    }

    pub fn routing(&self) -> RoutingOptions {
        self.routing
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn is_topic_match(&self, topic: &str) -> bool {
        self.patterns.iter().any(|p| route_matches(p, topic))
    }

    /// Run the callback. Returns `None` when the subscription was detached
    /// before the call started.
    pub fn invoke(&self, message: &Message) -> Option<HandlerResult> {
        if !self.is_active() {
            return None;
        }
        let callback = self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()?;
        if !self.is_active() {
            return None;
        }
        Some(callback(message))
    }

    /// Deactivate and release the callback. Idempotent.
    pub(crate) fn detach(&self) {
        self.active.store(false, Ordering::Release);
        self.callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("patterns", &self.patterns)
            .field("routing", &self.routing)
            .field("active", &self.is_active())
            .finish()
    }
}
