//! Subscription registry
//!
//! Two independent indices keyed by route pattern: one for typed handlers,
//! one for callback subscriptions. Both sit behind a single `RwLock`.
//! Dispatch takes a [`Snapshot`] under the read lock and releases it before
//! any handler runs, so a handler may subscribe or unsubscribe re-entrantly.
//!
//! Removing the last entry under a pattern removes the pattern key.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::broker::message::RoutingOptions;
use crate::broker::resolver::{HandlerType, TypedRoute};
use crate::broker::subscription::{
    Callback, MATCH_ALL, RouteKind, Subscription, SubscriptionHandle, SubscriptionId,
    route_matches,
};

#[derive(Debug, Default)]
struct Indices {
    typed: HashMap<String, Vec<Arc<TypedRoute>>>,
    callbacks: HashMap<String, Vec<Arc<Subscription>>>,
    typed_by_id: HashMap<SubscriptionId, Arc<TypedRoute>>,
    callbacks_by_id: HashMap<SubscriptionId, Arc<Subscription>>,
}

/// Point-in-time view of everything that matched one topic.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub typed: Vec<Arc<TypedRoute>>,
    pub callbacks: Vec<Arc<Subscription>>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.typed.len() + self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    indices: RwLock<Indices>,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Indices> {
        self.indices.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Indices> {
        self.indices.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn allocate(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Register `callback` under every pattern in `patterns`. An empty set
    /// subscribes to everything.
    pub fn subscribe<I, S>(
        &self,
        patterns: I,
        routing: RoutingOptions,
        callback: Callback,
    ) -> SubscriptionHandle
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut patterns: BTreeSet<String> = patterns.into_iter().map(Into::into).collect();
        if patterns.is_empty() {
            patterns.insert(MATCH_ALL.to_string());
        }

        let id = self.allocate();
        let subscription = Arc::new(Subscription::new(id, patterns, routing, callback));

        let mut indices = self.write();
        for pattern in subscription.patterns() {
            indices
                .callbacks
                .entry(pattern.clone())
                .or_default()
                .push(subscription.clone());
        }
        indices.callbacks_by_id.insert(id, subscription.clone());
        drop(indices);

        debug!(subscription = %id, patterns = ?subscription.patterns(), "Callback subscribed");
        SubscriptionHandle::new(id, RouteKind::Callback)
    }

    /// Register a typed handler under `pattern`.
    pub fn subscribe_typed(
        &self,
        pattern: impl Into<String>,
        handler: HandlerType,
    ) -> SubscriptionHandle {
        let id = self.allocate();
        let route = Arc::new(TypedRoute::new(id, pattern.into(), handler));

        let mut indices = self.write();
        indices
            .typed
            .entry(route.pattern().to_string())
            .or_default()
            .push(route.clone());
        indices.typed_by_id.insert(id, route.clone());
        drop(indices);

        debug!(subscription = %id, pattern = route.pattern(), handler = ?handler, "Typed handler subscribed");
        SubscriptionHandle::new(id, RouteKind::Typed)
    }

    /// Remove the subscription behind `handle`. Returns `false` when it was
    /// not registered (already removed, or never added).
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let removed = match handle.kind() {
            RouteKind::Callback => self.remove_callback(handle.id()),
            RouteKind::Typed => self.remove_typed(handle.id()),
        };
        if removed {
            debug!(subscription = %handle.id(), kind = ?handle.kind(), "Unsubscribed");
        }
        removed
    }

    fn remove_callback(&self, id: SubscriptionId) -> bool {
        let mut indices = self.write();
        let Some(subscription) = indices.callbacks_by_id.remove(&id) else {
            return false;
        };
        for pattern in subscription.patterns() {
            if let Some(list) = indices.callbacks.get_mut(pattern) {
                list.retain(|s| s.id() != id);
                if list.is_empty() {
                    indices.callbacks.remove(pattern);
                }
            }
        }
        drop(indices);

        subscription.detach();
        true
    }

    fn remove_typed(&self, id: SubscriptionId) -> bool {
        let mut indices = self.write();
        let Some(route) = indices.typed_by_id.remove(&id) else {
            return false;
        };
        if let Some(list) = indices.typed.get_mut(route.pattern()) {
            list.retain(|r| r.id() != id);
            if list.is_empty() {
                indices.typed.remove(route.pattern());
            }
        }
        drop(indices);

        route.detach();
        true
    }

    /// Collect every route matching `topic`, ordered by subscription id.
    ///
    /// A callback subscription matched through several of its patterns
    /// appears once.
    pub fn snapshot(&self, topic: &str) -> Snapshot {
        let indices = self.read();

        let mut typed: Vec<Arc<TypedRoute>> = indices
            .typed
            .iter()
            .filter(|(pattern, _)| route_matches(pattern, topic))
            .flat_map(|(_, routes)| routes.iter().cloned())
            .collect();

        let mut seen = HashSet::new();
        let mut callbacks: Vec<Arc<Subscription>> = indices
            .callbacks
            .iter()
            .filter(|(pattern, _)| route_matches(pattern, topic))
            .flat_map(|(_, subs)| subs.iter())
            .filter(|s| seen.insert(s.id()))
            .cloned()
            .collect();
        drop(indices);

        typed.sort_by_key(|r| r.id());
        callbacks.sort_by_key(|s| s.id());
        Snapshot { typed, callbacks }
    }

    /// Look up a live callback subscription.
    pub fn subscription(&self, id: SubscriptionId) -> Option<Arc<Subscription>> {
        self.read().callbacks_by_id.get(&id).cloned()
    }

    /// Number of live subscriptions across both indices.
    pub fn len(&self) -> usize {
        let indices = self.read();
        indices.typed_by_id.len() + indices.callbacks_by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pattern keys currently present in the (typed, callback) indices.
    pub fn patterns(&self) -> (Vec<String>, Vec<String>) {
        let indices = self.read();
        let mut typed: Vec<String> = indices.typed.keys().cloned().collect();
        let mut callbacks: Vec<String> = indices.callbacks.keys().cloned().collect();
        typed.sort();
        callbacks.sort();
        (typed, callbacks)
    }
}
