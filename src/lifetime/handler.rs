//! Registry lifetime handler
//!
//! Per peer key the state moves `Unknown → Up → Down → Up`:
//! - any alive, discovery-response, subscribe-response or subscribe-trigger
//!   signal for an untracked key, or carrying a new instance id, marks the
//!   peer up; subscribe-trigger only refreshes bookkeeping and never fires
//!   the up event
//! - a shutdown signal, or a sweep finding no activity for twice the alive
//!   interval, marks it down
//!
//! Events are fired synchronously on whichever thread noticed the
//! transition, after the registry lock has been released.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::broker::{Broker, ControlChannels, ControlKind, Message, RoutingOptions, SubscriptionHandle, Topic};
use crate::lifetime::announcer::Announcement;
use crate::lifetime::remote_registry::{RemoteRegistry, Upsert};
use crate::utils::{BusError, HandlerError};

/// Liveness signal received from a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    Alive,
    DiscoveryResponse,
    SubscribeResponse,
    SubscribeTrigger,
    Shutdown,
}

impl Signal {
    pub fn from_kind(kind: ControlKind) -> Option<Self> {
        match kind {
            ControlKind::RegistryAlive => Some(Self::Alive),
            ControlKind::DiscoverResponse => Some(Self::DiscoveryResponse),
            ControlKind::SubscribeResponse => Some(Self::SubscribeResponse),
            ControlKind::SubscribeTrigger => Some(Self::SubscribeTrigger),
            ControlKind::RegistryShutdown => Some(Self::Shutdown),
            _ => None,
        }
    }

    fn notifies(self) -> bool {
        !matches!(self, Self::SubscribeTrigger)
    }
}

/// Receives up/down transitions.
pub trait LifetimeListener<T>: Send + Sync {
    fn registry_up(&self, key: &str, payload: &T, reason: Signal);

    fn registry_down(&self, key: &str, payload: &T);
}

/// Listener that only logs transitions.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingListener;

impl<T> LifetimeListener<T> for LoggingListener {
    fn registry_up(&self, key: &str, _payload: &T, reason: Signal) {
        info!(registry = key, ?reason, "Registry up");
    }

    fn registry_down(&self, key: &str, _payload: &T) {
        info!(registry = key, "Registry down");
    }
}

pub struct RegistryLifetimeHandler<T> {
    registry: RemoteRegistry<T>,
    alive_interval: Duration,
    listeners: RwLock<Vec<Arc<dyn LifetimeListener<T>>>>,
    local_key: Option<String>,
    sweeping: AtomicBool,
}

impl<T> RegistryLifetimeHandler<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(alive_interval: Duration) -> Self {
        Self {
            registry: RemoteRegistry::new(),
            alive_interval,
            listeners: RwLock::new(Vec::new()),
            local_key: None,
            sweeping: AtomicBool::new(false),
        }
    }

    /// Ignore signals carrying `key`, typically this node's own announcements.
    pub fn ignoring(mut self, key: impl Into<String>) -> Self {
        self.local_key = Some(key.into());
        self
    }

    pub fn add_listener(&self, listener: Arc<dyn LifetimeListener<T>>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn registry(&self) -> &RemoteRegistry<T> {
        &self.registry
    }

    /// Idle time after which a peer is considered down; also the sweep period.
    /// Saturates at `Duration::MAX`.
    pub fn liveness_window(&self) -> Duration {
        self.alive_interval.checked_mul(2).unwrap_or(Duration::MAX)
    }

    pub fn on_signal(&self, key: &str, instance_id: &str, payload: T, signal: Signal) {
        self.on_signal_at(key, instance_id, payload, signal, Utc::now());
    }

    pub fn on_signal_at(
        &self,
        key: &str,
        instance_id: &str,
        payload: T,
        signal: Signal,
        now: DateTime<Utc>,
    ) {
        if self.local_key.as_deref() == Some(key) {
            return;
        }

        if signal == Signal::Shutdown {
            if let Some(entry) = self.registry.remove(key) {
                self.fire_down(key, &entry.payload);
            }
            return;
        }

        let outcome = self.registry.upsert(key, instance_id, payload.clone(), now);
        trace!(registry = key, ?signal, ?outcome, "Registry signal");
        match outcome {
            Upsert::Added | Upsert::Restarted if signal.notifies() => {
                self.fire_up(key, &payload, signal);
            }
            _ => {}
        }
    }

    /// Drop every peer idle for longer than the liveness window.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    /// Sweep as of `now`. A sweep already in progress makes this a no-op
    /// returning 0.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        if self.sweeping.swap(true, Ordering::AcqRel) {
            debug!("Sweep already running, skipping");
            return 0;
        }
        let _guard = SweepGuard(&self.sweeping);

        let window = chrono::Duration::from_std(self.liveness_window())
            .unwrap_or_else(|_| chrono::Duration::MAX);
        let cutoff = now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC);

        let expired = self.registry.expire(cutoff);
        for (key, entry) in &expired {
            warn!(registry = %key, last_activity = %entry.last_activity, "Registry timed out");
            self.fire_down(key, &entry.payload);
        }
        expired.len()
    }

    /// Run [`sweep`](Self::sweep) every liveness window until the returned
    /// task is dropped or the handler is gone. A zero alive interval is
    /// rejected.
    pub fn start(self: &Arc<Self>, runtime: &Handle) -> Result<SweepTask, BusError> {
        let period = self.liveness_window();
        if period.is_zero() {
            return Err(BusError::Config("alive interval must be positive".into()));
        }
        let weak: Weak<Self> = Arc::downgrade(self);
        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(handler) = weak.upgrade() else {
                    break;
                };
                handler.sweep();
            }
        });
        Ok(SweepTask { task })
    }

    fn listeners(&self) -> Vec<Arc<dyn LifetimeListener<T>>> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn fire_up(&self, key: &str, payload: &T, reason: Signal) {
        for listener in self.listeners() {
            listener.registry_up(key, payload, reason);
        }
    }

    fn fire_down(&self, key: &str, payload: &T) {
        for listener in self.listeners() {
            listener.registry_down(key, payload);
        }
    }
}

impl<T> RegistryLifetimeHandler<T>
where
    T: Clone + DeserializeOwned + Send + Sync + 'static,
{
    /// Subscribe on the alive, shutdown, discovery-response and subscribe
    /// response/trigger channels of `channels`.
    pub fn attach(self: &Arc<Self>, broker: &Broker, channels: &ControlChannels) -> SubscriptionHandle {
        let patterns = [
            ControlKind::RegistryAlive,
            ControlKind::RegistryShutdown,
            ControlKind::DiscoverResponse,
            ControlKind::SubscribeResponse,
            ControlKind::SubscribeTrigger,
        ]
        .map(|kind| channels.pattern_for(kind));

        let handler = self.clone();
        let channels = channels.clone();
        broker.subscribe_with(patterns, RoutingOptions::All, move |message: &Message| {
            let channel = Topic::channel_of(&message.topic);
            let Some(signal) = channels.classify(channel).and_then(Signal::from_kind) else {
                return Ok(());
            };
            let announcement: Announcement<T> = serde_json::from_str(&message.payload)
                .map_err(|e| HandlerError::new(format!("bad {signal:?} announcement: {e}")))?;
            handler.on_signal(
                &announcement.key,
                &announcement.instance_id,
                announcement.payload,
                signal,
            );
            Ok(())
        })
    }
}

struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Periodic sweep; aborted when dropped.
#[derive(Debug)]
pub struct SweepTask {
    task: JoinHandle<()>,
}

impl SweepTask {
    pub fn stop(self) {}
}

impl Drop for SweepTask {
    fn drop(&mut self) {
        self.task.abort();
    }
}
