//! Broadcast queue
//!
//! Producers append [`BroadcastMessage`]s from any thread. A single drain
//! loop swaps the pending list out, groups it by recipient key and hands
//! each group to the batch processor, in enqueue order per recipient.
//!
//! Invariants:
//! - at most one drain loop runs at a time; the `draining` flag is only read
//!   and written under the same lock as the pending list, so an item pushed
//!   while a loop is finishing is either swapped out by that loop or starts
//!   a new one
//! - a panicking processor is logged and the loop carries on
//! - if the loop itself unwinds, its guard clears the flag, or starts a
//!   replacement loop when items are still pending

use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tracing::{debug, error, trace};

use crate::broker::engine::panic_message;
use crate::broker::{Broker, BroadcastMessage, Message, RoutingOptions, SubscriptionHandle, Topic};

/// Receives every batch for one recipient key.
pub type BatchProcessor = Arc<dyn Fn(&str, Vec<BroadcastMessage>) + Send + Sync>;

#[derive(Default)]
struct State {
    pending: Vec<BroadcastMessage>,
    draining: bool,
}

struct Shared {
    state: Mutex<State>,
    processor: BatchProcessor,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone)]
pub struct BroadcastQueue {
    shared: Arc<Shared>,
    runtime: Handle,
}

impl BroadcastQueue {
    pub fn new<F>(runtime: Handle, processor: F) -> Self
    where
        F: Fn(&str, Vec<BroadcastMessage>) + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                processor: Arc::new(processor),
            }),
            runtime,
        }
    }

    /// Append `item`, starting the drain loop if none is running.
    pub fn enqueue(&self, item: BroadcastMessage) {
        let start = {
            let mut state = self.shared.lock();
            state.pending.push(item);
            !mem::replace(&mut state.draining, true)
        };
        if start {
            spawn_drain(self.shared.clone(), self.runtime.clone());
        }
    }

    /// Enqueue one copy of `message` per recipient.
    pub fn fan_out<I, S>(
        &self,
        topic: &Topic,
        message: Arc<Message>,
        recipients: I,
        routing: RoutingOptions,
    ) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut count = 0;
        for recipient in recipients {
            self.enqueue(BroadcastMessage::new(
                topic.clone(),
                message.clone(),
                recipient,
                routing,
            ));
            count += 1;
        }
        count
    }

    /// Feed messages published on `pattern` into this queue. `recipients`
    /// names the keys each message goes to.
    pub fn attach<F>(
        &self,
        broker: &Broker,
        pattern: &str,
        routing: RoutingOptions,
        recipients: F,
    ) -> SubscriptionHandle
    where
        F: Fn(&Message) -> Vec<String> + Send + Sync + 'static,
    {
        let queue = self.clone();
        broker.subscribe(Some(pattern), move |message: &Message| {
            let topic = message
                .parsed_topic()
                .unwrap_or_else(|| Topic::new(message.topic.as_str(), ""));
            queue.fan_out(&topic, Arc::new(message.clone()), recipients(message), routing);
            Ok(())
        })
    }

    /// Items waiting for the next drain iteration.
    pub fn pending(&self) -> usize {
        self.shared.lock().pending.len()
    }

    pub fn is_draining(&self) -> bool {
        self.shared.lock().draining
    }
}

impl fmt::Debug for BroadcastQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("BroadcastQueue")
            .field("pending", &state.pending.len())
            .field("draining", &state.draining)
            .finish()
    }
}

fn spawn_drain(shared: Arc<Shared>, runtime: Handle) {
    trace!("Starting broadcast drain loop");
    let handle = runtime.clone();
    handle.spawn_blocking(move || drain(DrainGuard::new(shared, runtime)));
}

fn drain(mut guard: DrainGuard) {
    loop {
        let batch = {
            let mut state = guard.shared.lock();
            if state.pending.is_empty() {
                state.draining = false;
                guard.finished = true;
                return;
            }
            mem::take(&mut state.pending)
        };

        debug!(items = batch.len(), "Draining broadcast batch");
        for (recipient, items) in group_by_recipient(batch) {
            let processor = &guard.shared.processor;
            let count = items.len();
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| processor(&recipient, items))) {
                error!(
                    recipient = %recipient,
                    items = count,
                    reason = panic_message(panic.as_ref()),
                    "Batch processor panicked"
                );
            }
        }
    }
}

/// Split a batch by recipient key. Groups appear in first-seen order and
/// keep the enqueue order of their items.
pub(crate) fn group_by_recipient(batch: Vec<BroadcastMessage>) -> Vec<(String, Vec<BroadcastMessage>)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<BroadcastMessage>)> = Vec::new();
    for item in batch {
        match index.get(&item.recipient_key) {
            Some(&i) => groups[i].1.push(item),
            None => {
                index.insert(item.recipient_key.clone(), groups.len());
                groups.push((item.recipient_key.clone(), vec![item]));
            }
        }
    }
    groups
}

/// Owns the drain loop's claim on the `draining` flag.
struct DrainGuard {
    shared: Arc<Shared>,
    runtime: Handle,
    finished: bool,
}

impl DrainGuard {
    fn new(shared: Arc<Shared>, runtime: Handle) -> Self {
        Self {
            shared,
            runtime,
            finished: false,
        }
    }
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let restart = {
            let mut state = self.shared.lock();
            if state.pending.is_empty() {
                state.draining = false;
                false
            } else {
                true
            }
        };
        error!(restart, "Broadcast drain loop exited unexpectedly");
        if restart {
            spawn_drain(self.shared.clone(), self.runtime.clone());
        }
    }
}

