use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

use crate::broker::message::REPLY_TO;
use crate::broker::{Broker, ControlChannels, Message, SubscriptionHandle, Topic};
use crate::client::heartbeat::Heartbeat;
use crate::utils::BusError;

/// How a request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    Reply(Message),
    Timeout,
    Cancelled,
}

struct Pending {
    channel: String,
    expires_at: u64,
    reply: oneshot::Sender<RequestOutcome>,
}

/// Awaitable side of a request.
#[derive(Debug)]
pub struct PendingRequest {
    id: String,
    outcome: oneshot::Receiver<RequestOutcome>,
}

impl PendingRequest {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn wait(self) -> RequestOutcome {
        self.outcome.await.unwrap_or(RequestOutcome::Cancelled)
    }
}

pub struct RequestClient {
    broker: Broker,
    reply_channel: String,
    default_timeout_beats: u64,
    beat: AtomicU64,
    pending: Mutex<HashMap<String, Pending>>,
    subscription: Mutex<Option<SubscriptionHandle>>,
}

impl RequestClient {
    /// Create a client listening for replies on
    /// `<namespace>:reply:<client_id>|*`.
    pub fn new(
        broker: &Broker,
        channels: &ControlChannels,
        client_id: &str,
        default_timeout_beats: u64,
    ) -> Arc<Self> {
        let client = Arc::new(Self {
            broker: broker.clone(),
            reply_channel: channels.reply(client_id),
            default_timeout_beats,
            beat: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
            subscription: Mutex::new(None),
        });

        let weak: Weak<Self> = Arc::downgrade(&client);
        let pattern = format!("{}|*", client.reply_channel);
        let handle = broker.subscribe(Some(&pattern), move |message: &Message| {
            if let Some(client) = weak.upgrade() {
                client.on_reply(message);
            }
            Ok(())
        });
        *client.subscription() = Some(handle);
        client
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<String, Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscription(&self) -> MutexGuard<'_, Option<SubscriptionHandle>> {
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Topic replies to request `id` must be published on.
    pub fn reply_topic(&self, id: &str) -> String {
        Topic::new(self.reply_channel.as_str(), id).to_string()
    }

    /// Publish `payload` on `channel` and wait at most `timeout_beats` beats
    /// (or the default) for a reply.
    pub fn request(
        &self,
        channel: &str,
        payload: impl Into<String>,
        timeout_beats: Option<u64>,
    ) -> PendingRequest {
        self.request_with(channel, payload, Vec::<(String, String)>::new(), timeout_beats)
    }

    /// [`request`](Self::request) with extra custom properties on the
    /// published message.
    pub fn request_with<I, K, V>(
        &self,
        channel: &str,
        payload: impl Into<String>,
        properties: I,
        timeout_beats: Option<u64>,
    ) -> PendingRequest
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        let expires_at =
            self.beat.load(Ordering::Acquire) + timeout_beats.unwrap_or(self.default_timeout_beats);

        self.pending().insert(
            id.clone(),
            Pending {
                channel: channel.to_string(),
                expires_at,
                reply: tx,
            },
        );

        let topic = Topic::new(channel, id.as_str());
        let message = properties.into_iter().fold(
            Message::new(topic.to_string(), payload).with_property(REPLY_TO, self.reply_topic(&id)),
            |message, (name, value)| message.with_property(name, value),
        );
        let delivered = self.broker.publish(message);
        trace!(request = %id, channel, delivered, expires_at, "Request sent");

        PendingRequest { id, outcome: rx }
    }

    /// Resolve request `id` as cancelled. Returns `false` when it already
    /// completed.
    pub fn cancel(&self, id: &str) -> bool {
        let Some(pending) = self.pending().remove(id) else {
            return false;
        };
        debug!(request = id, channel = %pending.channel, "Request cancelled");
        let _ = pending.reply.send(RequestOutcome::Cancelled);
        true
    }

    /// Advance one beat and time out every request whose deadline passed.
    pub fn tick(&self) -> usize {
        let beat = self.beat.fetch_add(1, Ordering::AcqRel) + 1;
        let expired: Vec<(String, Pending)> = {
            let mut pending = self.pending();
            let ids: Vec<String> = pending
                .iter()
                .filter(|(_, p)| p.expires_at <= beat)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| pending.remove(&id).map(|p| (id, p)))
                .collect()
        };

        for (id, pending) in &expired {
            error!(request = %id, channel = %pending.channel, beat, "Request timed out");
        }
        let count = expired.len();
        for (_, pending) in expired {
            let _ = pending.reply.send(RequestOutcome::Timeout);
        }
        count
    }

    pub fn beats(&self) -> u64 {
        self.beat.load(Ordering::Acquire)
    }

    pub fn pending_count(&self) -> usize {
        self.pending().len()
    }

    /// Drive [`tick`](Self::tick) from a heartbeat with the given period.
    /// The client's own counter stays the only record of elapsed beats.
    pub fn start_heartbeat(self: &Arc<Self>, period: Duration) -> Result<Heartbeat, BusError> {
        let weak = Arc::downgrade(self);
        Heartbeat::start(self.broker.runtime(), period, move || {
            if let Some(client) = weak.upgrade() {
                client.tick();
            }
        })
    }

    fn on_reply(&self, message: &Message) {
        let Some(topic) = message.parsed_topic() else {
            warn!(topic = %message.topic, "Reply on malformed topic");
            return;
        };
        let Some(pending) = self.pending().remove(&topic.message_id) else {
            debug!(request = %topic.message_id, "Reply for unknown or finished request");
            return;
        };
        let _ = pending.reply.send(RequestOutcome::Reply(message.clone()));
    }
}

impl Drop for RequestClient {
    fn drop(&mut self) {
        let handle = self
            .subscription
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            self.broker.unsubscribe(&handle);
        }
    }
}
