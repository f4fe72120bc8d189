//! Periodic alive announcements for the local registry.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::broker::{Broker, ControlChannels, ControlKind, Message, Topic};
use crate::utils::BusError;

/// Body of every alive, shutdown and discovery message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Announcement<T> {
    pub key: String,
    pub instance_id: String,
    pub payload: T,
}

pub struct AliveAnnouncer {
    broker: Broker,
    shutdown_channel: String,
    body: String,
    task: Option<JoinHandle<()>>,
}

impl AliveAnnouncer {
    /// Publish one alive message now and then every `interval`, which must
    /// be positive.
    pub fn start<T: Serialize>(
        broker: &Broker,
        channels: &ControlChannels,
        key: &str,
        instance_id: &str,
        payload: &T,
        interval: Duration,
    ) -> Result<Self, BusError> {
        if interval.is_zero() {
            return Err(BusError::Config("announce interval must be positive".into()));
        }
        let body = serde_json::to_string(&Announcement {
            key: key.to_string(),
            instance_id: instance_id.to_string(),
            payload,
        })?;
        let alive_channel = channels.channel(ControlKind::RegistryAlive);

        let task = {
            let broker = broker.clone();
            let body = body.clone();
            let runtime = broker.runtime().clone();
            runtime.spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    let topic = Topic::new(alive_channel.as_str(), Uuid::new_v4().to_string());
                    let delivered = broker.publish(Message::new(topic.to_string(), body.as_str()));
                    debug!(channel = %alive_channel, delivered, "Alive announced");
                }
            })
        };

        info!(registry = key, instance = instance_id, "Announcing registry");
        Ok(Self {
            broker: broker.clone(),
            shutdown_channel: channels.channel(ControlKind::RegistryShutdown),
            body,
            task: Some(task),
        })
    }

    /// Stop announcing and publish a shutdown message.
    pub fn stop(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        let topic = Topic::new(self.shutdown_channel.as_str(), Uuid::new_v4().to_string());
        self.broker
            .publish(Message::new(topic.to_string(), self.body.as_str()));
        info!(channel = %self.shutdown_channel, "Shutdown announced");
    }
}

impl Drop for AliveAnnouncer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
