//! Runs a single switchboard node: token handlers on the control channels,
//! liveness tracking of peers and periodic alive announcements, until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use switchboard::broker::{Broker, ControlChannels, ControlKind, Message, Topic};
use switchboard::client::RequestClient;
use switchboard::config::{Settings, load_config};
use switchboard::handlers::{CheckTokenHandler, GetTokenHandler, HandlerChain, TokenAuthority};
use switchboard::lifetime::{AliveAnnouncer, LoggingListener, RegistryLifetimeHandler};
use switchboard::persistence::SledStore;
use switchboard::utils::{BusError, logging};
use tracing::{error, info};
use uuid::Uuid;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("Configuration failed: {}", e);
            return;
        }
    };
    logging::init(&settings.logging.level);

    if let Err(e) = run_node(settings).await {
        error!("Node failed: {}", e);
    }
}

async fn run_node(settings: Settings) -> Result<(), BusError> {
    let broker = Broker::new()?.with_trace_hook(|m: &Message| {
        tracing::trace!(topic = %m.topic, "Publishing");
    });
    let channels = ControlChannels::new(settings.node.namespace.as_str());
    let instance_id = Uuid::new_v4().to_string();

    let store = Arc::new(SledStore::open(&settings.storage.path)?);
    let authority = Arc::new(TokenAuthority::new(store.clone()));

    let token_chain = HandlerChain::new()
        .then(GetTokenHandler::new(&channels, authority.clone(), broker.clone()))
        .then(CheckTokenHandler::new(&channels, authority, broker.clone()));
    let token_pattern = format!("{}:token:*", channels.namespace());
    let _tokens = token_chain.attach(&broker, &token_pattern);

    let alive_interval = Duration::from_secs(settings.registry.alive_interval_secs);
    let lifetime = Arc::new(
        RegistryLifetimeHandler::<String>::new(alive_interval).ignoring(settings.node.id.as_str()),
    );
    lifetime.add_listener(Arc::new(LoggingListener));
    let _lifetime_sub = lifetime.attach(&broker, &channels);
    let _sweep = lifetime.start(broker.runtime())?;

    let requests = RequestClient::new(
        &broker,
        &channels,
        &settings.node.id,
        settings.requests.default_timeout_beats,
    );
    let _heartbeat =
        requests.start_heartbeat(Duration::from_millis(settings.requests.beat_millis))?;

    // Answer discovery requests with this node's announcement.
    let discovery_body = serde_json::to_string(&switchboard::lifetime::Announcement {
        key: settings.node.id.clone(),
        instance_id: instance_id.clone(),
        payload: settings.node.id.clone(),
    })?;
    let discovery_reply = channels.channel(ControlKind::DiscoverResponse);
    let responder = broker.clone();
    let _discovery = broker.subscribe(
        Some(&channels.pattern_for(ControlKind::DiscoverRequest)),
        move |_: &Message| {
            let topic = Topic::new(discovery_reply.as_str(), Uuid::new_v4().to_string());
            responder.publish(Message::new(topic.to_string(), discovery_body.as_str()));
            Ok(())
        },
    );

    let announcer = AliveAnnouncer::start(
        &broker,
        &channels,
        &settings.node.id,
        &instance_id,
        &settings.node.id,
        alive_interval,
    )?;

    info!(
        node = %settings.node.id,
        namespace = %settings.node.namespace,
        instance = %instance_id,
        "Node started"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received. Exiting gracefully.");

    announcer.stop();
    store.flush()?;
    Ok(())
}
