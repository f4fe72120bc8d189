use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use switchboard::broker::{
    BroadcastMessage, Broker, ControlChannels, ControlKind, Message, RoutingOptions, Topic,
};
use switchboard::client::{RequestClient, RequestOutcome};
use switchboard::handlers::token::{REQUESTER, TokenCheck, TokenRequest};
use switchboard::handlers::{Access, CheckTokenHandler, GetTokenHandler, HandlerChain, TokenAuthority};
use switchboard::lifetime::{AliveAnnouncer, LifetimeListener, RegistryLifetimeHandler, Signal};
use switchboard::persistence::MemoryStore;
use switchboard::queue::BroadcastQueue;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(3);

#[tokio::test(flavor = "multi_thread")]
async fn exact_and_match_all_subscribers_both_receive() {
    let broker = Broker::new().unwrap();
    let (exact_tx, mut exact_rx) = mpsc::unbounded_channel();
    let (all_tx, mut all_rx) = mpsc::unbounded_channel();

    broker.subscribe(Some("orders|42|1.0.0"), move |m: &Message| {
        let _ = exact_tx.send(m.payload.clone());
        Ok(())
    });
    broker.subscribe(None, move |m: &Message| {
        let _ = all_tx.send(m.topic.clone());
        Ok(())
    });

    let topic = Topic::new("orders", "42");
    assert_eq!(broker.publish(Message::new(topic.to_string(), "created")), 2);

    let payload = timeout(WAIT, exact_rx.recv()).await.unwrap().unwrap();
    assert_eq!(payload, "created");
    let seen = timeout(WAIT, all_rx.recv()).await.unwrap().unwrap();
    assert_eq!(seen, "orders|42|1.0.0");
}

#[tokio::test(flavor = "multi_thread")]
async fn publish_returns_before_slow_handler_finishes() {
    let broker = Broker::new().unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    broker.subscribe(Some("slow|*"), move |_: &Message| {
        std::thread::sleep(Duration::from_millis(300));
        let _ = tx.send(());
        Ok(())
    });

    let started = Instant::now();
    broker.publish(Message::new("slow|1", "x"));
    assert!(started.elapsed() < Duration::from_millis(200));

    timeout(WAIT, rx.recv()).await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn broadcast_queue_batches_per_recipient_behind_broker() {
    let broker = Broker::new().unwrap();
    let batches: Arc<Mutex<Vec<(String, Vec<String>)>>> = Arc::default();
    let sink = batches.clone();
    let queue = BroadcastQueue::new(broker.runtime().clone(), move |key: &str, items: Vec<BroadcastMessage>| {
        let payloads = items
            .iter()
            .map(|item| item.message.payload.clone())
            .collect();
        sink.lock().unwrap().push((key.to_string(), payloads));
    });
    let _sub = queue.attach(&broker, "feed|*", RoutingOptions::All, |_| {
        vec!["east".to_string(), "west".to_string()]
    });

    for n in 0..5 {
        broker.publish(Message::new(Topic::new("feed", n.to_string()).to_string(), n.to_string()));
    }

    let deadline = Instant::now() + WAIT;
    loop {
        let delivered: usize = batches.lock().unwrap().iter().map(|(_, p)| p.len()).sum();
        if delivered == 10 || Instant::now() > deadline {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let batches = batches.lock().unwrap();
    for key in ["east", "west"] {
        let count: usize = batches
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, p)| p.len())
            .sum();
        assert_eq!(count, 5, "recipient {key}");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn token_round_trip_through_request_client() {
    let broker = Broker::new().unwrap();
    let channels = ControlChannels::new("sb");

    let authority = Arc::new(TokenAuthority::new(Arc::new(MemoryStore::new())));
    authority.grant("alice", Access::READ | Access::WRITE);
    let _chain = HandlerChain::new()
        .then(GetTokenHandler::new(&channels, authority.clone(), broker.clone()))
        .then(CheckTokenHandler::new(&channels, authority, broker.clone()))
        .attach(&broker, "sb:token:*");

    let client = RequestClient::new(&broker, &channels, "alice-client", 10);

    let request = serde_json::to_string(&TokenRequest {
        resource: "reports".to_string(),
    })
    .unwrap();
    let pending = client.request_with(
        &channels.channel(ControlKind::TokenGet),
        request,
        [(REQUESTER, "alice")],
        None,
    );
    let token = match timeout(WAIT, pending.wait()).await.unwrap() {
        RequestOutcome::Reply(message) => message.payload,
        other => panic!("no token: {other:?}"),
    };
    assert!(token.starts_with("reports:"));

    let check = |token: &str| {
        serde_json::to_string(&TokenCheck {
            token: token.to_string(),
            resource: "reports".to_string(),
            access: Access::WRITE.bits(),
        })
        .unwrap()
    };

    let first = client.request(&channels.channel(ControlKind::TokenCheck), check(&token), None);
    match timeout(WAIT, first.wait()).await.unwrap() {
        RequestOutcome::Reply(message) => assert_eq!(message.payload, "true"),
        other => panic!("no check reply: {other:?}"),
    }

    let second = client.request(&channels.channel(ControlKind::TokenCheck), check(&token), None);
    match timeout(WAIT, second.wait()).await.unwrap() {
        RequestOutcome::Reply(message) => assert_eq!(message.payload, "false"),
        other => panic!("no check reply: {other:?}"),
    }
}

#[derive(Default)]
struct Transitions(Mutex<Vec<String>>);

impl LifetimeListener<String> for Transitions {
    fn registry_up(&self, key: &str, payload: &String, _reason: Signal) {
        self.0.lock().unwrap().push(format!("up:{key}:{payload}"));
    }

    fn registry_down(&self, key: &str, _payload: &String) {
        self.0.lock().unwrap().push(format!("down:{key}"));
    }
}

impl Transitions {
    async fn wait_for(&self, entry: &str) -> bool {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            if self.0.lock().unwrap().iter().any(|e| e == entry) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn peer_goes_up_then_down_when_announcements_stop() {
    let broker = Broker::new().unwrap();
    let channels = ControlChannels::new("sb");

    let watcher = Arc::new(RegistryLifetimeHandler::<String>::new(Duration::from_millis(100)));
    let transitions = Arc::new(Transitions::default());
    watcher.add_listener(transitions.clone());
    let _sub = watcher.attach(&broker, &channels);
    let _sweep = watcher.start(broker.runtime()).unwrap();

    let announcer = AliveAnnouncer::start(
        &broker,
        &channels,
        "node-b",
        "inst-1",
        &"payload-b".to_string(),
        Duration::from_millis(50),
    )
    .unwrap();
    assert!(transitions.wait_for("up:node-b:payload-b").await);

    // Abort announcements without a shutdown message; the sweep must notice.
    drop(announcer);
    assert!(transitions.wait_for("down:node-b").await);
    assert!(watcher.registry().is_empty());
}
