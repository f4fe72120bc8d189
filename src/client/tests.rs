use super::*;
use crate::broker::{Broker, ControlChannels, Message};
use std::time::Duration;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

fn echo_responder(broker: &Broker, channel: &str) {
    let responder = broker.clone();
    broker.subscribe(Some(&format!("{channel}|*")), move |m: &Message| {
        responder.reply(m, format!("echo:{}", m.payload));
        Ok(())
    });
}

#[tokio::test(flavor = "multi_thread")]
async fn test_request_receives_reply() {
    let broker = Broker::new().unwrap();
    let channels = ControlChannels::new("sb");
    echo_responder(&broker, "svc.echo");

    let client = RequestClient::new(&broker, &channels, "client-1", 5);
    let pending = client.request("svc.echo", "ping", None);

    let outcome = timeout(WAIT, pending.wait()).await.unwrap();
    match outcome {
        RequestOutcome::Reply(message) => {
            assert_eq!(message.payload, "echo:ping");
            assert!(message.topic.starts_with("sb:reply:client-1|"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_request_times_out_after_beats() {
    let broker = Broker::new().unwrap();
    let channels = ControlChannels::new("sb");
    let client = RequestClient::new(&broker, &channels, "client-1", 5);

    let pending = client.request("svc.nobody", "ping", Some(3));
    assert_eq!(client.tick(), 0);
    assert_eq!(client.tick(), 0);
    assert_eq!(client.pending_count(), 1);
    assert_eq!(client.tick(), 1);

    assert_eq!(pending.wait().await, RequestOutcome::Timeout);
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_default_timeout_is_used() {
    let broker = Broker::new().unwrap();
    let channels = ControlChannels::new("sb");
    let client = RequestClient::new(&broker, &channels, "client-1", 2);

    let pending = client.request("svc.nobody", "ping", None);
    client.tick();
    client.tick();
    assert_eq!(pending.wait().await, RequestOutcome::Timeout);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_resolves_cancelled() {
    let broker = Broker::new().unwrap();
    let channels = ControlChannels::new("sb");
    let client = RequestClient::new(&broker, &channels, "client-1", 5);

    let pending = client.request("svc.nobody", "ping", None);
    let id = pending.id().to_string();
    assert!(client.cancel(&id));
    assert!(!client.cancel(&id));
    assert_eq!(pending.wait().await, RequestOutcome::Cancelled);

    // Nothing left for the timer.
    for _ in 0..10 {
        assert_eq!(client.tick(), 0);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_heartbeat_drives_timeouts() {
    let broker = Broker::new().unwrap();
    let channels = ControlChannels::new("sb");
    let client = RequestClient::new(&broker, &channels, "client-1", 2);
    let heartbeat = client.start_heartbeat(Duration::from_millis(20)).unwrap();

    let pending = client.request("svc.nobody", "ping", None);
    let outcome = timeout(WAIT, pending.wait()).await.unwrap();
    assert_eq!(outcome, RequestOutcome::Timeout);
    assert!(client.beats() >= 2);
    heartbeat.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dropping_client_unsubscribes() {
    let broker = Broker::new().unwrap();
    let channels = ControlChannels::new("sb");
    let client = RequestClient::new(&broker, &channels, "client-1", 2);
    assert_eq!(broker.registry().len(), 1);
    drop(client);
    assert!(broker.registry().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_zero_heartbeat_period_is_rejected() {
    let broker = Broker::new().unwrap();
    let channels = ControlChannels::new("sb");
    let client = RequestClient::new(&broker, &channels, "client-1", 2);
    assert!(matches!(
        client.start_heartbeat(Duration::ZERO),
        Err(crate::utils::BusError::Config(_))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_heartbeat_and_manual_ticks_share_one_counter() {
    let broker = Broker::new().unwrap();
    let channels = ControlChannels::new("sb");
    let client = RequestClient::new(&broker, &channels, "client-1", 100);
    let heartbeat = client.start_heartbeat(Duration::from_millis(10)).unwrap();

    let deadline = std::time::Instant::now() + WAIT;
    while client.beats() < 3 && std::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    heartbeat.stop();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let before = client.beats();
    assert!(before >= 3);
    client.tick();
    assert_eq!(client.beats(), before + 1);
}
