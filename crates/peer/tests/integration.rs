use async_trait::async_trait;
use futures::FutureExt;
use ludum_core::{sync_listener, Phase};
use ludum_peer::{
    Connection, ConnectOptions, Envelope, MemoryConnection, MemoryHub, PeerConfig, PeerError,
    PeerGame, PeerPhase, DATA_EVENT,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

async fn settle() {
    sleep(Duration::from_millis(10)).await;
}

/// Answers "ping" with "pong" and echoes anything else.
struct PongPhase;

#[async_trait]
impl Phase for PongPhase {
    fn id(&self) -> &str {
        "PongPhase"
    }
}

#[async_trait]
impl PeerPhase for PongPhase {
    fn handles_peer_messages(&self) -> bool {
        true
    }

    async fn on_peer_message(&self, data: Value, _from: Arc<dyn Connection>) -> Value {
        if data == json!("ping") {
            json!("pong")
        } else {
            data
        }
    }
}

struct DeafPhase;

#[async_trait]
impl Phase for DeafPhase {
    fn id(&self) -> &str {
        "DeafPhase"
    }
}

impl PeerPhase for DeafPhase {}

/// Game on a fresh hub peer, driven over hand-made connection pairs.
fn lone_game(config: PeerConfig) -> Arc<PeerGame> {
    let hub = MemoryHub::new();
    PeerGame::new(hub.create_peer(), config)
}

async fn open_pair() -> (Arc<MemoryConnection>, Arc<MemoryConnection>) {
    let (near, far) = MemoryConnection::pair("me", "them", ConnectOptions::default());
    far.mark_open().await;
    near.mark_open().await;
    (near, far)
}

/// Every envelope arriving on `connection`.
fn inbox(connection: &Arc<MemoryConnection>) -> Arc<Mutex<Vec<Envelope>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    connection.events().on(
        DATA_EVENT,
        sync_listener(move |data| {
            if let Some(envelope) = Envelope::from_value(data) {
                sink.lock().unwrap().push(envelope);
            }
        }),
    );
    seen
}

/// Reply to every request on `connection` with `value` after `delay`.
fn respond_with(connection: &Arc<MemoryConnection>, value: Value, delay: Duration) {
    let weak = Arc::downgrade(connection);
    connection.events().on(
        DATA_EVENT,
        sync_listener(move |data| {
            let Some(request_id) = Envelope::from_value(data)
                .and_then(|e| e.request_id().map(str::to_owned))
            else {
                return;
            };
            let weak = weak.clone();
            let value = value.clone();
            tokio::spawn(async move {
                sleep(delay).await;
                if let Some(connection) = weak.upgrade() {
                    connection
                        .send(Envelope::reply(&request_id, value).to_value())
                        .unwrap();
                }
            });
        }),
    );
}

#[tokio::test(start_paused = true)]
async fn test_ping_pong_between_peers() {
    let hub = MemoryHub::new();
    let alice = PeerGame::new(hub.create_peer_with_id("alice"), PeerConfig::default());
    let bob = PeerGame::new(hub.create_peer_with_id("bob"), PeerConfig::default());
    alice.register_phase(Arc::new(PongPhase)).unwrap();
    alice.start(Vec::new()).await.unwrap();

    let waiting = {
        let alice = Arc::clone(&alice);
        tokio::spawn(async move { alice.wait_for_connection().await })
    };
    settle().await;

    let connection = bob.connect_to_peer(&alice.peer_id().await).await;
    let response = bob.send_to_connection(&connection, json!("ping")).await.unwrap();

    assert_eq!(response.value, json!("pong"));
    assert_eq!(response.connection.peer(), "alice");
    let accepted = waiting.await.unwrap().unwrap();
    assert_eq!(accepted.peer(), "bob");
    assert_eq!(alice.connections().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_request_waits_for_open_and_is_sent_once() {
    let game = lone_game(PeerConfig::default());
    let (near, far) = MemoryConnection::pair("me", "them", ConnectOptions::default());
    let near_dyn: Arc<dyn Connection> = near.clone();
    game.add_connection(Arc::clone(&near_dyn));
    let received = inbox(&far);

    let reply = game.send_to_connection(&near_dyn, json!("early"));
    settle().await;
    assert!(received.lock().unwrap().is_empty());

    far.mark_open().await;
    near.mark_open().await;
    settle().await;
    let requests = received.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].data, json!("early"));

    let request_id = requests[0].request_id().unwrap().to_owned();
    far.send(Envelope::reply(&request_id, json!("late")).to_value()).unwrap();
    assert_eq!(reply.await.unwrap().value, json!("late"));
    assert_eq!(received.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_requests_match_their_own_replies() {
    let game = lone_game(PeerConfig::default());
    let (near, far) = open_pair().await;
    let near_dyn: Arc<dyn Connection> = near.clone();
    game.add_connection(Arc::clone(&near_dyn));
    let received = inbox(&far);

    let mut first = game.send_to_connection(&near_dyn, json!("A"));
    let second = game.send_to_connection(&near_dyn, json!("B"));
    settle().await;

    let ids: Vec<String> = received
        .lock()
        .unwrap()
        .iter()
        .map(|e| e.request_id().unwrap().to_owned())
        .collect();
    assert_eq!(ids.len(), 2);

    far.send(Envelope::reply(&ids[1], json!("for B")).to_value()).unwrap();
    assert_eq!(second.await.unwrap().value, json!("for B"));
    settle().await;
    assert!((&mut first).now_or_never().is_none());

    far.send(Envelope::reply(&ids[0], json!("for A")).to_value()).unwrap();
    assert_eq!(first.await.unwrap().value, json!("for A"));
    assert_eq!(near.events().listener_count(DATA_EVENT), 1);
}

#[tokio::test(start_paused = true)]
async fn test_fan_out_keeps_input_order() {
    let game = lone_game(PeerConfig::default());
    let mut connections: Vec<Arc<dyn Connection>> = Vec::new();
    let mut far_ends = Vec::new();
    for (value, delay_ms) in [(1, 30), (2, 10), (3, 20)] {
        let (near, far) = open_pair().await;
        respond_with(&far, json!(value), Duration::from_millis(delay_ms));
        game.add_connection(near.clone());
        connections.push(near);
        far_ends.push(far);
    }

    let responses = game
        .send_to_connections(&connections, json!("roll"))
        .await
        .unwrap();

    let values: Vec<_> = responses.iter().map(|r| r.value.clone()).collect();
    assert_eq!(values, vec![json!(1), json!(2), json!(3)]);
    let all = game.send_to_all_peers(json!("again")).await.unwrap();
    assert_eq!(all.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_request_timeout_releases_listener() {
    let game = lone_game(PeerConfig {
        request_timeout: Some(Duration::from_millis(50)),
    });
    let (near, _far) = open_pair().await;
    let near_dyn: Arc<dyn Connection> = near.clone();
    game.add_connection(Arc::clone(&near_dyn));

    let result = game.send_to_connection(&near_dyn, json!("anyone?")).await;

    assert_eq!(result.unwrap_err(), PeerError::Timeout);
    assert_eq!(near.events().listener_count(DATA_EVENT), 1);
}

#[tokio::test(start_paused = true)]
async fn test_phase_without_handler_does_not_reply() {
    let hub = MemoryHub::new();
    let alice = PeerGame::new(hub.create_peer_with_id("alice"), PeerConfig::default());
    let bob = PeerGame::new(
        hub.create_peer_with_id("bob"),
        PeerConfig {
            request_timeout: Some(Duration::from_millis(100)),
        },
    );
    alice.register_phase(Arc::new(DeafPhase)).unwrap();
    alice.start(Vec::new()).await.unwrap();

    bob.connect_to_peer("alice").await;
    let result = bob.send(json!("ping")).await;

    assert_eq!(result.unwrap_err(), PeerError::Timeout);
}

#[tokio::test(start_paused = true)]
async fn test_send_to_peer_filters_by_remote() {
    let hub = MemoryHub::new();
    let alice = PeerGame::new(hub.create_peer_with_id("alice"), PeerConfig::default());
    let carol = PeerGame::new(hub.create_peer_with_id("carol"), PeerConfig::default());
    let bob = PeerGame::new(hub.create_peer_with_id("bob"), PeerConfig::default());
    for game in [&alice, &carol] {
        game.register_phase(Arc::new(PongPhase)).unwrap();
        game.start(Vec::new()).await.unwrap();
    }

    bob.connect_to_peer("alice").await;
    bob.connect_to_peer("carol").await;
    let replies = bob.send_to_peer("carol", json!("hello")).await.unwrap();

    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].connection.peer(), "carol");
    assert!(bob.send_to_peer("dave", json!(1)).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_closed_connection_is_forgotten() {
    let game = lone_game(PeerConfig::default());
    let (near, far) = open_pair().await;
    game.add_connection(near);

    far.close();
    settle().await;

    assert!(game.connection().is_none());
    assert_eq!(game.send(json!(1)).await.unwrap_err(), PeerError::NoConnection);
}

#[tokio::test(start_paused = true)]
async fn test_signaling_loss_triggers_reconnect() {
    let hub = MemoryHub::new();
    let peer = hub.create_peer();
    let _game = PeerGame::new(peer.clone(), PeerConfig::default());

    peer.drop_signaling();
    settle().await;

    assert_eq!(peer.reconnect_count(), 1);
}
