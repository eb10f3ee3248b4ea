//! Cross-component synchronization scenarios: log consumer, broadcast
//! batcher, heartbeat, and the inbound ping echo working together.

use async_trait::async_trait;
use murmur_gateway::{
    AppState,
    backplane::{EventLog, StoreLog},
    broadcast::{BroadcastBatcher, FlushReport},
    config::Config,
    consumer::LogConsumer,
    error::Result,
    events::Event,
    heartbeat,
    registry::Outbound,
    session,
};
use murmur_store::{Cursor, LogRecord, Store};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::sync::mpsc::{self, UnboundedReceiver};

struct Instance {
    state: Arc<AppState>,
    consumer: LogConsumer,
    batcher: BroadcastBatcher,
}

impl Instance {
    fn new(store: Store, max_connections: usize) -> Self {
        let config = Config {
            max_connections,
            log_block: Duration::ZERO,
            ..Config::default()
        };
        let state = AppState::from_store(config, store);
        let consumer = LogConsumer::new(state.log.clone(), state.hub.clone(), Duration::ZERO);
        let batcher = BroadcastBatcher::new(state.hub.clone(), state.registry.clone());
        Self {
            state,
            consumer,
            batcher,
        }
    }

    /// Consume whatever is on the log, then run one broadcast tick
    async fn tick(&mut self) -> Option<FlushReport> {
        self.consumer.step().await.unwrap();
        self.batcher.flush().await
    }
}

fn next_text(rx: &mut UnboundedReceiver<Outbound>) -> String {
    match rx.try_recv() {
        Ok(Outbound::Text(text)) => text.as_str().to_string(),
        other => panic!("expected a text frame, got {:?}", other),
    }
}

fn next_json(rx: &mut UnboundedReceiver<Outbound>) -> Value {
    serde_json::from_str(&next_text(rx)).unwrap()
}

async fn player_ids(state: &AppState) -> Vec<String> {
    state
        .hub
        .snapshot()
        .await
        .players
        .into_iter()
        .map(|p| p.id.as_str().to_string())
        .collect()
}

#[tokio::test]
async fn test_two_joins_in_one_tick() {
    // GIVEN: A connection that has already caught up
    let store = Store::open_in_memory().await.unwrap();
    let mut instance = Instance::new(store, 10);
    let state = instance.state.clone();

    let (tx_x, mut rx_x) = mpsc::unbounded_channel();
    let x = session::open(&state, tx_x).await.unwrap();
    instance.tick().await.unwrap();
    let _catch_up = next_json(&mut rx_x);

    // WHEN: Two more connect before the next tick
    let (tx_1, mut rx_1) = mpsc::unbounded_channel();
    let (tx_2, mut rx_2) = mpsc::unbounded_channel();
    let p1 = session::open(&state, tx_1).await.unwrap();
    let p2 = session::open(&state, tx_2).await.unwrap();
    let report = instance.tick().await.unwrap();

    // THEN: The existing connection gets both joins as a diff
    assert_eq!(report, FlushReport { full: 2, diff: 1 });
    assert_eq!(
        next_text(&mut rx_x),
        format!(
            r#"[{{"event":"player joined","player":{{"id":"{}"}}}},{{"event":"player joined","player":{{"id":"{}"}}}}]"#,
            p1, p2
        )
    );

    // AND: Each newcomer gets only the snapshot, which already lists everyone
    for rx in [&mut rx_1, &mut rx_2] {
        let full = next_json(rx);
        let items = full.as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["event"], "joined");
        assert_eq!(
            items[0]["state"]["players"],
            json!([{ "id": x.as_str() }, { "id": p1.as_str() }, { "id": p2.as_str() }])
        );
    }

    // AND: Nobody receives a second frame for this tick
    assert!(rx_x.try_recv().is_err());
    assert!(rx_1.try_recv().is_err());
    assert!(rx_2.try_recv().is_err());
}

/// Event log whose appends land, then wait for the test to let them return
struct GatedLog {
    inner: StoreLog,
    appended: Notify,
    release: Notify,
}

#[async_trait]
impl EventLog for GatedLog {
    async fn append(&self, event: String) -> Result<Cursor> {
        let cursor = self.inner.append(event).await?;
        self.appended.notify_one();
        self.release.notified().await;
        Ok(cursor)
    }

    async fn read(&self, after: Cursor, block: Duration) -> Result<Vec<LogRecord>> {
        self.inner.read(after, block).await
    }

    async fn ping(&self) -> Result<String> {
        self.inner.ping().await
    }
}

#[tokio::test]
async fn test_tick_during_open_never_sends_diff_first() {
    // GIVEN: An instance whose log appends can be held open
    let store = Store::open_in_memory().await.unwrap();
    let log = Arc::new(GatedLog {
        inner: StoreLog::new(store.clone(), "game-events"),
        appended: Notify::new(),
        release: Notify::new(),
    });
    let shared = Arc::new(store);
    let config = Config {
        log_block: Duration::ZERO,
        ..Config::default()
    };
    let state = AppState::new(config, log.clone(), shared.clone(), shared);
    let mut consumer = LogConsumer::new(state.log.clone(), state.hub.clone(), Duration::ZERO);
    let batcher = BroadcastBatcher::new(state.hub.clone(), state.registry.clone());

    // WHEN: A connection opens and a full tick runs after its join is on
    // the log but before open returns
    let (tx, mut rx) = mpsc::unbounded_channel();
    let opening = tokio::spawn({
        let state = state.clone();
        async move { session::open(&state, tx).await }
    });
    log.appended.notified().await;

    assert_eq!(consumer.step().await.unwrap(), 1);
    assert_eq!(
        batcher.flush().await.unwrap(),
        FlushReport { full: 0, diff: 0 }
    );

    // THEN: Nothing was sent to it yet
    assert!(rx.try_recv().is_err());

    // WHEN: Open completes and the next tick runs
    log.release.notify_one();
    let id = opening.await.unwrap().unwrap();
    assert_eq!(
        batcher.flush().await.unwrap(),
        FlushReport { full: 1, diff: 0 }
    );

    // THEN: Its first and only frame is the snapshot, which already lists it
    let full = next_json(&mut rx);
    let items = full.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["event"], "joined");
    assert_eq!(items[0]["state"]["players"], json!([{ "id": id.as_str() }]));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_catch_up_client_gets_one_full_payload_and_no_diff() {
    let store = Store::open_in_memory().await.unwrap();
    let mut instance = Instance::new(store, 10);
    let state = instance.state.clone();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = session::open(&state, tx).await.unwrap();

    let report = instance.tick().await.unwrap();
    assert_eq!(report, FlushReport { full: 1, diff: 0 });

    // The snapshot already reflects the join consumed this tick
    let full = next_json(&mut rx);
    assert_eq!(full[0]["state"]["players"], json!([{ "id": id.as_str() }]));
    assert!(rx.try_recv().is_err());

    // Next tick is idle
    assert!(instance.tick().await.is_none());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_remote_joins_reach_local_clients() {
    // GIVEN: Two instances sharing one log, each with one client
    let store = Store::open_in_memory().await.unwrap();
    let mut east = Instance::new(store.clone(), 10);
    let mut west = Instance::new(store, 10);

    let (tx_e, mut rx_e) = mpsc::unbounded_channel();
    let e = session::open(&east.state, tx_e).await.unwrap();
    east.tick().await.unwrap();
    let _ = next_json(&mut rx_e);

    // WHEN: A client joins the other instance
    let (tx_w, mut rx_w) = mpsc::unbounded_channel();
    let w = session::open(&west.state, tx_w).await.unwrap();
    west.tick().await.unwrap();
    east.tick().await.unwrap();

    // THEN: The east client hears about it as a diff
    assert_eq!(
        next_json(&mut rx_e),
        json!([{ "event": "player joined", "player": { "id": w.as_str() } }])
    );

    // AND: The west client's snapshot includes the east player
    let full = next_json(&mut rx_w);
    assert_eq!(
        full[0]["state"]["players"],
        json!([{ "id": e.as_str() }, { "id": w.as_str() }])
    );

    // AND: Both instances hold the same player list
    assert_eq!(player_ids(&east.state).await, player_ids(&west.state).await);

    // WHEN: The west client leaves
    assert!(session::close(&west.state, &w).await);
    west.tick().await;
    east.tick().await.unwrap();

    // THEN: East sees the departure and both converge again
    assert_eq!(
        next_json(&mut rx_e),
        json!([{ "event": "player left", "player": { "id": w.as_str() } }])
    );
    assert_eq!(player_ids(&east.state).await, vec![e.as_str().to_string()]);
    assert_eq!(player_ids(&east.state).await, player_ids(&west.state).await);
}

#[tokio::test]
async fn test_restart_replays_log_from_origin() {
    // GIVEN: A log with some history
    let store = Store::open_in_memory().await.unwrap();
    let first = Instance::new(store.clone(), 10);
    let (tx, _rx) = mpsc::unbounded_channel();
    let kept = session::open(&first.state, tx).await.unwrap();
    let (tx, _rx2) = mpsc::unbounded_channel();
    let gone = session::open(&first.state, tx).await.unwrap();
    session::close(&first.state, &gone).await;

    // WHEN: A fresh instance starts against the same log
    let mut restarted = Instance::new(store, 10);
    restarted.tick().await;

    // THEN: It rebuilds the same player list from the origin
    assert_eq!(
        player_ids(&restarted.state).await,
        vec![kept.as_str().to_string()]
    );
}

#[tokio::test]
async fn test_missed_heartbeats_terminate_once() {
    // GIVEN: A connected client that never answers probes
    let store = Store::open_in_memory().await.unwrap();
    let instance = Instance::new(store, 10);
    let state = instance.state.clone();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = session::open(&state, tx).await.unwrap();

    // WHEN: Two heartbeat passes go by
    assert!(heartbeat::tick(&state).await.is_empty());
    assert_eq!(rx.try_recv().unwrap(), Outbound::Ping);
    assert_eq!(heartbeat::tick(&state).await, vec![id.clone()]);

    // THEN: The socket is told to close and the registry forgets it
    assert_eq!(rx.try_recv().unwrap(), Outbound::Close);
    assert_eq!(state.registry.count(), 0);

    // AND: The close path that follows adds nothing
    assert!(!session::close(&state, &id).await);

    let records = state.log.read(Cursor::ORIGIN, Duration::ZERO).await.unwrap();
    let leaves = records
        .iter()
        .filter(|r| serde_json::from_str::<Event>(&r.event).unwrap() == Event::left(id.clone()))
        .count();
    assert_eq!(leaves, 1);
}

#[tokio::test]
async fn test_pong_keeps_connection_alive() {
    let store = Store::open_in_memory().await.unwrap();
    let instance = Instance::new(store, 10);
    let state = instance.state.clone();
    let (tx, _rx) = mpsc::unbounded_channel();
    let id = session::open(&state, tx).await.unwrap();

    for _ in 0..3 {
        assert!(heartbeat::tick(&state).await.is_empty());
        assert!(state.registry.mark_alive(&id).await);
    }
    assert_eq!(state.registry.count(), 1);
}

#[tokio::test]
async fn test_ping_echo_reaches_every_local_client() {
    let store = Store::open_in_memory().await.unwrap();
    let instance = Instance::new(store, 10);
    let state = instance.state.clone();

    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();
    let a = session::open(&state, tx_a).await.unwrap();
    session::open(&state, tx_b).await.unwrap();

    session::handle_text(&state, &a, r#"{"event":"ping"}"#).await;

    let expected = json!({ "event": "pong", "reply": "PONG" });
    assert_eq!(next_json(&mut rx_a), expected);
    assert_eq!(next_json(&mut rx_b), expected);
}

#[tokio::test]
async fn test_malformed_client_message_is_dropped() {
    let store = Store::open_in_memory().await.unwrap();
    let instance = Instance::new(store, 10);
    let state = instance.state.clone();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = session::open(&state, tx).await.unwrap();

    session::handle_text(&state, &id, "{not json").await;
    session::handle_text(&state, &id, r#"{"event":"teleport"}"#).await;

    assert!(rx.try_recv().is_err());
    assert!(state.registry.contains(&id).await);
}
