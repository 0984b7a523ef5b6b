//! WebSocket gateway integration tests
//!
//! Start a real server on an ephemeral port and talk to it the way
//! terminals and UI clients do.

use futures_util::{SinkExt, StreamExt};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use sighub_api::{build_router, AppState, HubOptions};
use sighub_core::*;
use sighub_data::MemoryStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

type Client = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

// ============================================================================
// Test Fixtures
// ============================================================================

async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_record(Account {
            id: 9,
            number: 1001,
            currency: "USD".to_string(),
            kind: 0,
            wallet_id: None,
            balance: dec!(0),
            equity: dec!(0),
            last_update: None,
            retired: false,
        })
        .await
        .unwrap();
    store
        .insert_record(Terminal {
            id: 1,
            account_number: 1001,
            account_id: Some(9),
            broker: "Broker".to_string(),
            demo: false,
            retired: false,
        })
        .await
        .unwrap();
    store
}

async fn start_test_server(store: Arc<MemoryStore>) -> (SocketAddr, Arc<AppState>) {
    let state = Arc::new(AppState::new(store, HubOptions::default()));
    let app = build_router(state.clone(), "/ws");

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, state)
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{}/ws", addr))
        .await
        .expect("Failed to connect");
    ws
}

async fn send(ws: &mut Client, value: Value) {
    ws.send(WsMessage::Text(value.to_string().into())).await.unwrap();
}

async fn recv_json(ws: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("Timeout waiting for frame")
            .expect("Stream closed")
            .expect("Frame error");
        if let WsMessage::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn wait_for_sessions(state: &AppState, expected: usize) {
    for _ in 0..50 {
        if state.hub.session_count() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} sessions, have {}", expected, state.hub.session_count());
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_sessions_are_counted() {
    let (addr, state) = start_test_server(seeded_store().await).await;
    let a = connect(addr).await;
    let b = connect(addr).await;
    wait_for_sessions(&state, 2).await;

    drop(a);
    drop(b);
    wait_for_sessions(&state, 0).await;
}

#[tokio::test]
async fn test_levels_reply_reaches_every_session() {
    let (addr, state) = start_test_server(seeded_store().await).await;
    state.levels.set_levels("EURUSD", "[1.1,1.2]");
    let mut terminal = connect(addr).await;
    let mut viewer = connect(addr).await;
    wait_for_sessions(&state, 2).await;

    send(
        &mut terminal,
        json!({"Id": 9, "Flags": 2, "ObjectId": 5, "ChartId": 6, "Sym": "EURUSD"}),
    )
    .await;

    for ws in [&mut terminal, &mut viewer] {
        let reply = recv_json(ws).await;
        assert_eq!(reply["Id"], 9);
        assert_eq!(reply["ObjectId"], 5);
        assert_eq!(reply["ChartId"], 6);
        assert_eq!(reply["Data"], "[1.1,1.2]");
    }
}

#[tokio::test]
async fn test_bad_frame_keeps_session_open() {
    let (addr, state) = start_test_server(seeded_store().await).await;
    let mut ws = connect(addr).await;
    wait_for_sessions(&state, 1).await;

    ws.send(WsMessage::Text("{not json".to_string().into()))
        .await
        .unwrap();
    send(&mut ws, json!({"Something": "else"})).await;
    send(&mut ws, json!({"Type": 8, "From": "ui", "Message": "GBPUSD"})).await;

    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["Type"], 8);
    assert_eq!(reply["From"], "Server");
    assert_eq!(reply["Message"], "[]");
}

#[tokio::test]
async fn test_balance_signal_updates_store() {
    let store = seeded_store().await;
    let (addr, state) = start_test_server(store.clone()).await;
    let mut ws = connect(addr).await;
    wait_for_sessions(&state, 1).await;

    send(
        &mut ws,
        json!({
            "Id": 4,
            "Flags": 2,
            "ObjectId": 1,
            "Data": [{"Account": 1001, "Balance": 5000.0, "Equity": 5010.0}]
        }),
    )
    .await;
    // Follow with a message so the signal has been handled once it answers.
    send(&mut ws, json!({"Type": 1, "From": "ui", "Message": ""})).await;
    recv_json(&mut ws).await;

    let account = store.get_record::<Account>(9).await.unwrap().unwrap();
    assert_eq!(account.balance, dec!(5000));
    assert_eq!(account.equity, dec!(5010));
    assert_eq!(store.list_records::<AccountState>().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_performance_stream_ends_with_done() {
    let (addr, state) = start_test_server(seeded_store().await).await;
    let mut ws = connect(addr).await;
    wait_for_sessions(&state, 1).await;

    send(&mut ws, json!({"Type": 5, "From": "ui", "Message": "0"})).await;

    let first = recv_json(&mut ws).await;
    assert_eq!(first["Type"], 5);
    assert_eq!(first["Message"], "[]");

    let mut points = 0;
    loop {
        let next = recv_json(&mut ws).await;
        match next["Type"].as_i64() {
            Some(9) => points += 1,
            Some(10) => break,
            other => panic!("unexpected message type {:?}", other),
        }
    }
    assert!(points >= 1);
}

#[tokio::test]
async fn test_cluster_signal_is_queued_not_echoed() {
    let (addr, state) = start_test_server(seeded_store().await).await;
    let mut ws = connect(addr).await;
    wait_for_sessions(&state, 1).await;

    send(&mut ws, json!({"Id": 500, "Flags": 1, "ObjectId": 42})).await;
    send(&mut ws, json!({"Type": 8, "From": "ui", "Message": "EURUSD"})).await;

    // The first thing back is the levels reply, not an echo of the cluster signal.
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["Type"], 8);
    let queued = state.queue.listen(SignalFlags::Cluster, 42).unwrap();
    assert_eq!(queued.id, SignalKind::Unclassified(500));
}

#[tokio::test]
async fn test_health_route() {
    let (addr, state) = start_test_server(seeded_store().await).await;
    let _ws = connect(addr).await;
    wait_for_sessions(&state, 1).await;

    let body: Value = reqwest::get(format!("http://{}/api/health", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["sessions"], 1);
}
