//! Integration tests for WebSocket connection, auth, ping/pong, and message
//! dispatch, driven over a real listener with a real WebSocket client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use pressmarket_server::auth::session::Claims;
use pressmarket_server::notify::order::{CustomerInfo, OrderStatus, OrderSummary, PressingInfo};
use pressmarket_server::notify::producers;
use pressmarket_server::push::NoopPushService;
use pressmarket_server::routes;
use pressmarket_server::state::AppState;

const SECRET: &[u8] = b"integration-secret";

type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Helper: start the server on a random port and return its address plus a
/// handle on the shared state for registry assertions.
async fn start_test_server() -> (SocketAddr, AppState) {
    let state = AppState::new(
        SECRET.to_vec(),
        Arc::new(NoopPushService),
        Duration::from_secs(30),
    );
    let app = routes::build_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

fn make_token(user_id: &str, role: &str) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        iat: now,
        exp: now + 900,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET)).unwrap()
}

async fn connect(addr: SocketAddr, user_id: &str, role: &str) -> WsClient {
    let token = make_token(user_id, role);
    let (stream, _) = connect_async(format!("ws://{}/ws?token={}", addr, token))
        .await
        .expect("handshake accepted");
    stream
}

/// Read frames until the next text frame, parsed as JSON.
async fn next_json(stream: &mut WsClient) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("frame before timeout")
            .expect("stream still open")
            .expect("frame read");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("valid JSON frame");
        }
    }
}

/// Poll a registry-backed condition until it holds or the deadline passes.
/// Server-side cleanup runs on the actor task, slightly after the client
/// observes the close.
async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached before timeout");
}

#[tokio::test]
async fn handshake_refused_for_bad_token() {
    let (addr, state) = start_test_server().await;

    let err = connect_async(format!("ws://{}/ws?token=not-a-jwt", addr))
        .await
        .expect_err("handshake must be refused");
    match err {
        WsError::Http(response) => assert_eq!(response.status(), 401),
        other => panic!("expected an HTTP refusal, got {other:?}"),
    }

    // no connection was ever registered
    assert_eq!(state.connections.connection_count(), 0);
}

#[tokio::test]
async fn handshake_refused_for_expired_token() {
    let (addr, state) = start_test_server().await;

    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: "u1".to_string(),
        role: "client".to_string(),
        iat: now - 7200,
        exp: now - 3600,
    };
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET)).unwrap();

    let err = connect_async(format!("ws://{}/ws?token={}", addr, token))
        .await
        .expect_err("handshake must be refused");
    match err {
        WsError::Http(response) => assert_eq!(response.status(), 401),
        other => panic!("expected an HTTP refusal, got {other:?}"),
    }
    assert_eq!(state.connections.connection_count(), 0);
}

#[tokio::test]
async fn connection_ack_carries_default_rooms() {
    let (addr, state) = start_test_server().await;

    let mut client = connect(addr, "A", "pressing").await;
    let ack = next_json(&mut client).await;

    assert_eq!(ack["type"], "connection");
    assert_eq!(ack["data"]["user_id"], "A");
    assert_eq!(ack["data"]["role"], "pressing");
    let rooms: Vec<&str> = ack["data"]["rooms"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert_eq!(rooms, vec!["global", "pressings", "pressing_A"]);
    assert!(ack["timestamp"].is_string());

    assert!(state.connections.is_online("A"));
    assert_eq!(state.rooms.members_of("pressing_A"), vec!["A".to_string()]);
}

#[tokio::test]
async fn ping_round_trip() {
    let (addr, _state) = start_test_server().await;

    let mut client = connect(addr, "u1", "client").await;
    let _ack = next_json(&mut client).await;

    client
        .send(Message::Text(r#"{"type":"ping"}"#.into()))
        .await
        .unwrap();
    let reply = next_json(&mut client).await;
    assert_eq!(reply["type"], "pong");
}

#[tokio::test]
async fn unknown_type_gets_error_and_connection_survives() {
    let (addr, _state) = start_test_server().await;

    let mut client = connect(addr, "u1", "client").await;
    let _ack = next_json(&mut client).await;

    client
        .send(Message::Text(r#"{"type":"frobnicate"}"#.into()))
        .await
        .unwrap();
    let reply = next_json(&mut client).await;
    assert_eq!(reply["type"], "error");

    // the connection is still active: a subsequent ping round-trips
    client
        .send(Message::Text(r#"{"type":"ping"}"#.into()))
        .await
        .unwrap();
    let reply = next_json(&mut client).await;
    assert_eq!(reply["type"], "pong");
}

#[tokio::test]
async fn malformed_payload_gets_error_and_connection_survives() {
    let (addr, _state) = start_test_server().await;

    let mut client = connect(addr, "u1", "client").await;
    let _ack = next_json(&mut client).await;

    client
        .send(Message::Text("not json at all".into()))
        .await
        .unwrap();
    let reply = next_json(&mut client).await;
    assert_eq!(reply["type"], "error");

    client
        .send(Message::Text(r#"{"type":"ping"}"#.into()))
        .await
        .unwrap();
    let reply = next_json(&mut client).await;
    assert_eq!(reply["type"], "pong");
}

#[tokio::test]
async fn full_disconnect_purges_room_membership() {
    let (addr, state) = start_test_server().await;

    let mut client = connect(addr, "B", "client").await;
    let _ack = next_json(&mut client).await;

    client
        .send(Message::Text(r#"{"type":"join_room","room":"custom1"}"#.into()))
        .await
        .unwrap();
    wait_until(|| state.rooms.members_of("custom1") == vec!["B".to_string()]).await;

    client.close(None).await.unwrap();

    wait_until(|| !state.connections.is_online("B")).await;
    wait_until(|| state.rooms.members_of("custom1").is_empty()).await;
    wait_until(|| state.rooms.members_of("global").is_empty()).await;
}

#[tokio::test]
async fn new_order_routed_to_pressing_and_admins_only() {
    let (addr, state) = start_test_server().await;

    let mut pressing = connect(addr, "A", "pressing").await;
    let mut admin = connect(addr, "M", "admin").await;
    let mut client = connect(addr, "C", "client").await;
    // the ack is sent after registration, so reading it synchronizes
    let _ = next_json(&mut pressing).await;
    let _ = next_json(&mut admin).await;
    let _ = next_json(&mut client).await;

    let order = OrderSummary {
        id: "o1".to_string(),
        reference: "CMD-0042".to_string(),
        status: OrderStatus::Pending,
        customer_id: "C".to_string(),
        pressing_id: "A".to_string(),
        total_amount: 24.5,
    };
    producers::notify_new_order(
        &state,
        &order,
        &CustomerInfo {
            id: "C".to_string(),
            name: "Jane".to_string(),
        },
        &PressingInfo {
            id: "A".to_string(),
            name: "Press & Go".to_string(),
        },
    );

    let frame = next_json(&mut pressing).await;
    assert_eq!(frame["type"], "new_order");
    assert_eq!(frame["data"]["order"]["id"], "o1");

    let frame = next_json(&mut admin).await;
    assert_eq!(frame["type"], "new_order");

    // the unrelated client sees nothing: its next frame is the pong to a
    // ping sent after the fan-out
    client
        .send(Message::Text(r#"{"type":"ping"}"#.into()))
        .await
        .unwrap();
    let frame = next_json(&mut client).await;
    assert_eq!(frame["type"], "pong");
}

#[tokio::test]
async fn multi_device_user_receives_on_every_connection() {
    let (addr, state) = start_test_server().await;

    let mut phone = connect(addr, "C", "client").await;
    let mut laptop = connect(addr, "C", "client").await;
    let _ = next_json(&mut phone).await;
    let _ = next_json(&mut laptop).await;
    assert_eq!(state.connections.connections_of("C").len(), 2);

    let order = OrderSummary {
        id: "o2".to_string(),
        reference: "CMD-0043".to_string(),
        status: OrderStatus::Ready,
        customer_id: "C".to_string(),
        pressing_id: "A".to_string(),
        total_amount: 12.0,
    };
    producers::notify_order_status_update(&state, &order, OrderStatus::InProgress);

    for device in [&mut phone, &mut laptop] {
        let frame = next_json(device).await;
        assert_eq!(frame["type"], "order_status_update");
        assert_eq!(frame["data"]["previous_status"], "in_progress");
    }
}
