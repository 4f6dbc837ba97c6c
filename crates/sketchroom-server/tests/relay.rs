//! End-to-end tests against a live relay using real WebSocket clients.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use sketchroom_core::Relay;
use sketchroom_server::{AppState, ServerConfig};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(200);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Boot a relay on an ephemeral port and return its WebSocket URL.
async fn boot_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = AppState::new(Arc::new(Relay::default()), &ServerConfig::default());
    tokio::spawn(async move {
        sketchroom_server::serve(listener, state, std::future::pending())
            .await
            .unwrap();
    });
    format!("ws://{addr}/ws")
}

/// Connect and consume the identity frame, which must come first.
async fn connect(url: &str) -> (WsStream, String) {
    let (mut ws, _) = connect_async(url).await.unwrap();
    let id = recv_json(&mut ws).await;
    assert_eq!(id["type"], "id");
    let client_id = id["message"].as_str().unwrap().to_string();
    (ws, client_id)
}

async fn send_text(ws: &mut WsStream, text: &str) {
    ws.send(Message::Text(text.to_string().into())).await.unwrap();
}

async fn recv_text(ws: &mut WsStream) -> String {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return text.as_str().to_string();
        }
    }
}

async fn recv_json(ws: &mut WsStream) -> Value {
    serde_json::from_str(&recv_text(ws).await).unwrap()
}

async fn assert_silent(ws: &mut WsStream) {
    assert!(
        timeout(QUIET, ws.next()).await.is_err(),
        "expected no frame"
    );
}

async fn create_room(ws: &mut WsStream) -> String {
    send_text(ws, r#"{"type":"create room"}"#).await;
    let created = recv_json(ws).await;
    assert_eq!(created["type"], "room-created");
    created["roomId"].as_str().unwrap().to_string()
}

async fn join_room(ws: &mut WsStream, room_id: &str) -> Value {
    send_text(ws, &json!({"type": "join-room", "roomId": room_id, "lines": []}).to_string()).await;
    recv_json(ws).await
}

#[tokio::test]
async fn create_join_and_relay_a_delta() {
    let url = boot_server().await;

    let (mut x, _x_id) = connect(&url).await;
    let room_id = create_room(&mut x).await;

    let (mut y, y_id) = connect(&url).await;
    let ack = join_room(&mut y, &room_id).await;
    assert_eq!(ack["type"], "join-room");
    assert_eq!(ack["status"], 200);
    assert_eq!(ack["lines"], json!([]));

    let joined = recv_json(&mut x).await;
    assert_eq!(joined, json!({"type": "someone-joined-room", "id": y_id}));

    let delta = r#"{"lines":[[0,0,10,10]]}"#;
    send_text(&mut x, delta).await;
    assert_eq!(recv_text(&mut y).await, delta);
    assert_silent(&mut x).await;
}

#[tokio::test]
async fn concurrent_clients_get_distinct_ids() {
    let url = boot_server().await;

    let clients = futures_util::future::join_all((0..16).map(|_| connect(&url))).await;
    let ids: HashSet<_> = clients.iter().map(|(_, id)| id.clone()).collect();
    assert_eq!(ids.len(), 16);
}

#[tokio::test]
async fn duplicate_and_unknown_joins_keep_connection_open() {
    let url = boot_server().await;
    let (mut a, _) = connect(&url).await;
    let room_id = create_room(&mut a).await;

    let notice = join_room(&mut a, &room_id).await;
    assert_eq!(notice["message"], "Room already joined.");

    let missing = join_room(&mut a, "does-not-exist").await;
    assert_eq!(missing["status"], 404);

    send_text(&mut a, "definitely not json").await;
    let second = create_room(&mut a).await;
    assert_ne!(second, room_id);
}

#[tokio::test]
async fn departure_only_shrinks_that_room() {
    let url = boot_server().await;
    let (mut a, _) = connect(&url).await;
    let (mut b, b_id) = connect(&url).await;
    let (mut c, _) = connect(&url).await;

    let room_id = create_room(&mut a).await;
    join_room(&mut b, &room_id).await;
    recv_json(&mut a).await;
    join_room(&mut c, &room_id).await;
    recv_json(&mut a).await;
    recv_json(&mut b).await;

    let (mut d, _) = connect(&url).await;
    let (mut e, _) = connect(&url).await;
    let other = create_room(&mut d).await;
    join_room(&mut e, &other).await;
    recv_json(&mut d).await;

    b.close(None).await.unwrap();

    let left = recv_json(&mut a).await;
    assert_eq!(left, json!({"type": "someone-left-room", "id": b_id}));
    let left = recv_json(&mut c).await;
    assert_eq!(left["id"], b_id);

    for n in 0..5 {
        send_text(&mut a, &format!(r#"{{"seq":{n}}}"#)).await;
    }
    for n in 0..5 {
        assert_eq!(recv_json(&mut c).await, json!({"seq": n}));
    }

    // The other room never hears about b or a's deltas.
    assert_silent(&mut d).await;
    send_text(&mut e, r#"{"texts":[]}"#).await;
    assert_eq!(recv_json(&mut d).await, json!({"texts": []}));
    assert_silent(&mut c).await;
}

#[tokio::test]
async fn late_joiner_gets_recent_history() {
    let url = boot_server().await;
    let (mut a, _) = connect(&url).await;
    let room_id = create_room(&mut a).await;

    send_text(&mut a, r#"{"circles":[{"x":1}]}"#).await;
    send_text(&mut a, r#"{"arrows":[]}"#).await;
    // Round-trip a control message so both deltas have been routed.
    create_room(&mut a).await;

    let (mut late, _) = connect(&url).await;
    let ack = join_room(&mut late, &room_id).await;
    assert_eq!(ack["status"], 200);
    assert_eq!(recv_text(&mut late).await, r#"{"circles":[{"x":1}]}"#);
    assert_eq!(recv_text(&mut late).await, r#"{"arrows":[]}"#);
}
