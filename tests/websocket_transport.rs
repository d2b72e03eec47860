//! End-to-end tests for the WebSocket transport against a local axum server.
//!
//! The test server speaks the event service protocol well enough to answer
//! `joinSession` with `sessionJoined` and `getSessionInfo` with `sessionInfo`.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cotrain_realtime::adapters::WebSocketTransport;
use cotrain_realtime::application::{
    ConnectionSettings, ConsumerAdapter, PresenceSettings, SessionPresence, TransportConnection,
};
use cotrain_realtime::domain::foundation::SessionId;
use cotrain_realtime::domain::realtime::{ConnectionStatus, Identity, ReconnectPolicy};

// =============================================================================
// Test Server
// =============================================================================

#[derive(Clone, Default)]
struct EventServer {
    identities: Arc<Mutex<Vec<HashMap<String, String>>>>,
    received: Arc<Mutex<Vec<Value>>>,
    drop_after_first_join: Arc<AtomicBool>,
}

impl EventServer {
    fn connections(&self) -> usize {
        self.identities.lock().unwrap().len()
    }

    fn count(&self, event: &str) -> usize {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter(|v| v["event"] == event)
            .count()
    }
}

fn frame(event: &str, data: Value) -> Message {
    Message::Text(json!({ "event": event, "data": data }).to_string())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(server): State<EventServer>,
) -> impl IntoResponse {
    server.identities.lock().unwrap().push(params.clone());
    ws.on_upgrade(move |socket| handle_socket(socket, params, server))
}

async fn handle_socket(mut socket: WebSocket, params: HashMap<String, String>, server: EventServer) {
    let user_id = params.get("userId").cloned().unwrap_or_default();
    if socket.send(frame("connected", json!({ "userId": user_id }))).await.is_err() {
        return;
    }

    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(command) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        server.received.lock().unwrap().push(command.clone());

        let session_id = command["data"]["sessionId"].clone();
        let reply = match command["event"].as_str() {
            Some("joinSession") => frame(
                "sessionJoined",
                json!({ "sessionId": session_id, "participantCount": 3 }),
            ),
            Some("getSessionInfo") => frame(
                "sessionInfo",
                json!({ "sessionId": session_id, "participantCount": 3, "isConnected": true }),
            ),
            _ => continue,
        };
        if socket.send(reply).await.is_err() {
            return;
        }

        if command["event"] == "joinSession" && server.drop_after_first_join.swap(false, Ordering::SeqCst) {
            let _ = socket.send(frame("disconnect", json!("server restart"))).await;
            return;
        }
    }
}

async fn spawn_server(server: EventServer) -> String {
    let app = Router::new()
        .route("/sessions", get(ws_handler))
        .with_state(server);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

// =============================================================================
// Helpers
// =============================================================================

fn connection_for(base_url: &str) -> Arc<TransportConnection> {
    let transport = WebSocketTransport::new(base_url, "sessions").unwrap();
    TransportConnection::new(
        Arc::new(transport),
        ConnectionSettings {
            reconnect: ReconnectPolicy {
                base_delay: Duration::from_millis(20),
                max_delay: Duration::from_millis(100),
                max_attempts: 3,
            },
            connect_timeout: Duration::from_secs(2),
            ..Default::default()
        },
    )
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..300 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

async fn wait_connected(connection: &TransportConnection) {
    let mut rx = connection.watch_state();
    tokio::time::timeout(
        Duration::from_secs(3),
        rx.wait_for(|s| s.status == ConnectionStatus::Connected),
    )
    .await
    .expect("timed out waiting for connection")
    .expect("state channel closed");
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn websocket_round_trip() {
    let server = EventServer::default();
    let base_url = spawn_server(server.clone()).await;
    let connection = connection_for(&base_url);
    let session_id = SessionId::new("session-42").unwrap();
    let presence =
        SessionPresence::mount(connection.clone(), session_id.clone(), PresenceSettings::default());

    assert!(connection.connect(Identity::new("trainer-1", "0xabc").unwrap()));
    wait_connected(&connection).await;

    let identities = server.identities.lock().unwrap().clone();
    assert_eq!(identities[0].get("userId").map(String::as_str), Some("trainer-1"));
    assert_eq!(identities[0].get("walletAddress").map(String::as_str), Some("0xabc"));

    eventually(|| presence.is_joined() && presence.participant_count() == 3).await;
    assert_eq!(server.count("joinSession"), 1);

    let info = presence.fetch_session_info(Duration::from_secs(2)).await;
    assert_eq!(info.map(|i| i.participant_count), Some(3));

    presence.teardown();
    eventually(|| server.count("leaveSession") == 1).await;

    connection.disconnect();
    assert_eq!(connection.state().status, ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn server_disconnect_triggers_reconnect_and_rejoin() {
    let server = EventServer::default();
    server.drop_after_first_join.store(true, Ordering::SeqCst);
    let base_url = spawn_server(server.clone()).await;
    let connection = connection_for(&base_url);
    let _presence = SessionPresence::mount(
        connection.clone(),
        SessionId::new("session-7").unwrap(),
        PresenceSettings::default(),
    );

    connection.connect(Identity::from_wallet("0xdef").unwrap());

    eventually(|| server.connections() == 2).await;
    eventually(|| server.count("joinSession") == 2).await;
    wait_connected(&connection).await;
    assert_eq!(server.count("leaveSession"), 0);
}

#[tokio::test]
async fn unreachable_server_reports_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let connection = connection_for(&format!("ws://{addr}"));
    connection.connect(Identity::from_wallet("0xabc").unwrap());

    let mut rx = connection.watch_state();
    tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|s| s.status == ConnectionStatus::Error),
    )
    .await
    .expect("timed out waiting for error")
    .expect("state channel closed");
    assert!(connection.state().last_error.is_some());
}
