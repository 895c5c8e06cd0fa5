//! Realtime feed integration tests
//!
//! Runs the websocket side of the Supabase client against a local server that
//! speaks just enough of the Phoenix channel protocol.

use std::future::Future;
use std::time::Duration;

use assert_matches::assert_matches;
use futures_util::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{accept_async, WebSocketStream};

use talk::remote::supabase::SupabaseClient;
use talk::remote::{FeedEvent, RealtimeApi};
use talk::shared::{AppConfig, TalkError};

use crate::common::WAIT;

type ServerSocket = WebSocketStream<TcpStream>;

/// Accept one websocket connection and hand it to `handler`
async fn serve_once<F, Fut>(handler: F) -> (AppConfig, JoinHandle<()>)
where
    F: FnOnce(ServerSocket) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let socket = accept_async(stream).await.expect("websocket handshake");
        handler(socket).await;
    });

    let config = AppConfig::builder()
        .backend_url(format!("http://{}", addr))
        .anon_key("anon-key")
        .fetch_timeout(Duration::from_secs(2))
        .heartbeat_interval(Duration::from_millis(100))
        .persist_session(false)
        .build()
        .expect("valid config");
    (config, server)
}

/// Next text frame as JSON; `None` once the client is gone
async fn next_frame(socket: &mut ServerSocket) -> Option<Value> {
    while let Some(Ok(message)) = socket.next().await {
        if let WsMessage::Text(text) = message {
            return serde_json::from_str(text.as_str()).ok();
        }
    }
    None
}

async fn send(socket: &mut ServerSocket, frame: Value) {
    socket
        .send(WsMessage::Text(frame.to_string().into()))
        .await
        .expect("server send");
}

/// Read the join and answer it; returns the channel topic
async fn accept_join(socket: &mut ServerSocket, status: &str) -> String {
    let join = next_frame(socket).await.expect("join frame");
    assert_eq!(join["event"], "phx_join");
    let topic = join["topic"].as_str().expect("topic").to_string();
    let response = if status == "ok" {
        json!({ "postgres_changes": [{ "id": 1, "event": "INSERT", "schema": "public", "table": "messages" }] })
    } else {
        json!({ "reason": "Unauthorized" })
    };
    send(
        socket,
        json!({
            "topic": topic,
            "event": "phx_reply",
            "ref": join["ref"],
            "payload": { "status": status, "response": response }
        }),
    )
    .await;
    topic
}

fn insert_frame(topic: &str, id: i64, room_id: i64, content: &str) -> Value {
    json!({
        "topic": topic,
        "event": "postgres_changes",
        "ref": null,
        "payload": {
            "ids": [1],
            "data": {
                "schema": "public",
                "table": "messages",
                "type": "INSERT",
                "commit_timestamp": "2025-03-01T10:00:00Z",
                "errors": null,
                "columns": [],
                "record": {
                    "id": id,
                    "content": content,
                    "user_id": "u-1",
                    "email": "alice@talk.fr",
                    "created_at": "2025-03-01T10:00:00.123456",
                    "room_id": room_id
                }
            }
        }
    })
}

#[tokio::test]
async fn test_join_then_inserts_are_forwarded() {
    let (config, server) = serve_once(|mut socket| async move {
        let topic = accept_join(&mut socket, "ok").await;
        send(
            &mut socket,
            json!({ "topic": topic, "event": "presence_state", "ref": null, "payload": {} }),
        )
        .await;
        send(&mut socket, insert_frame(&topic, 42, 7, "bonjour")).await;
        send(&mut socket, insert_frame(&topic, 43, 9, "ailleurs")).await;
        // Keep the socket open until the client leaves
        while next_frame(&mut socket).await.is_some() {}
    })
    .await;
    let client = SupabaseClient::new(config);

    let mut feed = assert_ok!(client.subscribe_message_inserts().await);

    let first = tokio::time::timeout(WAIT, feed.recv()).await.expect("first event");
    assert_matches!(first, Some(FeedEvent::Insert(message)) => {
        assert_eq!(message.id, 42);
        assert_eq!(message.room_id, 7);
        assert_eq!(message.content, "bonjour");
    });
    // All rooms come through; filtering is the synchronizer's job
    let second = tokio::time::timeout(WAIT, feed.recv()).await.expect("second event");
    assert_matches!(second, Some(FeedEvent::Insert(message)) if message.room_id == 9);

    feed.close().await;
    server.await.expect("server task");
}

#[tokio::test]
async fn test_rejected_join_fails_subscription() {
    let (config, server) = serve_once(|mut socket| async move {
        accept_join(&mut socket, "error").await;
        while next_frame(&mut socket).await.is_some() {}
    })
    .await;
    let client = SupabaseClient::new(config);

    let result = client.subscribe_message_inserts().await;

    match result {
        Err(TalkError::Subscription { message }) => assert_eq!(message, "Unauthorized"),
        other => panic!("Expected subscription error, got {:?}", other),
    }
    server.abort();
}

#[tokio::test]
async fn test_server_close_ends_feed() {
    let (config, server) = serve_once(|mut socket| async move {
        accept_join(&mut socket, "ok").await;
        socket
            .send(WsMessage::Close(Some(CloseFrame {
                code: CloseCode::Away,
                reason: "shutting down".into(),
            })))
            .await
            .expect("server close");
        while next_frame(&mut socket).await.is_some() {}
    })
    .await;
    let client = SupabaseClient::new(config);
    let mut feed = assert_ok!(client.subscribe_message_inserts().await);

    let event = tokio::time::timeout(WAIT, feed.recv()).await.expect("close event");

    assert_eq!(
        event,
        Some(FeedEvent::Closed {
            reason: "socket closed: shutting down".to_string()
        })
    );
    server.await.expect("server task");
}

#[tokio::test]
async fn test_channel_error_ends_feed() {
    let (config, server) = serve_once(|mut socket| async move {
        let topic = accept_join(&mut socket, "ok").await;
        send(
            &mut socket,
            json!({ "topic": topic, "event": "phx_error", "ref": null, "payload": {} }),
        )
        .await;
        while next_frame(&mut socket).await.is_some() {}
    })
    .await;
    let client = SupabaseClient::new(config);
    let mut feed = assert_ok!(client.subscribe_message_inserts().await);

    let event = tokio::time::timeout(WAIT, feed.recv()).await.expect("error event");

    assert_matches!(event, Some(FeedEvent::Closed { reason }) if reason == "channel error");
    server.abort();
}

#[tokio::test]
async fn test_close_leaves_channel() {
    let (left_tx, left_rx) = oneshot::channel();
    let (config, server) = serve_once(|mut socket| async move {
        let topic = accept_join(&mut socket, "ok").await;
        let mut seen = Vec::new();
        while let Some(frame) = next_frame(&mut socket).await {
            if frame["event"] == "phx_leave" {
                assert_eq!(frame["topic"], topic.as_str());
                seen.push(frame);
                break;
            }
        }
        let _ = left_tx.send(seen);
    })
    .await;
    let client = SupabaseClient::new(config);
    let feed = assert_ok!(client.subscribe_message_inserts().await);

    feed.close().await;

    let seen = tokio::time::timeout(WAIT, left_rx)
        .await
        .expect("leave in time")
        .expect("server report");
    assert_eq!(seen.len(), 1);
    server.await.expect("server task");
}

#[tokio::test]
async fn test_heartbeats_keep_channel_alive() {
    let (beat_tx, beat_rx) = oneshot::channel();
    let (config, server) = serve_once(|mut socket| async move {
        accept_join(&mut socket, "ok").await;
        while let Some(frame) = next_frame(&mut socket).await {
            if frame["event"] == "heartbeat" {
                let _ = beat_tx.send(frame);
                break;
            }
        }
        while next_frame(&mut socket).await.is_some() {}
    })
    .await;
    let client = SupabaseClient::new(config);
    let feed = assert_ok!(client.subscribe_message_inserts().await);

    let beat = tokio::time::timeout(WAIT, beat_rx)
        .await
        .expect("heartbeat in time")
        .expect("server report");

    assert_eq!(beat["topic"], "phoenix");
    assert!(beat.get("join_ref").is_none());
    feed.close().await;
    server.await.expect("server task");
}
