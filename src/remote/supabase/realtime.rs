//! Realtime feed over the Phoenix channel protocol
//!
//! One websocket per subscription. The reader task joins a channel with a
//! `postgres_changes` filter on `public.messages` inserts, sends heartbeats and
//! forwards decoded rows until it is told to stop or the socket goes away. The
//! server drops a channel whose token has expired, so refreshed tokens are pushed
//! to it as they arrive on the auth-state feed.
//!
//! ```text
//!   client                               realtime
//!     |-- phx_join  (ref 1) -------------->|
//!     |<------------- phx_reply ok (ref 1) |
//!     |<---------------- postgres_changes  |   (repeats)
//!     |-- heartbeat (topic "phoenix") ---->|   (every heartbeat_interval)
//!     |-- access_token ------------------->|   (whenever the session token changes)
//!     |-- phx_leave ---------------------->|
//!     |-- close -------------------------->|
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use super::SupabaseClient;
use crate::remote::{FeedEvent, FeedSubscription, RealtimeApi};
use crate::shared::{AuthStateChange, Message, Result, TalkError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Ref of the join message, echoed by its reply
const JOIN_REF: &str = "1";

/// Buffered feed events before the reader waits on the consumer
const FEED_BUFFER: usize = 64;

/// One frame of the Phoenix v1 JSON protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct PhoenixFrame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl PhoenixFrame {
    /// Join `topic` listening for inserts on `public.messages`
    pub fn join(topic: &str, access_token: &str) -> Self {
        Self {
            topic: topic.to_string(),
            event: "phx_join".to_string(),
            payload: json!({
                "config": {
                    "broadcast": { "ack": false, "self": false },
                    "presence": { "key": "" },
                    "postgres_changes": [
                        { "event": "INSERT", "schema": "public", "table": "messages" }
                    ],
                    "private": false
                },
                "access_token": access_token
            }),
            reference: Some(JOIN_REF.to_string()),
            join_ref: Some(JOIN_REF.to_string()),
        }
    }

    pub fn heartbeat(reference: u64) -> Self {
        Self {
            topic: "phoenix".to_string(),
            event: "heartbeat".to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
            join_ref: None,
        }
    }

    /// Hand the channel a new token before the one it joined with expires
    pub fn access_token(topic: &str, access_token: &str, reference: u64) -> Self {
        Self {
            topic: topic.to_string(),
            event: "access_token".to_string(),
            payload: json!({ "access_token": access_token }),
            reference: Some(reference.to_string()),
            join_ref: Some(JOIN_REF.to_string()),
        }
    }

    pub fn leave(topic: &str, reference: u64) -> Self {
        Self {
            topic: topic.to_string(),
            event: "phx_leave".to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
            join_ref: Some(JOIN_REF.to_string()),
        }
    }

    fn to_ws(&self) -> Result<WsMessage> {
        Ok(WsMessage::Text(serde_json::to_string(self)?.into()))
    }
}

/// What an inbound frame means for the feed
#[derive(Debug, PartialEq)]
pub(crate) enum Inbound {
    /// Reply to one of our pushes
    Reply {
        reference: Option<String>,
        ok: bool,
        reason: String,
    },
    /// A new row in `messages`
    Insert(Message),
    /// The server ended the channel
    ChannelClosed(String),
    /// Anything else (other topics, presence, our own heartbeat replies)
    Ignored,
}

/// Interpret a text frame received on `topic`
pub(crate) fn decode(text: &str, topic: &str) -> Inbound {
    let frame: PhoenixFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!("Ignoring malformed realtime frame: {}", e);
            return Inbound::Ignored;
        }
    };
    if frame.topic != topic {
        return Inbound::Ignored;
    }

    match frame.event.as_str() {
        "postgres_changes" => insert_from(&frame.payload["data"]),
        // Older servers push the change as its own event
        "INSERT" => insert_from(&frame.payload),
        "phx_reply" => {
            let ok = frame.payload["status"].as_str() == Some("ok");
            let reason = frame.payload["response"]["reason"]
                .as_str()
                .unwrap_or("join rejected")
                .to_string();
            Inbound::Reply {
                reference: frame.reference,
                ok,
                reason,
            }
        }
        "phx_error" => Inbound::ChannelClosed("channel error".to_string()),
        "phx_close" => Inbound::ChannelClosed("channel closed by server".to_string()),
        "system" if frame.payload["status"].as_str() == Some("error") => Inbound::ChannelClosed(
            frame.payload["message"]
                .as_str()
                .unwrap_or("realtime system error")
                .to_string(),
        ),
        _ => Inbound::Ignored,
    }
}

fn insert_from(data: &Value) -> Inbound {
    if data["type"].as_str() != Some("INSERT") || data["table"].as_str() != Some("messages") {
        return Inbound::Ignored;
    }
    match serde_json::from_value::<Message>(data["record"].clone()) {
        Ok(message) => Inbound::Insert(message),
        Err(e) => {
            tracing::warn!("Ignoring undecodable message row: {}", e);
            Inbound::Ignored
        }
    }
}

#[async_trait]
impl RealtimeApi for SupabaseClient {
    async fn subscribe_message_inserts(&self) -> Result<FeedSubscription> {
        let bound = self.config.fetch_timeout;
        let topic = format!("realtime:messages-{}", Uuid::new_v4());
        // Subscribe before reading the token so no refresh slips in between
        let auth_changes = self.auth_events.subscribe();
        let access_token = self.bearer_token().await;

        tracing::debug!("Opening realtime channel {}", topic);
        let (mut socket, _) = tokio::time::timeout(bound, connect_async(self.config.realtime_url()))
            .await
            .map_err(|_| TalkError::timeout("realtime connect", bound))??;

        socket
            .send(PhoenixFrame::join(&topic, &access_token).to_ws()?)
            .await?;
        tokio::time::timeout(bound, await_join_reply(&mut socket, &topic))
            .await
            .map_err(|_| TalkError::timeout("realtime join", bound))??;
        tracing::info!("Joined realtime channel {}", topic);

        let (events_tx, events_rx) = mpsc::channel(FEED_BUFFER);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_feed(
            socket,
            FeedChannel {
                topic,
                access_token,
                heartbeat_interval: self.config.heartbeat_interval,
            },
            events_tx,
            shutdown_rx,
            auth_changes,
        ));
        Ok(FeedSubscription::new(events_rx, shutdown_tx, task))
    }
}

async fn await_join_reply(socket: &mut WsStream, topic: &str) -> Result<()> {
    while let Some(frame) = socket.next().await {
        let WsMessage::Text(text) = frame? else {
            continue;
        };
        match decode(text.as_str(), topic) {
            Inbound::Reply { reference, ok, reason } if reference.as_deref() == Some(JOIN_REF) => {
                return if ok {
                    Ok(())
                } else {
                    Err(TalkError::subscription(reason))
                };
            }
            Inbound::ChannelClosed(reason) => return Err(TalkError::subscription(reason)),
            _ => {}
        }
    }
    Err(TalkError::subscription("socket closed before join reply"))
}

/// A joined channel as seen by its reader task
struct FeedChannel {
    topic: String,
    /// Token the channel currently holds
    access_token: String,
    heartbeat_interval: Duration,
}

/// Token to push for `change`, if it differs from the one the channel holds
fn refreshed_token<'a>(change: &'a AuthStateChange, current: &str) -> Option<&'a str> {
    change
        .session
        .as_ref()
        .map(|session| session.access_token.as_str())
        .filter(|token| *token != current)
}

/// Reader task: forwards inserts and keeps the channel alive until shutdown
async fn run_feed(
    socket: WsStream,
    channel: FeedChannel,
    events: mpsc::Sender<FeedEvent>,
    mut shutdown: oneshot::Receiver<()>,
    mut auth_changes: broadcast::Receiver<AuthStateChange>,
) {
    let FeedChannel {
        topic,
        mut access_token,
        heartbeat_interval,
    } = channel;
    let (mut write, mut read) = socket.split();
    let mut heartbeat =
        tokio::time::interval_at(tokio::time::Instant::now() + heartbeat_interval, heartbeat_interval);
    let mut next_ref: u64 = 2;
    let mut following_auth = true;

    let reason = loop {
        tokio::select! {
            _ = &mut shutdown => {
                if let Ok(leave) = PhoenixFrame::leave(&topic, next_ref).to_ws() {
                    let _ = write.send(leave).await;
                }
                let _ = write.send(WsMessage::Close(None)).await;
                tracing::debug!("Left realtime channel {}", topic);
                return;
            }
            _ = heartbeat.tick() => {
                let sent = match PhoenixFrame::heartbeat(next_ref).to_ws() {
                    Ok(frame) => write.send(frame).await.map_err(TalkError::from),
                    Err(e) => Err(e),
                };
                next_ref += 1;
                if let Err(e) = sent {
                    break format!("heartbeat failed: {}", e);
                }
            }
            change = auth_changes.recv(), if following_auth => match change {
                Ok(change) => {
                    if let Some(token) = refreshed_token(&change, &access_token) {
                        let sent = match PhoenixFrame::access_token(&topic, token, next_ref).to_ws() {
                            Ok(frame) => write.send(frame).await.map_err(TalkError::from),
                            Err(e) => Err(e),
                        };
                        next_ref += 1;
                        if let Err(e) = sent {
                            break format!("token update failed: {}", e);
                        }
                        tracing::debug!("Pushed refreshed token to {}", topic);
                        access_token = token.to_string();
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Realtime channel {} missed {} auth changes", topic, skipped);
                }
                Err(RecvError::Closed) => following_auth = false,
            },
            frame = read.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => match decode(text.as_str(), &topic) {
                    Inbound::Insert(message) => {
                        tracing::trace!("Realtime insert {} in room {}", message.id, message.room_id);
                        if events.send(FeedEvent::Insert(message)).await.is_err() {
                            // Consumer is gone
                            return;
                        }
                    }
                    Inbound::ChannelClosed(reason) => break reason,
                    Inbound::Reply { .. } | Inbound::Ignored => {}
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    break match frame {
                        Some(frame) => format!("socket closed: {}", frame.reason.as_str()),
                        None => "socket closed".to_string(),
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break e.to_string(),
                None => break "socket closed".to_string(),
            }
        }
    };

    tracing::warn!("Realtime channel {} lost: {}", topic, reason);
    let _ = events.send(FeedEvent::Closed { reason }).await;
}
