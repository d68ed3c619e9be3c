//! WebSocket streaming API.
//!
//! A connection owns one delivery sink and every subscription opened on it.
//! Subscribing re-resolves the connection's credential, so an account
//! blocked after connecting cannot open new channels. Closing the socket
//! drops every handle, which cancels the subscriptions on the bus.

#![allow(missing_docs)]

use std::collections::HashMap;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use chorus_common::{AppError, AppResult};
use chorus_core::{Delivery, Event, StreamChannel, SubscriptionHandle, SubscriptionId};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::middleware::AppState;

const SINK_CAPACITY: usize = 256;

/// Streaming query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    /// Access credential; anonymous when absent.
    pub token: Option<String>,
}

/// Client-to-server message.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Open a channel under a client-chosen id. Reusing an id replaces the
    /// earlier subscription.
    Subscribe {
        id: String,
        #[serde(flatten)]
        channel: StreamChannel,
    },
    Unsubscribe { id: String },
}

/// Server-to-client message.
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "body", rename_all = "camelCase")]
pub enum ServerMessage<'a> {
    Event {
        id: &'a str,
        event: &'a Event,
    },
    Subscribed {
        id: String,
        channel: &'static str,
    },
    Unsubscribed {
        id: String,
    },
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        code: &'static str,
        message: String,
    },
}

impl ServerMessage<'_> {
    fn error(id: Option<String>, err: &AppError) -> Self {
        Self::Error {
            id,
            code: err.error_code(),
            message: err.to_string(),
        }
    }
}

/// Subscriptions held by one connection.
#[derive(Default)]
struct Connection {
    /// Client id to the bus handles opened for it.
    channels: HashMap<String, Vec<SubscriptionHandle>>,
    /// Bus subscription to the client id events are reported under.
    routes: HashMap<SubscriptionId, String>,
}

impl Connection {
    fn insert(&mut self, id: String, handles: Vec<SubscriptionHandle>) {
        self.remove(&id);
        for handle in &handles {
            self.routes.insert(handle.id(), id.clone());
        }
        self.channels.insert(id, handles);
    }

    fn remove(&mut self, id: &str) -> bool {
        let Some(handles) = self.channels.remove(id) else {
            return false;
        };
        for handle in handles {
            self.routes.remove(&handle.id());
        }
        true
    }

    fn route(&self, subscription: SubscriptionId) -> Option<&str> {
        self.routes.get(&subscription).map(String::as_str)
    }

    fn handle_count(&self) -> usize {
        self.channels.values().map(Vec::len).sum()
    }
}

/// WebSocket handler for streaming.
pub async fn streaming_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<StreamQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, query.token, state))
}

async fn handle_socket(socket: WebSocket, token: Option<String>, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (sink, mut deliveries) = mpsc::channel::<Delivery>(SINK_CAPACITY);
    let mut connection = Connection::default();

    info!(authenticated = token.is_some(), "Streaming connection established");

    loop {
        let reply = tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    handle_text(&text, token.as_deref(), &state, &sink, &mut connection)
                        .await
                }
                Some(Ok(Message::Ping(data))) => {
                    if sender.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                    continue;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket error");
                    break;
                }
            },
            Some(delivery) = deliveries.recv() => {
                let Some(id) = connection.route(delivery.subscription_id) else {
                    continue;
                };
                encode(&ServerMessage::Event {
                    id,
                    event: delivery.event.as_ref(),
                })
            }
        };

        if let Some(json) = reply
            && sender.send(Message::Text(json.into())).await.is_err()
        {
            break;
        }
    }

    debug!(handles = connection.handle_count(), "Dropping connection subscriptions");
    drop(connection);
    info!("Streaming connection closed");
}

/// Apply one client message, returning the encoded reply if there is one.
async fn handle_text(
    text: &str,
    token: Option<&str>,
    state: &AppState,
    sink: &mpsc::Sender<Delivery>,
    connection: &mut Connection,
) -> Option<String> {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            let err = AppError::BadRequest(format!("Malformed message: {e}"));
            return encode(&ServerMessage::error(None, &err));
        }
    };

    let reply = match message {
        ClientMessage::Subscribe { id, channel } => {
            match subscribe(token, state, &channel, sink).await {
                Ok(handles) => {
                    connection.insert(id.clone(), handles);
                    ServerMessage::Subscribed {
                        id,
                        channel: channel.name(),
                    }
                }
                Err(err) => {
                    debug!(channel = %channel, error = %err, "Subscription refused");
                    ServerMessage::error(Some(id), &err)
                }
            }
        }
        ClientMessage::Unsubscribe { id } => {
            if connection.remove(&id) {
                ServerMessage::Unsubscribed { id }
            } else {
                let err = AppError::NotFound(format!("Subscription {id}"));
                ServerMessage::error(Some(id), &err)
            }
        }
    };
    encode(&reply)
}

async fn subscribe(
    token: Option<&str>,
    state: &AppState,
    channel: &StreamChannel,
    sink: &mpsc::Sender<Delivery>,
) -> AppResult<Vec<SubscriptionHandle>> {
    let caller = state.identity_resolver.resolve_caller(token).await?;
    state.subscription_service.open(&caller, channel, sink).await
}

fn encode(message: &ServerMessage<'_>) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(json) => Some(json),
        Err(e) => {
            warn!(error = %e, "Failed to encode streaming message");
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_message_carries_channel_fields() {
        let message: ClientMessage = serde_json::from_str(
            r#"{"type":"subscribe","body":{"id":"c1","channel":"newComment","postId":"p1"}}"#,
        )
        .unwrap();

        match message {
            ClientMessage::Subscribe { id, channel } => {
                assert_eq!(id, "c1");
                assert_eq!(
                    channel,
                    StreamChannel::NewComment {
                        post_id: "p1".to_string()
                    }
                );
            }
            ClientMessage::Unsubscribe { .. } => panic!("expected subscribe"),
        }
    }

    #[test]
    fn test_unknown_channel_is_rejected() {
        let parsed = serde_json::from_str::<ClientMessage>(
            r#"{"type":"subscribe","body":{"id":"c1","channel":"homeTimeline"}}"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_error_message_shape() {
        let err = AppError::AuthenticationRequired;
        let json = encode(&ServerMessage::error(Some("c1".to_string()), &err)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["type"], "error");
        assert_eq!(value["body"]["id"], "c1");
        assert_eq!(value["body"]["code"], err.error_code());
    }
}
