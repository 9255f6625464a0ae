use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
};
use chrono::{DateTime, Utc};
use codecast_live::RoomEvent;
use futures_util::{SinkExt, StreamExt};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{context::ServerContext, Router};

/// Messages a client can send over the gateway connection.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Enter a stream's room. Viewing is public, so no authentication is
    /// required here.
    #[serde(rename = "stream:join")]
    Join { stream_id: i64 },
    #[serde(rename = "stream:leave")]
    Leave { stream_id: i64 },
    #[serde(rename = "chat:send")]
    Chat {
        stream_id: i64,
        text: String,
        display_name: String,
        avatar_url: Option<String>,
    },
}

/// Messages the server pushes to gateway connections.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "chat:receive")]
    Chat {
        display_name: String,
        avatar_url: Option<String>,
        text: String,
        sent_at: DateTime<Utc>,
    },
    #[serde(rename = "stream:ended")]
    StreamEnded { stream_id: i64, message: String },
}

impl From<RoomEvent> for ServerMessage {
    fn from(value: RoomEvent) -> Self {
        match value {
            RoomEvent::Chat {
                display_name,
                avatar_url,
                text,
                sent_at,
            } => Self::Chat {
                display_name,
                avatar_url,
                text,
                sent_at,
            },
            RoomEvent::StreamEnded { stream_id, message } => {
                Self::StreamEnded { stream_id, message }
            }
        }
    }
}

async fn gateway(State(context): State<ServerContext>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, context))
}

/// Drives one gateway connection: forwards room events to the socket, and
/// dispatches incoming messages to the room router until the transport
/// closes.
async fn handle_socket(socket: WebSocket, context: ServerContext) {
    let (mut outgoing, mut incoming) = socket.split();
    let (connection_id, mut events) = context.live.rooms.register();

    let writer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let message = ServerMessage::from(event);
            let text = serde_json::to_string(&message).expect("serializes properly");

            if outgoing.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = incoming.next().await {
        let Message::Text(text) = message else {
            continue;
        };

        let Ok(parsed) = serde_json::from_str::<ClientMessage>(&text) else {
            debug!("Ignoring malformed gateway message from connection {connection_id}");
            continue;
        };

        match parsed {
            ClientMessage::Join { stream_id } => {
                context.live.rooms.join(connection_id, stream_id).await
            }
            ClientMessage::Leave { stream_id } => {
                context.live.rooms.leave(connection_id, stream_id).await
            }
            ClientMessage::Chat {
                stream_id,
                text,
                display_name,
                avatar_url,
            } => context.live.rooms.send_chat(
                connection_id,
                stream_id,
                &text,
                &display_name,
                avatar_url,
            ),
        }
    }

    // The read loop only exits when the transport is gone, so this runs
    // exactly once per connection
    context.live.rooms.handle_disconnect(connection_id).await;

    writer.abort();
}

pub fn router() -> Router {
    Router::new().route("/", get(gateway))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_client_messages_parse() {
        let join: ClientMessage =
            serde_json::from_str(r#"{"type": "stream:join", "stream_id": 7}"#)
                .expect("join parses");

        assert!(matches!(join, ClientMessage::Join { stream_id: 7 }));

        let chat: ClientMessage = serde_json::from_str(
            r#"{
                "type": "chat:send",
                "stream_id": 7,
                "text": "hello",
                "display_name": "amara",
                "avatar_url": null
            }"#,
        )
        .expect("chat parses");

        assert!(matches!(chat, ClientMessage::Chat { .. }));

        assert!(serde_json::from_str::<ClientMessage>(r#"{"type": "nonsense"}"#).is_err());
    }

    #[test]
    fn test_server_messages_carry_their_event_names() {
        let ended = ServerMessage::StreamEnded {
            stream_id: 7,
            message: "Stream has ended".to_string(),
        };

        let value = serde_json::to_value(&ended).expect("serializes");

        assert_eq!(value["type"], "stream:ended");
        assert_eq!(value["stream_id"], 7);

        let chat = ServerMessage::Chat {
            display_name: "amara".to_string(),
            avatar_url: None,
            text: "hello".to_string(),
            sent_at: Utc::now(),
        };

        let value = serde_json::to_value(&chat).expect("serializes");

        assert_eq!(value["type"], "chat:receive");
        assert_eq!(value["text"], "hello");
    }
}
