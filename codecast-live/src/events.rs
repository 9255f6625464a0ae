use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::PrimaryKey;

pub type EventSender = UnboundedSender<RoomEvent>;
pub type EventReceiver = UnboundedReceiver<RoomEvent>;

/// Events delivered to the members of a stream room.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// A chat message was broadcast to the room.
    Chat {
        display_name: String,
        avatar_url: Option<String>,
        /// The trimmed message text
        text: String,
        /// Server-assigned timestamp
        sent_at: DateTime<Utc>,
    },
    /// The stream this room belongs to has ended.
    StreamEnded {
        stream_id: PrimaryKey,
        message: String,
    },
}
