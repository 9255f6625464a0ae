use std::collections::HashSet;

use codecast_core::Id;
use parking_lot::Mutex;

use crate::{EventSender, PrimaryKey};

pub type ConnectionId = Id<Connection>;

/// A long-lived real-time client registered with the [RoomRouter].
///
/// Tracks which rooms the connection has joined so a disconnect can clean up
/// every membership without scanning all rooms.
pub struct Connection {
    pub id: ConnectionId,
    sender: EventSender,
    rooms: Mutex<HashSet<PrimaryKey>>,
}

impl Connection {
    pub fn new(sender: EventSender) -> Self {
        Self {
            id: ConnectionId::new(),
            sender,
            rooms: Default::default(),
        }
    }

    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    /// Records that this connection entered a room. Returns false if it was
    /// already a member.
    pub fn enter_room(&self, stream_id: PrimaryKey) -> bool {
        self.rooms.lock().insert(stream_id)
    }

    /// Records that this connection left a room. Returns false if it wasn't
    /// a member.
    pub fn exit_room(&self, stream_id: PrimaryKey) -> bool {
        self.rooms.lock().remove(&stream_id)
    }

    /// Drains every room membership, leaving the connection in none.
    pub fn drain_rooms(&self) -> Vec<PrimaryKey> {
        self.rooms.lock().drain().collect()
    }
}
