use parking_lot::Mutex;

use crate::{EventSender, PrimaryKey, RoomEvent};

use super::ConnectionId;

/// A stream's chat room: the set of connections receiving its chat and
/// lifecycle events.
pub struct Room {
    stream_id: PrimaryKey,
    state: Mutex<RoomState>,
}

#[derive(Default)]
struct RoomState {
    members: Vec<RoomMember>,
    /// The highest member count this room has seen
    peak: usize,
}

/// One connection's membership in a room.
struct RoomMember {
    connection_id: ConnectionId,
    sender: EventSender,
}

/// A snapshot of the member counters after a membership change.
#[derive(Debug, Clone, Copy)]
pub struct RoomCounts {
    pub current: usize,
    pub peak: usize,
}

impl Room {
    pub fn new(stream_id: PrimaryKey) -> Self {
        Self {
            stream_id,
            state: Default::default(),
        }
    }

    pub fn stream_id(&self) -> PrimaryKey {
        self.stream_id
    }

    /// Adds a member, returning the updated counts, or [None] if the
    /// connection is already a member.
    pub fn add_member(&self, connection_id: ConnectionId, sender: EventSender) -> Option<RoomCounts> {
        let mut state = self.state.lock();

        if state
            .members
            .iter()
            .any(|m| m.connection_id == connection_id)
        {
            return None;
        }

        state.members.push(RoomMember {
            connection_id,
            sender,
        });

        let current = state.members.len();
        state.peak = state.peak.max(current);

        Some(RoomCounts {
            current,
            peak: state.peak,
        })
    }

    /// Removes a member, returning the updated counts, or [None] if the
    /// connection wasn't a member.
    pub fn remove_member(&self, connection_id: ConnectionId) -> Option<RoomCounts> {
        let mut state = self.state.lock();

        let before = state.members.len();
        state.members.retain(|m| m.connection_id != connection_id);

        if state.members.len() == before {
            return None;
        }

        Some(RoomCounts {
            current: state.members.len(),
            peak: state.peak,
        })
    }

    /// Queues an event for every current member, the sender included.
    ///
    /// Events are pushed under the room lock, so all members observe one
    /// sender's messages in the order the room received them.
    pub fn broadcast(&self, event: RoomEvent) {
        let state = self.state.lock();

        for member in state.members.iter() {
            let _ = member.sender.send(event.clone());
        }
    }

    pub fn member_count(&self) -> usize {
        self.state.lock().members.len()
    }
}
