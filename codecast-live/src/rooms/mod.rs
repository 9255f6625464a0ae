mod connection;
mod room;

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use log::debug;
use tokio::sync::mpsc::unbounded_channel;

pub use connection::*;
pub use room::*;

use crate::{EventReceiver, LiveContext, PrimaryKey, RoomEvent};

/// Messages longer than this are dropped rather than broadcast.
pub const MAX_CHAT_LENGTH: usize = 500;

/// Tracks which connections are in which stream rooms, routes chat and
/// lifecycle events to room members only, and reconciles viewer counts
/// through the registry's counter path.
pub struct RoomRouter {
    context: LiveContext,
    connections: DashMap<ConnectionId, Arc<Connection>>,
}

impl RoomRouter {
    pub fn new(context: &LiveContext) -> Self {
        Self {
            context: context.clone(),
            connections: Default::default(),
        }
    }

    /// Registers a new real-time connection, returning its id and the
    /// receiving half of its event queue.
    pub fn register(&self) -> (ConnectionId, EventReceiver) {
        let (sender, receiver) = unbounded_channel();
        let connection = Arc::new(Connection::new(sender));
        let id = connection.id;

        self.connections.insert(id, connection);

        (id, receiver)
    }

    /// Adds the connection to a stream's room. Viewing is public, so no
    /// authentication or capacity check happens here. Joining a room the
    /// connection is already in is a no-op.
    pub async fn join(&self, connection_id: ConnectionId, stream_id: PrimaryKey) {
        let Some(connection) = self.connection(connection_id) else {
            return;
        };

        if !connection.enter_room(stream_id) {
            return;
        }

        let room = self.room(stream_id);

        let Some(counts) = room.add_member(connection_id, connection.sender()) else {
            return;
        };

        debug!("Connection {connection_id} joined room for stream {stream_id}");

        self.persist_counts(stream_id, counts, true).await;
    }

    /// Removes the connection from a stream's room. Leaving a room that was
    /// never joined is a no-op, not an error.
    pub async fn leave(&self, connection_id: ConnectionId, stream_id: PrimaryKey) {
        let Some(connection) = self.connection(connection_id) else {
            return;
        };

        if !connection.exit_room(stream_id) {
            return;
        }

        let Some(room) = self.existing_room(stream_id) else {
            return;
        };

        let Some(counts) = room.remove_member(connection_id) else {
            return;
        };

        debug!("Connection {connection_id} left room for stream {stream_id}");

        self.persist_counts(stream_id, counts, false).await;
    }

    /// Broadcasts a chat message to the room, sender included.
    ///
    /// Empty (after trimming) and oversized messages are dropped without an
    /// error: chat is best-effort and high-volume, so senders are never
    /// bothered with validation failures.
    pub fn send_chat(
        &self,
        connection_id: ConnectionId,
        stream_id: PrimaryKey,
        text: &str,
        display_name: &str,
        avatar_url: Option<String>,
    ) {
        if self.connection(connection_id).is_none() {
            return;
        }

        let trimmed = text.trim();

        if trimmed.is_empty() || text.chars().count() > MAX_CHAT_LENGTH {
            return;
        }

        let Some(room) = self.existing_room(stream_id) else {
            return;
        };

        room.broadcast(RoomEvent::Chat {
            display_name: display_name.to_string(),
            avatar_url,
            text: trimmed.to_string(),
            sent_at: Utc::now(),
        });
    }

    /// Removes the connection from every room it joined. Runs exactly once
    /// per connection: later calls with the same id are no-ops.
    pub async fn handle_disconnect(&self, connection_id: ConnectionId) {
        let Some((_, connection)) = self.connections.remove(&connection_id) else {
            return;
        };

        for stream_id in connection.drain_rooms() {
            let Some(room) = self.existing_room(stream_id) else {
                continue;
            };

            if let Some(counts) = room.remove_member(connection_id) {
                self.persist_counts(stream_id, counts, false).await;
            }
        }

        debug!("Connection {connection_id} disconnected");
    }

    /// The current member count of a stream's room.
    pub fn member_count(&self, stream_id: PrimaryKey) -> usize {
        self.existing_room(stream_id)
            .map(|r| r.member_count())
            .unwrap_or(0)
    }

    fn connection(&self, connection_id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections
            .get(&connection_id)
            .map(|c| Arc::clone(c.value()))
    }

    /// Gets or creates the room for a stream. Rooms are created on demand:
    /// a join may arrive before the stream is ever observed here.
    fn room(&self, stream_id: PrimaryKey) -> Arc<Room> {
        self.context
            .rooms
            .entry(stream_id)
            .or_insert_with(|| Arc::new(Room::new(stream_id)))
            .value()
            .clone()
    }

    fn existing_room(&self, stream_id: PrimaryKey) -> Option<Arc<Room>> {
        self.context
            .rooms
            .get(&stream_id)
            .map(|r| Arc::clone(r.value()))
    }

    async fn persist_counts(&self, stream_id: PrimaryKey, counts: RoomCounts, new_view: bool) {
        self.context
            .update_stream_presence(stream_id, counts.current as i64, counts.peak as i64, new_view)
            .await;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Live, MemoryDatabase, NewAccount, NewStreamRequest};
    use codecast_core::{ProviderConfig, SequenceUidGenerator, TokenIssuer};
    use tokio::sync::mpsc::error::TryRecvError;

    async fn live_with_stream() -> (Live, PrimaryKey) {
        let config = ProviderConfig::new("app".to_string(), "secret".to_string())
            .expect("config is valid");

        let live = Live::new(
            Arc::new(MemoryDatabase::new()),
            TokenIssuer::new(config),
            Arc::new(SequenceUidGenerator::default()),
        );

        let user = live
            .auth
            .register(NewAccount {
                username: "broadcaster".to_string(),
                email: "broadcaster@codecast.dev".to_string(),
                password: "hunter2hunter2".to_string(),
                display_name: "Broadcaster".to_string(),
            })
            .await
            .expect("registration succeeds");

        let started = live
            .streams
            .start(user.id, NewStreamRequest::titled("Live rust"))
            .await
            .expect("stream starts");

        (live, started.stream.id)
    }

    #[tokio::test]
    async fn test_counts_follow_membership() {
        let (live, stream_id) = live_with_stream().await;

        let (a, _events_a) = live.rooms.register();
        let (b, _events_b) = live.rooms.register();

        live.rooms.join(a, stream_id).await;
        live.rooms.join(b, stream_id).await;

        let stream = live.context().database.stream_by_id(stream_id).await.unwrap();
        assert_eq!(stream.viewer_count, 2);
        assert_eq!(stream.peak_viewer_count, 2);
        assert_eq!(stream.total_view_count, 2);

        live.rooms.leave(a, stream_id).await;

        let stream = live.context().database.stream_by_id(stream_id).await.unwrap();
        assert_eq!(stream.viewer_count, 1);
        // The peak never follows the count back down
        assert_eq!(stream.peak_viewer_count, 2);
    }

    #[tokio::test]
    async fn test_random_membership_sequences_never_go_negative() {
        let (live, stream_id) = live_with_stream().await;

        let connections: Vec<_> = (0..4).map(|_| live.rooms.register()).collect();

        // A fixed pseudo-random walk of join/leave/disconnect operations,
        // including redundant leaves and double joins
        let steps = [
            (0, "join"),
            (0, "leave"),
            (0, "leave"),
            (1, "join"),
            (2, "join"),
            (1, "join"),
            (2, "disconnect"),
            (2, "leave"),
            (3, "join"),
            (1, "disconnect"),
            (3, "leave"),
            (3, "leave"),
        ];

        for (index, op) in steps {
            let id = connections[index].0;

            match op {
                "join" => live.rooms.join(id, stream_id).await,
                "leave" => live.rooms.leave(id, stream_id).await,
                _ => live.rooms.handle_disconnect(id).await,
            }

            let stream = live.context().database.stream_by_id(stream_id).await.unwrap();
            assert!(stream.viewer_count >= 0);
            assert!(stream.peak_viewer_count >= stream.viewer_count);
        }

        let stream = live.context().database.stream_by_id(stream_id).await.unwrap();
        assert_eq!(stream.viewer_count, 0);
    }

    #[tokio::test]
    async fn test_leave_without_join_is_a_noop() {
        let (live, stream_id) = live_with_stream().await;

        let (a, _events) = live.rooms.register();

        live.rooms.leave(a, stream_id).await;

        let stream = live.context().database.stream_by_id(stream_id).await.unwrap();
        assert_eq!(stream.viewer_count, 0);
        assert_eq!(stream.total_view_count, 0);
    }

    #[tokio::test]
    async fn test_chat_soft_fail_policy() {
        let (live, stream_id) = live_with_stream().await;

        let (a, mut events) = live.rooms.register();
        live.rooms.join(a, stream_id).await;

        live.rooms.send_chat(a, stream_id, "", "viewer", None);
        live.rooms.send_chat(a, stream_id, "   \n\t", "viewer", None);
        live.rooms
            .send_chat(a, stream_id, &"x".repeat(MAX_CHAT_LENGTH + 1), "viewer", None);

        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));

        let exact = "y".repeat(MAX_CHAT_LENGTH);
        live.rooms.send_chat(a, stream_id, &exact, "viewer", None);

        match events.try_recv() {
            Ok(RoomEvent::Chat { text, .. }) => assert_eq!(text, exact),
            other => panic!("expected a chat event, got {other:?}"),
        }

        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_chat_is_trimmed_and_received_by_sender() {
        let (live, stream_id) = live_with_stream().await;

        let (a, mut events_a) = live.rooms.register();
        let (b, mut events_b) = live.rooms.register();

        live.rooms.join(a, stream_id).await;
        live.rooms.join(b, stream_id).await;

        live.rooms
            .send_chat(a, stream_id, "  hello chat  ", "amara", None);

        for events in [&mut events_a, &mut events_b] {
            match events.try_recv() {
                Ok(RoomEvent::Chat {
                    display_name, text, ..
                }) => {
                    assert_eq!(display_name, "amara");
                    assert_eq!(text, "hello chat");
                }
                other => panic!("expected a chat event, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_chat_stays_in_its_room() {
        let (live, stream_id) = live_with_stream().await;

        let (a, _events_a) = live.rooms.register();
        let (b, mut events_b) = live.rooms.register();

        live.rooms.join(a, stream_id).await;
        // b never joins the room

        live.rooms.send_chat(a, stream_id, "hello", "amara", None);

        assert!(matches!(events_b.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_disconnect_clears_every_membership_once() {
        let (live, stream_id) = live_with_stream().await;

        let (a, _events) = live.rooms.register();
        live.rooms.join(a, stream_id).await;

        live.rooms.handle_disconnect(a).await;
        // A second disconnect for the same connection must be inert
        live.rooms.handle_disconnect(a).await;

        let stream = live.context().database.stream_by_id(stream_id).await.unwrap();
        assert_eq!(stream.viewer_count, 0);
        assert_eq!(live.rooms.member_count(stream_id), 0);
    }

    #[tokio::test]
    async fn test_per_sender_ordering_is_preserved() {
        let (live, stream_id) = live_with_stream().await;

        let (a, _events_a) = live.rooms.register();
        let (b, mut events_b) = live.rooms.register();

        live.rooms.join(a, stream_id).await;
        live.rooms.join(b, stream_id).await;

        for i in 0..10 {
            live.rooms
                .send_chat(a, stream_id, &format!("message {i}"), "amara", None);
        }

        for i in 0..10 {
            match events_b.try_recv() {
                Ok(RoomEvent::Chat { text, .. }) => assert_eq!(text, format!("message {i}")),
                other => panic!("expected a chat event, got {other:?}"),
            }
        }
    }
}
