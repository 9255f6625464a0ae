use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::{
    Database, DatabaseError, NewSession, NewStream, NewUser, PrimaryKey, Result, SessionData,
    StreamData, StreamFilter, UpdatedUser, UserData,
};

/// An in-memory database implementation, used by tests.
///
/// A single lock over the whole state serializes every check-and-set, which
/// is exactly the atomicity the stream lifecycle operations require.
#[derive(Default)]
pub struct MemoryDatabase {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    users: Vec<UserData>,
    sessions: Vec<StoredSession>,
    streams: Vec<StoredStream>,
    /// (follower, followed) pairs
    follows: Vec<(PrimaryKey, PrimaryKey)>,
    next_id: PrimaryKey,
}

struct StoredSession {
    id: PrimaryKey,
    token: String,
    user_id: PrimaryKey,
    expires_at: DateTime<Utc>,
}

/// A stream row. The broadcaster is joined in on read so user updates are
/// always reflected.
struct StoredStream {
    data: StreamData,
    streamer_id: PrimaryKey,
}

impl State {
    fn next_id(&mut self) -> PrimaryKey {
        self.next_id += 1;
        self.next_id
    }

    fn user(&self, user_id: PrimaryKey) -> Result<&UserData> {
        self.users
            .iter()
            .find(|u| u.id == user_id)
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "id",
            })
    }

    fn stream(&self, stream_id: PrimaryKey) -> Result<StreamData> {
        let stored = self
            .streams
            .iter()
            .find(|s| s.data.id == stream_id)
            .ok_or(DatabaseError::NotFound {
                resource: "stream",
                identifier: "id",
            })?;

        let mut data = stored.data.clone();
        data.streamer = self.user(stored.streamer_id)?.clone();

        Ok(data)
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        self.state.lock().user(user_id).cloned()
    }

    async fn user_by_username(&self, username: &str) -> Result<UserData> {
        self.state
            .lock()
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "username",
            })
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        let mut state = self.state.lock();

        if state.users.iter().any(|u| u.username == new_user.username) {
            return Err(DatabaseError::Conflict {
                resource: "user",
                field: "username",
                value: new_user.username,
            });
        }

        if state.users.iter().any(|u| u.email == new_user.email) {
            return Err(DatabaseError::Conflict {
                resource: "user",
                field: "email",
                value: new_user.email,
            });
        }

        let user = UserData {
            id: state.next_id(),
            username: new_user.username,
            email: new_user.email,
            password: new_user.password,
            display_name: new_user.display_name,
            avatar_url: None,
            bio: String::new(),
            is_streamer: false,
            follower_count: 0,
            following_count: 0,
        };

        state.users.push(user.clone());

        Ok(user)
    }

    async fn update_user(&self, updated_user: UpdatedUser) -> Result<UserData> {
        let mut state = self.state.lock();

        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == updated_user.id)
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "id",
            })?;

        if let Some(display_name) = updated_user.display_name {
            user.display_name = display_name;
        }

        if let Some(avatar_url) = updated_user.avatar_url {
            user.avatar_url = Some(avatar_url);
        }

        if let Some(bio) = updated_user.bio {
            user.bio = bio;
        }

        if let Some(is_streamer) = updated_user.is_streamer {
            user.is_streamer = is_streamer;
        }

        Ok(user.clone())
    }

    async fn toggle_follow(&self, follower_id: PrimaryKey, target_id: PrimaryKey) -> Result<bool> {
        let mut state = self.state.lock();

        let _ = state.user(follower_id)?;
        let _ = state.user(target_id)?;

        let pair = (follower_id, target_id);
        let following = if state.follows.contains(&pair) {
            state.follows.retain(|p| *p != pair);
            false
        } else {
            state.follows.push(pair);
            true
        };

        let step = if following { 1 } else { -1 };

        if let Some(target) = state.users.iter_mut().find(|u| u.id == target_id) {
            target.follower_count += step;
        }

        if let Some(follower) = state.users.iter_mut().find(|u| u.id == follower_id) {
            follower.following_count += step;
        }

        Ok(following)
    }

    async fn followers_of(&self, user_id: PrimaryKey) -> Result<Vec<UserData>> {
        let state = self.state.lock();

        let _ = state.user(user_id)?;

        state
            .follows
            .iter()
            .filter(|(_, followed)| *followed == user_id)
            .map(|(follower, _)| state.user(*follower).cloned())
            .collect()
    }

    async fn following_of(&self, user_id: PrimaryKey) -> Result<Vec<UserData>> {
        let state = self.state.lock();

        let _ = state.user(user_id)?;

        state
            .follows
            .iter()
            .filter(|(follower, _)| *follower == user_id)
            .map(|(_, followed)| state.user(*followed).cloned())
            .collect()
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        let state = self.state.lock();

        let session = state
            .sessions
            .iter()
            .find(|s| s.token == token)
            .ok_or(DatabaseError::NotFound {
                resource: "session",
                identifier: "token",
            })?;

        Ok(SessionData {
            id: session.id,
            token: session.token.clone(),
            expires_at: session.expires_at,
            user: state.user(session.user_id)?.clone(),
        })
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        let mut state = self.state.lock();

        if state.sessions.iter().any(|s| s.token == new_session.token) {
            return Err(DatabaseError::Conflict {
                resource: "session",
                field: "token",
                value: new_session.token,
            });
        }

        let user = state.user(new_session.user_id)?.clone();
        let session = StoredSession {
            id: state.next_id(),
            token: new_session.token,
            user_id: new_session.user_id,
            expires_at: new_session.expires_at,
        };

        let data = SessionData {
            id: session.id,
            token: session.token.clone(),
            expires_at: session.expires_at,
            user,
        };

        state.sessions.push(session);

        Ok(data)
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<()> {
        let mut state = self.state.lock();

        if !state.sessions.iter().any(|s| s.token == token) {
            return Err(DatabaseError::NotFound {
                resource: "session",
                identifier: "token",
            });
        }

        state.sessions.retain(|s| s.token != token);

        Ok(())
    }

    async fn clear_expired_sessions(&self) -> Result<()> {
        let now = Utc::now();
        self.state.lock().sessions.retain(|s| s.expires_at > now);

        Ok(())
    }

    async fn stream_by_id(&self, stream_id: PrimaryKey) -> Result<StreamData> {
        self.state.lock().stream(stream_id)
    }

    async fn create_stream(&self, new_stream: NewStream) -> Result<StreamData> {
        let mut state = self.state.lock();

        if state
            .streams
            .iter()
            .any(|s| s.streamer_id == new_stream.streamer_id && s.data.is_live)
        {
            return Err(DatabaseError::Conflict {
                resource: "stream",
                field: "streamer_id",
                value: new_stream.streamer_id.to_string(),
            });
        }

        // Channel names are unique over the full history, ended included
        if state
            .streams
            .iter()
            .any(|s| s.data.channel_name == new_stream.channel_name)
        {
            return Err(DatabaseError::Conflict {
                resource: "stream",
                field: "channel_name",
                value: new_stream.channel_name,
            });
        }

        let streamer = state.user(new_stream.streamer_id)?.clone();

        let data = StreamData {
            id: state.next_id(),
            title: new_stream.title,
            description: new_stream.description,
            category: new_stream.category,
            tags: new_stream.tags,
            channel_name: new_stream.channel_name,
            is_live: true,
            started_at: Utc::now(),
            ended_at: None,
            duration_seconds: 0,
            viewer_count: 0,
            peak_viewer_count: 0,
            total_view_count: 0,
            chat_enabled: true,
            slow_mode_enabled: false,
            slow_mode_delay_seconds: 0,
            followers_only_chat: false,
            banned_user_ids: vec![],
            moderator_ids: vec![],
            recording_id: None,
            streamer,
        };

        state.streams.push(StoredStream {
            data: data.clone(),
            streamer_id: new_stream.streamer_id,
        });

        Ok(data)
    }

    async fn end_stream(
        &self,
        stream_id: PrimaryKey,
        ended_at: DateTime<Utc>,
    ) -> Result<StreamData> {
        let mut state = self.state.lock();

        let stream = state
            .streams
            .iter_mut()
            .find(|s| s.data.id == stream_id && s.data.is_live)
            .ok_or(DatabaseError::NotFound {
                resource: "live stream",
                identifier: "id",
            })?;

        stream.data.is_live = false;
        stream.data.ended_at = Some(ended_at);
        stream.data.duration_seconds = (ended_at - stream.data.started_at).num_seconds().max(0);

        state.stream(stream_id)
    }

    async fn list_live_streams(&self, filter: &StreamFilter) -> Result<Vec<StreamData>> {
        let state = self.state.lock();

        let mut streams: Vec<_> = state
            .streams
            .iter()
            .filter(|s| s.data.is_live)
            .map(|s| state.stream(s.data.id))
            .collect::<Result<_>>()?;

        streams.retain(|s| filter.matches(s));
        streams.sort_by(|a, b| {
            b.viewer_count
                .cmp(&a.viewer_count)
                .then(a.started_at.cmp(&b.started_at))
                .then(a.id.cmp(&b.id))
        });

        Ok(streams)
    }

    async fn live_stream_by_streamer(&self, streamer_id: PrimaryKey) -> Result<StreamData> {
        let state = self.state.lock();

        let stored = state
            .streams
            .iter()
            .find(|s| s.streamer_id == streamer_id && s.data.is_live)
            .ok_or(DatabaseError::NotFound {
                resource: "live stream",
                identifier: "streamer_id",
            })?;

        state.stream(stored.data.id)
    }

    async fn update_viewer_counts(
        &self,
        stream_id: PrimaryKey,
        current: i64,
        peak: i64,
        new_view: bool,
    ) -> Result<()> {
        let mut state = self.state.lock();

        let stream = state
            .streams
            .iter_mut()
            .find(|s| s.data.id == stream_id && s.data.is_live)
            .ok_or(DatabaseError::NotFound {
                resource: "live stream",
                identifier: "id",
            })?;

        stream.data.viewer_count = current.max(0);
        stream.data.peak_viewer_count = stream.data.peak_viewer_count.max(peak);

        if new_view {
            stream.data.total_view_count += 1;
        }

        Ok(())
    }
}
