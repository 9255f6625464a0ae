use chrono::Utc;
use codecast_core::{random_string, CredentialError, JoinCredential, Role};
use log::info;
use thiserror::Error;

use crate::{
    DatabaseError, LiveContext, NewStream, PrimaryKey, RoomEvent, StreamCategory, StreamData,
    StreamFilter, UpdatedUser,
};

pub const MAX_TITLE_LENGTH: usize = 100;
pub const MAX_DESCRIPTION_LENGTH: usize = 500;
pub const MAX_TAGS: usize = 5;
pub const MAX_TAG_LENGTH: usize = 30;

/// The sentinel category filter value meaning "no restriction".
const ALL_CATEGORIES: &str = "ALL";

/// The authoritative record of broadcast sessions.
///
/// Owns the `NONE -> LIVE -> ENDED` lifecycle: one live stream per
/// broadcaster, fresh channel names on every start, and exactly-once ending.
pub struct StreamRegistry {
    context: LiveContext,
}

/// A request to go live.
#[derive(Debug, Default)]
pub struct NewStreamRequest {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
}

impl NewStreamRequest {
    pub fn titled(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Default::default()
        }
    }
}

/// A successful start or credential refresh: the session plus a publisher
/// credential for its channel.
#[derive(Debug)]
pub struct StartedStream {
    pub stream: StreamData,
    pub credential: JoinCredential,
    pub app_id: String,
}

#[derive(Debug)]
pub struct EndedStream {
    pub duration_seconds: i64,
}

/// What a viewer gets when looking up a stream by id.
#[derive(Debug)]
pub enum StreamView {
    /// The stream is live: the full public view plus a fresh subscriber
    /// credential.
    Live {
        stream: StreamData,
        credential: JoinCredential,
        app_id: String,
    },
    /// The stream ended. Distinct from not-found so callers can redirect to
    /// recorded content.
    Ended {
        stream_id: PrimaryKey,
        recording_id: Option<PrimaryKey>,
    },
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("{0}")]
    Validation(&'static str),
    #[error("A live stream already exists. End it before starting a new one")]
    AlreadyLive,
    #[error("stream:id doesn't exist")]
    NotFound,
    #[error("Only the broadcaster can end this stream")]
    Forbidden,
    #[error("Stream has already ended")]
    AlreadyEnded,
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    Db(DatabaseError),
}

impl StreamRegistry {
    pub fn new(context: &LiveContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Starts a new live stream for a broadcaster.
    ///
    /// Fails with [StreamError::AlreadyLive] when the broadcaster already
    /// has one: the check-and-create is serialized by the record store, so
    /// concurrent starts cannot both succeed.
    pub async fn start(
        &self,
        broadcaster_id: PrimaryKey,
        request: NewStreamRequest,
    ) -> Result<StartedStream, StreamError> {
        let new_stream = NewStream {
            streamer_id: broadcaster_id,
            channel_name: format!("stream_{}", random_string(8)),
            title: validated_title(&request.title)?,
            description: validated_description(request.description)?,
            category: validated_category(request.category)?,
            tags: validated_tags(request.tags)?,
        };

        let stream = self
            .context
            .database
            .create_stream(new_stream)
            .await
            .map_err(|e| match e {
                DatabaseError::Conflict {
                    field: "streamer_id",
                    ..
                } => StreamError::AlreadyLive,
                e => StreamError::Db(e),
            })?;

        // The profile flag other collaborators read to show "streamer" badges
        self.context
            .database
            .update_user(UpdatedUser {
                id: broadcaster_id,
                is_streamer: Some(true),
                ..Default::default()
            })
            .await
            .map_err(StreamError::Db)?;

        info!(
            "{} went live on channel {} ({})",
            stream.streamer.username, stream.channel_name, stream.title
        );

        self.with_credential(stream, Role::Publisher)
    }

    /// Ends a live stream. Only the owning broadcaster may end it, and only
    /// the first of any concurrent callers succeeds; the rest observe
    /// [StreamError::AlreadyEnded].
    pub async fn end(
        &self,
        stream_id: PrimaryKey,
        requester_id: PrimaryKey,
    ) -> Result<EndedStream, StreamError> {
        let stream = self.stream_by_id(stream_id).await?;

        if stream.streamer_id() != requester_id {
            return Err(StreamError::Forbidden);
        }

        if !stream.is_live {
            return Err(StreamError::AlreadyEnded);
        }

        let ended = self
            .context
            .database
            .end_stream(stream_id, Utc::now())
            .await
            .map_err(|e| match e {
                // Another caller won the transition in the meantime
                DatabaseError::NotFound { .. } => StreamError::AlreadyEnded,
                e => StreamError::Db(e),
            })?;

        info!(
            "Stream {} on channel {} ended after {}s",
            ended.id, ended.channel_name, ended.duration_seconds
        );

        // Best-effort lifecycle fan-out, dispatched after the transition
        // committed. Failure to notify never fails the end call.
        let context = self.context.clone();
        tokio::spawn(async move {
            let room = context.rooms.get(&stream_id).map(|r| r.value().clone());

            if let Some(room) = room {
                room.broadcast(RoomEvent::StreamEnded {
                    stream_id,
                    message: "Stream has ended".to_string(),
                });
            }
        });

        Ok(EndedStream {
            duration_seconds: ended.duration_seconds,
        })
    }

    /// Looks up a stream for watching. Live streams come with a fresh
    /// subscriber credential; ended streams return the terminal shape.
    pub async fn get(&self, stream_id: PrimaryKey) -> Result<StreamView, StreamError> {
        let stream = self.stream_by_id(stream_id).await?;

        if !stream.is_live {
            return Ok(StreamView::Ended {
                stream_id: stream.id,
                recording_id: stream.recording_id,
            });
        }

        let view = self.with_credential(stream, Role::Subscriber)?;

        Ok(StreamView::Live {
            stream: view.stream,
            credential: view.credential,
            app_id: view.app_id,
        })
    }

    /// Lists live streams, busiest first.
    ///
    /// `category` restricts to an exact match unless absent or the `ALL`
    /// sentinel; an unknown category matches nothing. `search` matches
    /// case-insensitively against title, tags, and category.
    pub async fn list(
        &self,
        category: Option<&str>,
        search: Option<&str>,
    ) -> Result<Vec<StreamData>, StreamError> {
        let category = match category {
            None => None,
            Some(value) if value.eq_ignore_ascii_case(ALL_CATEGORIES) => None,
            Some(value) => match StreamCategory::parse(value) {
                Some(category) => Some(category),
                // Exact-match semantics: an unknown category matches nothing
                None => return Ok(vec![]),
            },
        };

        let filter = StreamFilter {
            category,
            search: search
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
        };

        self.context
            .database
            .list_live_streams(&filter)
            .await
            .map_err(StreamError::Db)
    }

    /// The broadcaster's own "am I live" check. Re-issues a publisher
    /// credential for the active stream so an expired one can be refreshed;
    /// the uid is drawn fresh, not session-persisted.
    pub async fn active_for_broadcaster(
        &self,
        broadcaster_id: PrimaryKey,
    ) -> Result<Option<StartedStream>, StreamError> {
        let stream = match self
            .context
            .database
            .live_stream_by_streamer(broadcaster_id)
            .await
        {
            Ok(stream) => stream,
            Err(DatabaseError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(StreamError::Db(e)),
        };

        self.with_credential(stream, Role::Publisher).map(Some)
    }

    async fn stream_by_id(&self, stream_id: PrimaryKey) -> Result<StreamData, StreamError> {
        self.context
            .database
            .stream_by_id(stream_id)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound { .. } => StreamError::NotFound,
                e => StreamError::Db(e),
            })
    }

    fn with_credential(
        &self,
        stream: StreamData,
        role: Role,
    ) -> Result<StartedStream, StreamError> {
        let uid = self.context.uids.next_uid();
        let credential = self.context.issuer.issue(&stream.channel_name, uid, role)?;

        Ok(StartedStream {
            stream,
            credential,
            app_id: self.context.issuer.app_id().to_string(),
        })
    }
}

fn validated_title(title: &str) -> Result<String, StreamError> {
    let title = title.trim();

    if title.is_empty() {
        return Err(StreamError::Validation("Title is required"));
    }

    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(StreamError::Validation(
            "Title must be at most 100 characters",
        ));
    }

    Ok(title.to_string())
}

fn validated_description(description: Option<String>) -> Result<String, StreamError> {
    let description = description.unwrap_or_default();

    if description.chars().count() > MAX_DESCRIPTION_LENGTH {
        return Err(StreamError::Validation(
            "Description must be at most 500 characters",
        ));
    }

    Ok(description)
}

fn validated_category(category: Option<String>) -> Result<StreamCategory, StreamError> {
    match category {
        None => Ok(StreamCategory::default()),
        Some(value) => {
            StreamCategory::parse(&value).ok_or(StreamError::Validation("Unknown category"))
        }
    }
}

fn validated_tags(tags: Vec<String>) -> Result<Vec<String>, StreamError> {
    if tags.len() > MAX_TAGS {
        return Err(StreamError::Validation("A stream can have up to 5 tags"));
    }

    if tags
        .iter()
        .any(|t| t.trim().is_empty() || t.chars().count() > MAX_TAG_LENGTH)
    {
        return Err(StreamError::Validation(
            "Tags must be 1 to 30 characters long",
        ));
    }

    Ok(tags)
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;
    use crate::{Live, MemoryDatabase, NewAccount, UserData};
    use codecast_core::{ProviderConfig, SequenceUidGenerator, TokenIssuer};

    fn live() -> Live {
        let config = ProviderConfig::new("app".to_string(), "secret".to_string())
            .expect("config is valid");

        Live::new(
            Arc::new(MemoryDatabase::new()),
            TokenIssuer::new(config),
            Arc::new(SequenceUidGenerator::default()),
        )
    }

    async fn register(live: &Live, username: &str) -> UserData {
        live.auth
            .register(NewAccount {
                username: username.to_string(),
                email: format!("{username}@codecast.dev"),
                password: "hunter2hunter2".to_string(),
                display_name: username.to_string(),
            })
            .await
            .expect("registration succeeds")
    }

    #[tokio::test]
    async fn test_start_requires_a_title() {
        let live = live();
        let user = register(&live, "amara").await;

        let result = live.streams.start(user.id, NewStreamRequest::titled("  ")).await;

        assert!(matches!(result, Err(StreamError::Validation(_))));
    }

    #[tokio::test]
    async fn test_start_returns_channel_and_publisher_credential() {
        let live = live();
        let user = register(&live, "amara").await;

        let started = live
            .streams
            .start(user.id, NewStreamRequest::titled("Hello"))
            .await
            .expect("stream starts");

        assert!(!started.stream.channel_name.is_empty());
        assert_eq!(started.credential.role, Role::Publisher);
        assert_eq!(started.credential.channel_name, started.stream.channel_name);

        // Starting marks the broadcaster as a streamer
        let user = live.context().database.user_by_id(user.id).await.unwrap();
        assert!(user.is_streamer);
    }

    #[tokio::test]
    async fn test_second_start_conflicts_while_live() {
        let live = live();
        let user = register(&live, "amara").await;

        live.streams
            .start(user.id, NewStreamRequest::titled("Hello"))
            .await
            .expect("first start succeeds");

        let result = live
            .streams
            .start(user.id, NewStreamRequest::titled("Hello again"))
            .await;

        assert!(matches!(result, Err(StreamError::AlreadyLive)));
    }

    #[tokio::test]
    async fn test_concurrent_starts_yield_one_live_stream() {
        let live = Arc::new(live());
        let user_id = register(&live, "amara").await.id;

        let attempts: Vec<_> = (0..8)
            .map(|i| {
                let live = live.clone();
                tokio::spawn(async move {
                    live.streams
                        .start(user_id, NewStreamRequest::titled(&format!("Attempt {i}")))
                        .await
                })
            })
            .collect();

        let mut successes = 0;
        let mut conflicts = 0;

        for attempt in attempts {
            match attempt.await.expect("task completes") {
                Ok(_) => successes += 1,
                Err(StreamError::AlreadyLive) => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(conflicts, 7);
    }

    #[tokio::test]
    async fn test_channel_names_are_never_reused() {
        let live = live();
        let user = register(&live, "amara").await;

        let mut seen = HashSet::new();

        for i in 0..10 {
            let started = live
                .streams
                .start(user.id, NewStreamRequest::titled(&format!("Round {i}")))
                .await
                .expect("stream starts");

            assert!(
                seen.insert(started.stream.channel_name.clone()),
                "channel name was reused"
            );

            live.streams
                .end(started.stream.id, user.id)
                .await
                .expect("stream ends");
        }
    }

    #[tokio::test]
    async fn test_end_is_owner_only_and_exactly_once() {
        let live = live();
        let broadcaster = register(&live, "amara").await;
        let intruder = register(&live, "niko").await;

        let started = live
            .streams
            .start(broadcaster.id, NewStreamRequest::titled("Hello"))
            .await
            .expect("stream starts");

        let forbidden = live.streams.end(started.stream.id, intruder.id).await;
        assert!(matches!(forbidden, Err(StreamError::Forbidden)));

        live.streams
            .end(started.stream.id, broadcaster.id)
            .await
            .expect("first end succeeds");

        let again = live.streams.end(started.stream.id, broadcaster.id).await;
        assert!(matches!(again, Err(StreamError::AlreadyEnded)));
    }

    #[tokio::test]
    async fn test_concurrent_ends_yield_one_success() {
        let live = Arc::new(live());
        let user_id = register(&live, "amara").await.id;

        let started = live
            .streams
            .start(user_id, NewStreamRequest::titled("Hello"))
            .await
            .expect("stream starts");

        let stream_id = started.stream.id;

        let attempts: Vec<_> = (0..8)
            .map(|_| {
                let live = live.clone();
                tokio::spawn(async move { live.streams.end(stream_id, user_id).await })
            })
            .collect();

        let mut successes = 0;
        let mut already_ended = 0;

        for attempt in attempts {
            match attempt.await.expect("task completes") {
                Ok(_) => successes += 1,
                Err(StreamError::AlreadyEnded) => already_ended += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(already_ended, 7);
    }

    #[tokio::test]
    async fn test_end_notifies_the_room() {
        let live = live();
        let user = register(&live, "amara").await;

        let started = live
            .streams
            .start(user.id, NewStreamRequest::titled("Hello"))
            .await
            .expect("stream starts");

        let (viewer, mut events) = live.rooms.register();
        live.rooms.join(viewer, started.stream.id).await;

        live.streams
            .end(started.stream.id, user.id)
            .await
            .expect("stream ends");

        // The notification is dispatched as a separate task
        let event = tokio::time::timeout(std::time::Duration::from_secs(1), events.recv())
            .await
            .expect("event arrives in time")
            .expect("channel stays open");

        match event {
            RoomEvent::StreamEnded { stream_id, .. } => {
                assert_eq!(stream_id, started.stream.id)
            }
            other => panic!("expected a stream ended event, got {other:?}"),
        }

        // Exactly one notification per member
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_get_mints_subscriber_credentials() {
        let live = live();
        let user = register(&live, "amara").await;

        let started = live
            .streams
            .start(user.id, NewStreamRequest::titled("Hello"))
            .await
            .expect("stream starts");

        let view = live
            .streams
            .get(started.stream.id)
            .await
            .expect("stream resolves");

        match view {
            StreamView::Live { credential, stream, .. } => {
                assert_eq!(credential.role, Role::Subscriber);
                assert_eq!(credential.channel_name, started.stream.channel_name);
                // A viewer credential is distinct from the publisher's
                assert_ne!(credential.token, started.credential.token);
                assert_eq!(stream.id, started.stream.id);
            }
            other => panic!("expected a live view, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ended_streams_return_the_terminal_shape() {
        let live = live();
        let user = register(&live, "amara").await;

        let started = live
            .streams
            .start(user.id, NewStreamRequest::titled("Hello"))
            .await
            .expect("stream starts");

        live.streams
            .end(started.stream.id, user.id)
            .await
            .expect("stream ends");

        let view = live
            .streams
            .get(started.stream.id)
            .await
            .expect("lookup still resolves");

        assert!(matches!(view, StreamView::Ended { stream_id, .. } if stream_id == started.stream.id));

        // A missing id is still a plain not-found
        let missing = live.streams.get(9999).await;
        assert!(matches!(missing, Err(StreamError::NotFound)));
    }

    #[tokio::test]
    async fn test_list_filters_and_sorts() {
        let live = live();

        let amara = register(&live, "amara").await;
        let niko = register(&live, "niko").await;
        let rosa = register(&live, "rosa").await;

        let backend = NewStreamRequest {
            title: "Writing a database".to_string(),
            category: Some("Backend".to_string()),
            tags: vec!["rust".to_string()],
            ..Default::default()
        };

        let busy_backend = NewStreamRequest {
            title: "Scaling queues".to_string(),
            category: Some("Backend".to_string()),
            ..Default::default()
        };

        let frontend = NewStreamRequest {
            title: "CSS tricks".to_string(),
            category: Some("Frontend".to_string()),
            ..Default::default()
        };

        let quiet = live.streams.start(amara.id, backend).await.unwrap();
        let busy = live.streams.start(niko.id, busy_backend).await.unwrap();
        live.streams.start(rosa.id, frontend).await.unwrap();

        // Give the busy stream some viewers
        let (viewer, _events) = live.rooms.register();
        live.rooms.join(viewer, busy.stream.id).await;

        let listed = live
            .streams
            .list(Some("Backend"), None)
            .await
            .expect("list succeeds");

        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, busy.stream.id);
        assert_eq!(listed[1].id, quiet.stream.id);
        assert!(listed.iter().all(|s| s.category == StreamCategory::Backend));

        // The ALL sentinel lifts the restriction
        let all = live.streams.list(Some("ALL"), None).await.unwrap();
        assert_eq!(all.len(), 3);

        // Unknown categories match nothing
        let none = live.streams.list(Some("Cooking"), None).await.unwrap();
        assert!(none.is_empty());

        // Search matches tags case-insensitively
        let searched = live.streams.list(None, Some("RUST")).await.unwrap();
        assert_eq!(searched.len(), 1);
        assert_eq!(searched[0].id, quiet.stream.id);

        // Ended streams disappear from the listing
        live.streams.end(busy.stream.id, niko.id).await.unwrap();
        let listed = live.streams.list(Some("Backend"), None).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_active_refreshes_publisher_credentials() {
        let live = live();
        let user = register(&live, "amara").await;

        assert!(live
            .streams
            .active_for_broadcaster(user.id)
            .await
            .expect("check succeeds")
            .is_none());

        let started = live
            .streams
            .start(user.id, NewStreamRequest::titled("Hello"))
            .await
            .expect("stream starts");

        let active = live
            .streams
            .active_for_broadcaster(user.id)
            .await
            .expect("check succeeds")
            .expect("stream is live");

        assert_eq!(active.stream.id, started.stream.id);
        assert_eq!(active.credential.role, Role::Publisher);
        // Each refresh draws a fresh provider-scoped uid
        assert_ne!(active.credential.uid, started.credential.uid);
    }

    #[tokio::test]
    async fn test_duration_matches_wall_clock() {
        let live = live();
        let user = register(&live, "amara").await;

        let started = live
            .streams
            .start(user.id, NewStreamRequest::titled("Hello"))
            .await
            .expect("stream starts");

        let ended = live
            .streams
            .end(started.stream.id, user.id)
            .await
            .expect("stream ends");

        // Started and ended within the same test run
        assert!(ended.duration_seconds >= 0 && ended.duration_seconds <= 1);

        let record = live
            .context()
            .database
            .stream_by_id(started.stream.id)
            .await
            .unwrap();

        let elapsed = (record.ended_at.expect("ended at is set") - record.started_at).num_seconds();
        assert_eq!(record.duration_seconds, elapsed);
    }
}
