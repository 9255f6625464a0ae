use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

mod data;
pub use data::*;

mod memory;
pub use memory::*;

mod pg;
pub use pg::*;

pub type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the database doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
}

/// Helper trait to reduce boilerplate
pub trait IntoDatabaseError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError;
    fn any(self) -> DatabaseError;
}

/// Helper trait to reduce boilerplate
pub trait DatabaseResult {
    /// Turns the Result into a conflict error if it's Ok()
    fn conflict_or_ok(self, resource: &'static str, field: &'static str, value: &str)
        -> Result<()>;
}

impl<T> DatabaseResult for Result<T> {
    fn conflict_or_ok(
        self,
        resource: &'static str,
        field: &'static str,
        value: &str,
    ) -> Result<()> {
        match self {
            Ok(_) => Err(DatabaseError::Conflict {
                resource,
                field,
                value: value.to_string(),
            }),
            Err(e) => match e {
                DatabaseError::NotFound {
                    resource: _,
                    identifier: _,
                } => Ok(()),
                e => Err(e),
            },
        }
    }
}

/// Represents a type that can fetch and store codecast records.
///
/// Create operations are serialized with respect to their uniqueness checks:
/// concurrent `create_stream` calls for the same streamer resolve to exactly
/// one success, and concurrent `end_stream` calls to one winner.
#[async_trait]
pub trait Database: Send + Sync {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData>;
    async fn user_by_username(&self, username: &str) -> Result<UserData>;
    async fn create_user(&self, new_user: NewUser) -> Result<UserData>;
    async fn update_user(&self, updated_user: UpdatedUser) -> Result<UserData>;

    /// Follows the target when no follow exists, unfollows otherwise, and
    /// keeps both users' counters in step. Returns true when the follower
    /// is now following the target.
    async fn toggle_follow(&self, follower_id: PrimaryKey, target_id: PrimaryKey) -> Result<bool>;
    async fn followers_of(&self, user_id: PrimaryKey) -> Result<Vec<UserData>>;
    async fn following_of(&self, user_id: PrimaryKey) -> Result<Vec<UserData>>;

    async fn session_by_token(&self, token: &str) -> Result<SessionData>;
    async fn create_session(&self, new_session: NewSession) -> Result<SessionData>;
    async fn delete_session_by_token(&self, token: &str) -> Result<()>;
    async fn clear_expired_sessions(&self) -> Result<()>;

    async fn stream_by_id(&self, stream_id: PrimaryKey) -> Result<StreamData>;
    /// Creates a live stream. Fails with [DatabaseError::Conflict] on
    /// `streamer_id` when the streamer already has a live stream, and on
    /// `channel_name` when the routing key is taken.
    async fn create_stream(&self, new_stream: NewStream) -> Result<StreamData>;
    /// Transitions a live stream to ended, computing its duration. Fails
    /// with [DatabaseError::NotFound] when no *live* stream has this id, so
    /// only one of any number of concurrent callers succeeds.
    async fn end_stream(&self, stream_id: PrimaryKey, ended_at: DateTime<Utc>)
        -> Result<StreamData>;
    /// Lists live streams passing the filter, busiest first.
    async fn list_live_streams(&self, filter: &StreamFilter) -> Result<Vec<StreamData>>;
    async fn live_stream_by_streamer(&self, streamer_id: PrimaryKey) -> Result<StreamData>;
    /// The presence counter path: sets the current viewer count (clamped at
    /// zero), raises the stored peak monotonically, and optionally counts a
    /// new view. Only applies to live streams.
    async fn update_viewer_counts(
        &self,
        stream_id: PrimaryKey,
        current: i64,
        peak: i64,
        new_view: bool,
    ) -> Result<()>;
}
