//! All schemas that are exposed from endpoints are defined here
//! along with the conversion impls

use chrono::{DateTime, Utc};
use codecast_core::JoinCredential;
use codecast_live::{SessionData, StartedStream, StreamData, UserData};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub bio: String,
    pub is_streamer: bool,
    pub follower_count: i64,
    pub following_count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserList {
    pub count: usize,
    pub users: Vec<User>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FollowResult {
    /// Whether the requester is now following the target
    pub following: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResult {
    pub token: String,
    pub user: User,
}

/// Everything a client needs to join the media-relay channel.
#[derive(Debug, Serialize, ToSchema)]
pub struct CredentialGrant {
    pub app_id: String,
    pub channel_name: String,
    pub token: String,
    pub uid: u32,
    pub role: String,
    pub expires_at: DateTime<Utc>,
}

/// The public view of a stream. Ban lists and other private moderation
/// internals never serialize outward.
#[derive(Debug, Serialize, ToSchema)]
pub struct Stream {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    pub channel_name: String,
    pub started_at: DateTime<Utc>,
    pub viewer_count: i64,
    pub peak_viewer_count: i64,
    pub total_view_count: i64,
    pub chat_enabled: bool,
    pub slow_mode_enabled: bool,
    pub slow_mode_delay_seconds: i64,
    pub followers_only_chat: bool,
    pub streamer: User,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StartStreamResult {
    pub stream: Stream,
    pub credentials: CredentialGrant,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StreamList {
    pub count: usize,
    pub streams: Vec<Stream>,
}

/// A stream lookup either yields a watchable stream or the terminal ended
/// shape pointing at recorded content.
#[derive(Debug, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamLookup {
    Live {
        stream: Stream,
        credentials: CredentialGrant,
    },
    Ended {
        stream_id: i64,
        recording_id: Option<i64>,
        message: String,
    },
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EndStreamResult {
    pub duration_seconds: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ActiveStream {
    pub is_live: bool,
    pub stream: Option<Stream>,
    pub credentials: Option<CredentialGrant>,
}

impl CredentialGrant {
    pub fn new(app_id: &str, credential: &JoinCredential) -> Self {
        Self {
            app_id: app_id.to_string(),
            channel_name: credential.channel_name.clone(),
            token: credential.token.clone(),
            uid: credential.uid,
            role: credential.role.as_str().to_string(),
            expires_at: credential.expires_at,
        }
    }
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl ToSerialized<User> for UserData {
    fn to_serialized(&self) -> User {
        User {
            id: self.id,
            username: self.username.clone(),
            display_name: self.display_name.clone(),
            avatar_url: self.avatar_url.clone(),
            bio: self.bio.clone(),
            is_streamer: self.is_streamer,
            follower_count: self.follower_count,
            following_count: self.following_count,
        }
    }
}

impl ToSerialized<LoginResult> for SessionData {
    fn to_serialized(&self) -> LoginResult {
        LoginResult {
            token: self.token.clone(),
            user: self.user.to_serialized(),
        }
    }
}

impl ToSerialized<Stream> for StreamData {
    fn to_serialized(&self) -> Stream {
        Stream {
            id: self.id,
            title: self.title.clone(),
            description: self.description.clone(),
            category: self.category.as_str().to_string(),
            tags: self.tags.clone(),
            channel_name: self.channel_name.clone(),
            started_at: self.started_at,
            viewer_count: self.viewer_count,
            peak_viewer_count: self.peak_viewer_count,
            total_view_count: self.total_view_count,
            chat_enabled: self.chat_enabled,
            slow_mode_enabled: self.slow_mode_enabled,
            slow_mode_delay_seconds: self.slow_mode_delay_seconds,
            followers_only_chat: self.followers_only_chat,
            streamer: self.streamer.to_serialized(),
        }
    }
}

impl ToSerialized<StartStreamResult> for StartedStream {
    fn to_serialized(&self) -> StartStreamResult {
        StartStreamResult {
            stream: self.stream.to_serialized(),
            credentials: CredentialGrant::new(&self.app_id, &self.credential),
        }
    }
}
