use chrono::{DateTime, Utc};

/// The type used for primary keys in the database.
pub type PrimaryKey = i64;

/// A codecast account
#[derive(Debug, Clone)]
pub struct UserData {
    pub id: PrimaryKey,
    pub username: String,
    pub email: String,
    pub password: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub bio: String,
    /// Set the first time the user starts a broadcast
    pub is_streamer: bool,
    pub follower_count: i64,
    pub following_count: i64,
}

/// Login session data for authentication
#[derive(Debug, Clone)]
pub struct SessionData {
    pub id: PrimaryKey,
    /// The session token, or key if you will
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// The user that is logged in
    pub user: UserData,
}

/// One broadcast lifecycle instance, from start to end.
#[derive(Debug, Clone)]
pub struct StreamData {
    pub id: PrimaryKey,
    pub title: String,
    pub description: String,
    pub category: StreamCategory,
    pub tags: Vec<String>,
    /// The routing key shared between the media relay and the chat room.
    /// Unique across all streams ever created, never reused.
    pub channel_name: String,
    pub is_live: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: i64,

    pub viewer_count: i64,
    pub peak_viewer_count: i64,
    pub total_view_count: i64,

    pub chat_enabled: bool,
    pub slow_mode_enabled: bool,
    pub slow_mode_delay_seconds: i64,
    pub followers_only_chat: bool,

    pub banned_user_ids: Vec<PrimaryKey>,
    pub moderator_ids: Vec<PrimaryKey>,

    /// Recorded content to redirect to once the stream has ended
    pub recording_id: Option<PrimaryKey>,

    /// The broadcaster that owns this stream
    pub streamer: UserData,
}

impl StreamData {
    pub fn streamer_id(&self) -> PrimaryKey {
        self.streamer.id
    }
}

/// The fixed set of stream categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamCategory {
    Frontend,
    Backend,
    AiMl,
    DevOps,
    Systems,
    OpenSource,
    #[default]
    Other,
}

impl StreamCategory {
    /// The wire and storage name of the category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Frontend => "Frontend",
            Self::Backend => "Backend",
            Self::AiMl => "AI/ML",
            Self::DevOps => "DevOps",
            Self::Systems => "Systems",
            Self::OpenSource => "OpenSource",
            Self::Other => "Other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Frontend" => Some(Self::Frontend),
            "Backend" => Some(Self::Backend),
            "AI/ML" => Some(Self::AiMl),
            "DevOps" => Some(Self::DevOps),
            "Systems" => Some(Self::Systems),
            "OpenSource" => Some(Self::OpenSource),
            "Other" => Some(Self::Other),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub display_name: String,
}

/// An allow-listed patch of mutable user fields. Absent fields are untouched.
#[derive(Debug, Default)]
pub struct UpdatedUser {
    pub id: PrimaryKey,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub is_streamer: Option<bool>,
}

#[derive(Debug)]
pub struct NewSession {
    pub token: String,
    pub user_id: PrimaryKey,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewStream {
    pub streamer_id: PrimaryKey,
    pub channel_name: String,
    pub title: String,
    pub description: String,
    pub category: StreamCategory,
    pub tags: Vec<String>,
}

/// Restrictions applied when listing live streams.
#[derive(Debug, Default)]
pub struct StreamFilter {
    /// Exact category match when present
    pub category: Option<StreamCategory>,
    /// Case-insensitive substring match against title, tags, or category
    pub search: Option<String>,
}

impl StreamFilter {
    /// Whether a stream record passes the filter.
    pub fn matches(&self, stream: &StreamData) -> bool {
        if let Some(category) = self.category {
            if stream.category != category {
                return false;
            }
        }

        if let Some(search) = &self.search {
            let needle = search.to_lowercase();

            let in_title = stream.title.to_lowercase().contains(&needle);
            let in_category = stream.category.as_str().to_lowercase().contains(&needle);
            let in_tags = stream
                .tags
                .iter()
                .any(|t| t.to_lowercase().contains(&needle));

            if !(in_title || in_category || in_tags) {
                return false;
            }
        }

        true
    }
}
