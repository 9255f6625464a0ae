use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    Error as SqlxError, PgPool, Row,
};

use crate::{
    Database, DatabaseError, DatabaseResult, IntoDatabaseError, NewSession, NewStream, NewUser,
    PrimaryKey, Result, SessionData, StreamCategory, StreamData, StreamFilter, UpdatedUser,
    UserData,
};

/// Every stream query goes through this join so records always carry their
/// broadcaster.
const STREAM_SELECT: &str = "
    SELECT
        streams.*,
        users.username AS streamer_username,
        users.email AS streamer_email,
        users.password AS streamer_password,
        users.display_name AS streamer_display_name,
        users.avatar_url AS streamer_avatar_url,
        users.bio AS streamer_bio,
        users.is_streamer AS streamer_is_streamer,
        users.follower_count AS streamer_follower_count,
        users.following_count AS streamer_following_count
    FROM streams
        INNER JOIN users ON streams.streamer_id = users.id";

/// A postgres database implementation for codecast
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    // Persistence calls are bounded so a wedged statement
                    // cannot stall a request forever
                    sqlx::query("SET statement_timeout = '5s'")
                        .execute(conn)
                        .await?;

                    Ok(())
                })
            })
            .connect(url)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        Ok(Self { pool })
    }

    async fn user_by_email(&self, email: &str) -> Result<UserData> {
        let row = sqlx::query("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "email"))?;

        user_from_row(&row)
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        let row = sqlx::query("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "id"))?;

        user_from_row(&row)
    }

    async fn user_by_username(&self, username: &str) -> Result<UserData> {
        let row = sqlx::query("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "username"))?;

        user_from_row(&row)
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        self.user_by_username(&new_user.username)
            .await
            .conflict_or_ok("user", "username", &new_user.username)?;

        self.user_by_email(&new_user.email)
            .await
            .conflict_or_ok("user", "email", &new_user.email)?;

        let row = sqlx::query(
            "INSERT INTO users (username, email, password, display_name)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.password)
        .bind(&new_user.display_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?;

        user_from_row(&row)
    }

    async fn update_user(&self, updated_user: UpdatedUser) -> Result<UserData> {
        let user = self.user_by_id(updated_user.id).await?;

        sqlx::query(
            "UPDATE users SET
                display_name = $1,
                avatar_url = $2,
                bio = $3,
                is_streamer = $4
            WHERE id = $5",
        )
        .bind(updated_user.display_name.unwrap_or(user.display_name))
        .bind(updated_user.avatar_url.or(user.avatar_url))
        .bind(updated_user.bio.unwrap_or(user.bio))
        .bind(updated_user.is_streamer.unwrap_or(user.is_streamer))
        .bind(updated_user.id)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        self.user_by_id(updated_user.id).await
    }

    async fn toggle_follow(&self, follower_id: PrimaryKey, target_id: PrimaryKey) -> Result<bool> {
        // Ensure both users exist
        let _ = self.user_by_id(follower_id).await?;
        let _ = self.user_by_id(target_id).await?;

        let removed = sqlx::query(
            "DELETE FROM follows WHERE follower_id = $1 AND followed_id = $2",
        )
        .bind(follower_id)
        .bind(target_id)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?
        .rows_affected();

        let (following, step) = if removed > 0 {
            (false, -1_i64)
        } else {
            sqlx::query("INSERT INTO follows (follower_id, followed_id) VALUES ($1, $2)")
                .bind(follower_id)
                .bind(target_id)
                .execute(&self.pool)
                .await
                .map_err(|e| e.any())?;

            (true, 1)
        };

        sqlx::query("UPDATE users SET follower_count = follower_count + $1 WHERE id = $2")
            .bind(step)
            .bind(target_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        sqlx::query("UPDATE users SET following_count = following_count + $1 WHERE id = $2")
            .bind(step)
            .bind(follower_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        Ok(following)
    }

    async fn followers_of(&self, user_id: PrimaryKey) -> Result<Vec<UserData>> {
        // Ensure user exists
        let _ = self.user_by_id(user_id).await?;

        let rows = sqlx::query(
            "SELECT users.* FROM follows
                INNER JOIN users ON follows.follower_id = users.id
            WHERE follows.followed_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        rows.iter().map(user_from_row).collect()
    }

    async fn following_of(&self, user_id: PrimaryKey) -> Result<Vec<UserData>> {
        // Ensure user exists
        let _ = self.user_by_id(user_id).await?;

        let rows = sqlx::query(
            "SELECT users.* FROM follows
                INNER JOIN users ON follows.followed_id = users.id
            WHERE follows.follower_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        rows.iter().map(user_from_row).collect()
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        let row = sqlx::query(
            "SELECT
                sessions.*,
                users.username,
                users.email,
                users.password,
                users.display_name,
                users.avatar_url,
                users.bio,
                users.is_streamer,
                users.follower_count,
                users.following_count
            FROM sessions
                INNER JOIN users ON sessions.user_id = users.id
            WHERE token = $1",
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("session", "token"))?;

        session_from_row(&row)
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        self.session_by_token(&new_session.token)
            .await
            .conflict_or_ok("session", "token", &new_session.token)?;

        let row = sqlx::query(
            "INSERT INTO sessions (token, user_id, expires_at)
             VALUES ($1, $2, $3)
             RETURNING token",
        )
        .bind(&new_session.token)
        .bind(new_session.user_id)
        .bind(new_session.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?;

        let token: String = row.try_get("token").map_err(|e| e.any())?;

        self.session_by_token(&token).await
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<()> {
        // Ensure session exists
        let _ = self.session_by_token(token).await?;

        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn clear_expired_sessions(&self) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE now() > expires_at")
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn stream_by_id(&self, stream_id: PrimaryKey) -> Result<StreamData> {
        let row = sqlx::query(&format!("{STREAM_SELECT} WHERE streams.id = $1"))
            .bind(stream_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("stream", "id"))?;

        stream_from_row(&row)
    }

    async fn create_stream(&self, new_stream: NewStream) -> Result<StreamData> {
        let row = sqlx::query(
            "INSERT INTO streams (streamer_id, channel_name, title, description, category, tags)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id",
        )
        .bind(new_stream.streamer_id)
        .bind(&new_stream.channel_name)
        .bind(&new_stream.title)
        .bind(&new_stream.description)
        .bind(new_stream.category.as_str())
        .bind(&new_stream.tags)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| stream_insert_error(e, &new_stream))?;

        let id: PrimaryKey = row.try_get("id").map_err(|e| e.any())?;

        self.stream_by_id(id).await
    }

    async fn end_stream(
        &self,
        stream_id: PrimaryKey,
        ended_at: DateTime<Utc>,
    ) -> Result<StreamData> {
        // The `is_live` condition makes concurrent ends race to a single
        // winner inside the database
        sqlx::query(
            "UPDATE streams SET
                is_live = false,
                ended_at = $2,
                duration_seconds = GREATEST(CAST(EXTRACT(EPOCH FROM ($2 - started_at)) AS BIGINT), 0)
            WHERE id = $1 AND is_live
            RETURNING id",
        )
        .bind(stream_id)
        .bind(ended_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("live stream", "id"))?;

        self.stream_by_id(stream_id).await
    }

    async fn list_live_streams(&self, filter: &StreamFilter) -> Result<Vec<StreamData>> {
        let rows = sqlx::query(&format!(
            "{STREAM_SELECT}
            WHERE streams.is_live
                AND ($1::text IS NULL OR streams.category = $1)
                AND ($2::text IS NULL
                    OR streams.title ILIKE '%' || $2 || '%'
                    OR streams.category ILIKE '%' || $2 || '%'
                    OR EXISTS (
                        SELECT 1 FROM unnest(streams.tags) AS tag
                        WHERE tag ILIKE '%' || $2 || '%'
                    ))
            ORDER BY streams.viewer_count DESC, streams.started_at ASC, streams.id ASC"
        ))
        .bind(filter.category.map(|c| c.as_str()))
        .bind(filter.search.as_deref())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        rows.iter().map(stream_from_row).collect()
    }

    async fn live_stream_by_streamer(&self, streamer_id: PrimaryKey) -> Result<StreamData> {
        let row = sqlx::query(&format!(
            "{STREAM_SELECT} WHERE streams.streamer_id = $1 AND streams.is_live"
        ))
        .bind(streamer_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("live stream", "streamer_id"))?;

        stream_from_row(&row)
    }

    async fn update_viewer_counts(
        &self,
        stream_id: PrimaryKey,
        current: i64,
        peak: i64,
        new_view: bool,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE streams SET
                viewer_count = GREATEST($2, 0),
                peak_viewers = GREATEST(peak_viewers, $3),
                total_views = total_views + $4
            WHERE id = $1 AND is_live",
        )
        .bind(stream_id)
        .bind(current)
        .bind(peak)
        .bind(if new_view { 1_i64 } else { 0 })
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound {
                resource: "live stream",
                identifier: "id",
            });
        }

        Ok(())
    }
}

fn user_from_row(row: &PgRow) -> Result<UserData> {
    Ok(UserData {
        id: row.try_get("id").map_err(|e| e.any())?,
        username: row.try_get("username").map_err(|e| e.any())?,
        email: row.try_get("email").map_err(|e| e.any())?,
        password: row.try_get("password").map_err(|e| e.any())?,
        display_name: row.try_get("display_name").map_err(|e| e.any())?,
        avatar_url: row.try_get("avatar_url").map_err(|e| e.any())?,
        bio: row.try_get("bio").map_err(|e| e.any())?,
        is_streamer: row.try_get("is_streamer").map_err(|e| e.any())?,
        follower_count: row.try_get("follower_count").map_err(|e| e.any())?,
        following_count: row.try_get("following_count").map_err(|e| e.any())?,
    })
}

fn session_from_row(row: &PgRow) -> Result<SessionData> {
    Ok(SessionData {
        id: row.try_get("id").map_err(|e| e.any())?,
        token: row.try_get("token").map_err(|e| e.any())?,
        expires_at: row.try_get("expires_at").map_err(|e| e.any())?,
        user: UserData {
            id: row.try_get("user_id").map_err(|e| e.any())?,
            username: row.try_get("username").map_err(|e| e.any())?,
            email: row.try_get("email").map_err(|e| e.any())?,
            password: row.try_get("password").map_err(|e| e.any())?,
            display_name: row.try_get("display_name").map_err(|e| e.any())?,
            avatar_url: row.try_get("avatar_url").map_err(|e| e.any())?,
            bio: row.try_get("bio").map_err(|e| e.any())?,
            is_streamer: row.try_get("is_streamer").map_err(|e| e.any())?,
            follower_count: row.try_get("follower_count").map_err(|e| e.any())?,
            following_count: row.try_get("following_count").map_err(|e| e.any())?,
        },
    })
}

fn stream_from_row(row: &PgRow) -> Result<StreamData> {
    let category: String = row.try_get("category").map_err(|e| e.any())?;

    Ok(StreamData {
        id: row.try_get("id").map_err(|e| e.any())?,
        title: row.try_get("title").map_err(|e| e.any())?,
        description: row.try_get("description").map_err(|e| e.any())?,
        category: StreamCategory::parse(&category).unwrap_or_default(),
        tags: row.try_get("tags").map_err(|e| e.any())?,
        channel_name: row.try_get("channel_name").map_err(|e| e.any())?,
        is_live: row.try_get("is_live").map_err(|e| e.any())?,
        started_at: row.try_get("started_at").map_err(|e| e.any())?,
        ended_at: row.try_get("ended_at").map_err(|e| e.any())?,
        duration_seconds: row.try_get("duration_seconds").map_err(|e| e.any())?,
        viewer_count: row.try_get("viewer_count").map_err(|e| e.any())?,
        peak_viewer_count: row.try_get("peak_viewers").map_err(|e| e.any())?,
        total_view_count: row.try_get("total_views").map_err(|e| e.any())?,
        chat_enabled: row.try_get("chat_enabled").map_err(|e| e.any())?,
        slow_mode_enabled: row.try_get("slow_mode").map_err(|e| e.any())?,
        slow_mode_delay_seconds: row.try_get("slow_mode_delay_seconds").map_err(|e| e.any())?,
        followers_only_chat: row.try_get("followers_only_chat").map_err(|e| e.any())?,
        banned_user_ids: row.try_get("banned_user_ids").map_err(|e| e.any())?,
        moderator_ids: row.try_get("moderator_ids").map_err(|e| e.any())?,
        recording_id: row.try_get("recording_id").map_err(|e| e.any())?,
        streamer: UserData {
            id: row.try_get("streamer_id").map_err(|e| e.any())?,
            username: row.try_get("streamer_username").map_err(|e| e.any())?,
            email: row.try_get("streamer_email").map_err(|e| e.any())?,
            password: row.try_get("streamer_password").map_err(|e| e.any())?,
            display_name: row.try_get("streamer_display_name").map_err(|e| e.any())?,
            avatar_url: row.try_get("streamer_avatar_url").map_err(|e| e.any())?,
            bio: row.try_get("streamer_bio").map_err(|e| e.any())?,
            is_streamer: row.try_get("streamer_is_streamer").map_err(|e| e.any())?,
            follower_count: row.try_get("streamer_follower_count").map_err(|e| e.any())?,
            following_count: row
                .try_get("streamer_following_count")
                .map_err(|e| e.any())?,
        },
    })
}

/// Maps unique violations on stream insert to the conflicts callers care
/// about: one live stream per streamer, and channel name reuse.
fn stream_insert_error(error: SqlxError, new_stream: &NewStream) -> DatabaseError {
    if let SqlxError::Database(db_error) = &error {
        if db_error.is_unique_violation() {
            return match db_error.constraint() {
                Some("one_live_stream_per_streamer") => DatabaseError::Conflict {
                    resource: "stream",
                    field: "streamer_id",
                    value: new_stream.streamer_id.to_string(),
                },
                _ => DatabaseError::Conflict {
                    resource: "stream",
                    field: "channel_name",
                    value: new_stream.channel_name.clone(),
                },
            };
        }
    }

    error.any()
}

impl IntoDatabaseError for SqlxError {
    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError {
        match self {
            SqlxError::RowNotFound => DatabaseError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }
}
