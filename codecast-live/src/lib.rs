mod auth;
mod db;
mod events;
mod rooms;
mod social;
mod streams;

use std::sync::Arc;

pub use auth::*;
pub use db::*;
pub use events::*;
pub use rooms::*;
pub use social::*;
pub use streams::*;

use codecast_core::{ArcedStore, TokenIssuer, UidGenerator};
use log::{debug, warn};

/// The codecast live system, facilitating stream lifecycle, presence
/// tracking, real-time fan-out, and authentication.
pub struct Live {
    context: LiveContext,

    pub auth: Auth,
    pub streams: StreamRegistry,
    pub rooms: RoomRouter,
    pub social: Social,
}

/// A type passed to the components of the live system, to access shared
/// state and collaborators.
#[derive(Clone)]
pub struct LiveContext {
    pub database: Arc<dyn Database>,
    pub issuer: Arc<TokenIssuer>,
    pub uids: Arc<dyn UidGenerator>,

    /// The in-memory room map, keyed by stream id. Process-local: fanning
    /// out across processes requires a shared pub/sub layer on top.
    pub rooms: ArcedStore<PrimaryKey, Room>,
}

impl Live {
    pub fn new(
        database: Arc<dyn Database>,
        issuer: TokenIssuer,
        uids: Arc<dyn UidGenerator>,
    ) -> Self {
        let context = LiveContext {
            database,
            issuer: Arc::new(issuer),
            uids,
            rooms: Default::default(),
        };

        Self {
            auth: Auth::new(&context),
            streams: StreamRegistry::new(&context),
            rooms: RoomRouter::new(&context),
            social: Social::new(&context),
            context,
        }
    }

    pub fn context(&self) -> &LiveContext {
        &self.context
    }
}

impl LiveContext {
    /// The single writer path for a stream's presence counters.
    ///
    /// Best-effort: persistence failures are logged and the next membership
    /// change retries with fresh values, so brief staleness is possible but
    /// drift is not.
    pub(crate) async fn update_stream_presence(
        &self,
        stream_id: PrimaryKey,
        current: i64,
        peak: i64,
        new_view: bool,
    ) {
        let result = self
            .database
            .update_viewer_counts(stream_id, current, peak, new_view)
            .await;

        match result {
            Ok(()) => {}
            // The stream ended or never existed; nothing to reconcile
            Err(DatabaseError::NotFound { .. }) => {
                debug!("Skipping viewer counts for stream {stream_id}: not live")
            }
            Err(e) => warn!("Failed to persist viewer counts for stream {stream_id}: {e}"),
        }
    }
}
