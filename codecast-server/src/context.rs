use std::sync::Arc;

use axum::extract::FromRef;
use codecast_live::Live;

#[derive(Clone, FromRef)]
pub struct ServerContext {
    pub live: Arc<Live>,
}
