use std::{
    env,
    net::{Ipv6Addr, SocketAddr},
    sync::Arc,
};

use axum::{routing::get, Json};
use codecast_live::Live;
use log::info;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;

mod auth;
mod context;
mod docs;
mod errors;
mod gateway;
pub mod logging;
mod schemas;
mod serialized;
mod streams;
mod users;

pub use context::ServerContext;
pub use errors::{ServerError, ServerResult};

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9070;

pub type Router = axum::Router<ServerContext>;

/// Starts the codecast server
pub async fn run_server(live: Arc<Live>) {
    let port = env::var("CODECAST_SERVER_PORT")
        .map(|x| x.parse::<u16>().expect("Port must be a number"))
        .unwrap_or(DEFAULT_PORT);

    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let version_one_router = Router::new()
        .nest("/auth", auth::router())
        .nest("/users", users::router())
        .nest("/streams", streams::router())
        .nest("/gateway", gateway::router());

    let root_router = Router::new()
        .nest("/v1", version_one_router)
        .route("/api.json", get(serve_api))
        .layer(cors)
        .with_state(ServerContext { live });

    let listener = TcpListener::bind(&addr).await.expect("listens on address");

    info!("Listening on port {port}");

    axum::serve(listener, root_router.into_make_service())
        .await
        .unwrap();
}

async fn serve_api() -> Json<utoipa::openapi::OpenApi> {
    Json(docs::ApiDoc::openapi())
}
