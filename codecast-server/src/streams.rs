use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json,
};
use codecast_live::{NewStreamRequest, StreamView};

use crate::{
    auth::Session,
    context::ServerContext,
    errors::ServerResult,
    schemas::{StartStreamSchema, StreamQuery, ValidatedJson},
    serialized::{
        ActiveStream, CredentialGrant, EndStreamResult, StartStreamResult, StreamList,
        StreamLookup, ToSerialized,
    },
    Router,
};

#[utoipa::path(
    post,
    path = "/v1/streams/start",
    tag = "streams",
    request_body = StartStreamSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 201, body = StartStreamResult),
        (status = 409, description = "The broadcaster already has a live stream")
    )
)]
pub(crate) async fn start_stream(
    session: Session,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<StartStreamSchema>,
) -> ServerResult<(StatusCode, Json<StartStreamResult>)> {
    let started = context
        .live
        .streams
        .start(
            session.user().id,
            NewStreamRequest {
                title: body.title,
                description: body.description,
                category: body.category,
                tags: body.tags,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(started.to_serialized())))
}

#[utoipa::path(
    get,
    path = "/v1/streams",
    tag = "streams",
    params(StreamQuery),
    responses(
        (status = 200, body = StreamList)
    )
)]
pub(crate) async fn list_streams(
    State(context): State<ServerContext>,
    Query(query): Query<StreamQuery>,
) -> ServerResult<Json<StreamList>> {
    let streams = context
        .live
        .streams
        .list(query.category.as_deref(), query.search.as_deref())
        .await?;

    Ok(Json(StreamList {
        count: streams.len(),
        streams: streams.to_serialized(),
    }))
}

#[utoipa::path(
    get,
    path = "/v1/streams/{id}",
    tag = "streams",
    responses(
        (status = 200, body = StreamLookup),
        (status = 404, description = "No stream with this id was ever live")
    )
)]
pub(crate) async fn get_stream(
    State(context): State<ServerContext>,
    Path(stream_id): Path<i64>,
) -> ServerResult<Json<StreamLookup>> {
    let lookup = match context.live.streams.get(stream_id).await? {
        StreamView::Live {
            stream,
            credential,
            app_id,
        } => StreamLookup::Live {
            credentials: CredentialGrant::new(&app_id, &credential),
            stream: stream.to_serialized(),
        },
        StreamView::Ended {
            stream_id,
            recording_id,
        } => StreamLookup::Ended {
            stream_id,
            recording_id,
            message: "Stream has ended".to_string(),
        },
    };

    Ok(Json(lookup))
}

#[utoipa::path(
    put,
    path = "/v1/streams/{id}/end",
    tag = "streams",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = EndStreamResult),
        (status = 403, description = "Only the owning broadcaster can end a stream"),
        (status = 409, description = "The stream has already ended")
    )
)]
pub(crate) async fn end_stream(
    session: Session,
    State(context): State<ServerContext>,
    Path(stream_id): Path<i64>,
) -> ServerResult<Json<EndStreamResult>> {
    let ended = context
        .live
        .streams
        .end(stream_id, session.user().id)
        .await?;

    Ok(Json(EndStreamResult {
        duration_seconds: ended.duration_seconds,
    }))
}

#[utoipa::path(
    get,
    path = "/v1/streams/my/active",
    tag = "streams",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = ActiveStream)
    )
)]
pub(crate) async fn my_active_stream(
    session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<ActiveStream>> {
    let active = context
        .live
        .streams
        .active_for_broadcaster(session.user().id)
        .await?;

    let result = match active {
        Some(started) => ActiveStream {
            is_live: true,
            credentials: Some(CredentialGrant::new(&started.app_id, &started.credential)),
            stream: Some(started.stream.to_serialized()),
        },
        None => ActiveStream {
            is_live: false,
            stream: None,
            credentials: None,
        },
    };

    Ok(Json(result))
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_streams))
        .route("/start", post(start_stream))
        .route("/my/active", get(my_active_stream))
        .route("/:id", get(get_stream))
        .route("/:id/end", put(end_stream))
}
