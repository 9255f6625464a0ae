use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json,
};
use codecast_live::ProfileUpdate;

use crate::{
    auth::Session,
    context::ServerContext,
    errors::ServerResult,
    schemas::{UpdateProfileSchema, ValidatedJson},
    serialized::{FollowResult, ToSerialized, User, UserList},
    Router,
};

#[utoipa::path(
    get,
    path = "/v1/users/{username}",
    tag = "users",
    responses(
        (status = 200, body = User),
        (status = 404, description = "No user with this username exists")
    )
)]
pub(crate) async fn profile(
    State(context): State<ServerContext>,
    Path(username): Path<String>,
) -> ServerResult<Json<User>> {
    let user = context.live.social.profile_by_username(&username).await?;

    Ok(Json(user.to_serialized()))
}

#[utoipa::path(
    put,
    path = "/v1/users/me",
    tag = "users",
    request_body = UpdateProfileSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = User)
    )
)]
pub(crate) async fn update_profile(
    session: Session,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<UpdateProfileSchema>,
) -> ServerResult<Json<User>> {
    let updated = context
        .live
        .social
        .update_profile(
            session.user().id,
            ProfileUpdate {
                display_name: body.display_name,
                avatar_url: body.avatar_url,
                bio: body.bio,
            },
        )
        .await?;

    Ok(Json(updated.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/users/{id}/follow",
    tag = "users",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = FollowResult),
        (status = 400, description = "Users cannot follow themselves")
    )
)]
pub(crate) async fn follow(
    session: Session,
    State(context): State<ServerContext>,
    Path(user_id): Path<i64>,
) -> ServerResult<Json<FollowResult>> {
    let toggle = context
        .live
        .social
        .toggle_follow(session.user().id, user_id)
        .await?;

    Ok(Json(FollowResult {
        following: toggle.following,
    }))
}

#[utoipa::path(
    get,
    path = "/v1/users/{id}/followers",
    tag = "users",
    responses(
        (status = 200, body = UserList)
    )
)]
pub(crate) async fn followers(
    State(context): State<ServerContext>,
    Path(user_id): Path<i64>,
) -> ServerResult<Json<UserList>> {
    let followers = context.live.social.followers(user_id).await?;

    Ok(Json(UserList {
        count: followers.len(),
        users: followers.to_serialized(),
    }))
}

#[utoipa::path(
    get,
    path = "/v1/users/me/following",
    tag = "users",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = UserList)
    )
)]
pub(crate) async fn my_following(
    session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<UserList>> {
    let following = context.live.social.following(session.user().id).await?;

    Ok(Json(UserList {
        count: following.len(),
        users: following.to_serialized(),
    }))
}

pub fn router() -> Router {
    // One parameter name across the sibling routes, as the router requires
    Router::new()
        .route("/me", put(update_profile))
        .route("/me/following", get(my_following))
        .route("/:id", get(profile))
        .route("/:id/follow", post(follow))
        .route("/:id/followers", get(followers))
}
