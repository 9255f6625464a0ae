use utoipa::OpenApi;

use crate::{schemas, serialized};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "codecast API",
        description = "Exposes endpoints to interact with a codecast server"
    ),
    paths(
        crate::auth::register,
        crate::auth::login,
        crate::auth::logout,
        crate::auth::user,
        crate::users::profile,
        crate::users::update_profile,
        crate::users::follow,
        crate::users::followers,
        crate::users::my_following,
        crate::streams::start_stream,
        crate::streams::list_streams,
        crate::streams::get_stream,
        crate::streams::end_stream,
        crate::streams::my_active_stream,
    ),
    components(schemas(
        schemas::RegisterSchema,
        schemas::LoginSchema,
        schemas::StartStreamSchema,
        schemas::UpdateProfileSchema,
        serialized::User,
        serialized::UserList,
        serialized::FollowResult,
        serialized::LoginResult,
        serialized::CredentialGrant,
        serialized::Stream,
        serialized::StartStreamResult,
        serialized::StreamList,
        serialized::StreamLookup,
        serialized::EndStreamResult,
        serialized::ActiveStream,
    ))
)]
pub struct ApiDoc;
