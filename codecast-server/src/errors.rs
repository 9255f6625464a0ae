use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::warn;
use serde_json::json;
use thiserror::Error;
use codecast_live::{AuthError, DatabaseError, SocialError, StreamError};

pub type ServerResult<T> = Result<T, ServerError>;

/// The externally visible error taxonomy. Every response carries a stable
/// kind and a human-readable message; internals never leak past
/// [ServerError::Unknown].
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthenticated(&'static str),
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("{0}")]
    Forbidden(String),
    #[error("{resource}:{identifier} not found")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
    #[error("{0}")]
    Conflict(String),
    #[error("Stream has already ended")]
    AlreadyEnded,
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials => StatusCode::BAD_REQUEST,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::AlreadyEnded => StatusCode::CONFLICT,
            Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::InvalidCredentials => "invalid_credentials",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound { .. } => "not_found",
            Self::Conflict(_) => "conflict",
            Self::AlreadyEnded => "already_ended",
            Self::Unknown(_) => "internal",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        // Unexpected failures are logged with detail but reported generically
        let message = match &self {
            Self::Unknown(detail) => {
                warn!("Request failed with internal error: {detail}");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "error": self.kind(),
            "message": message,
        });

        (self.as_status_code(), Json(body)).into_response()
    }
}

impl From<DatabaseError> for ServerError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::NotFound {
                resource,
                identifier,
            } => Self::NotFound {
                resource,
                identifier,
            },
            e @ DatabaseError::Conflict { .. } => Self::Conflict(e.to_string()),
            e => Self::Unknown(e.to_string()),
        }
    }
}

impl From<AuthError> for ServerError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::InvalidCredentials => Self::InvalidCredentials,
            AuthError::Db(e) => e.into(),
            e => Self::Unknown(e.to_string()),
        }
    }
}

impl From<SocialError> for ServerError {
    fn from(value: SocialError) -> Self {
        match value {
            SocialError::Validation(message) => Self::Validation(message.to_string()),
            SocialError::NotFound => Self::NotFound {
                resource: "user",
                identifier: "id",
            },
            SocialError::Db(e) => e.into(),
        }
    }
}

impl From<StreamError> for ServerError {
    fn from(value: StreamError) -> Self {
        match value {
            StreamError::Validation(message) => Self::Validation(message.to_string()),
            e @ StreamError::AlreadyLive => Self::Conflict(e.to_string()),
            StreamError::NotFound => Self::NotFound {
                resource: "stream",
                identifier: "id",
            },
            e @ StreamError::Forbidden => Self::Forbidden(e.to_string()),
            StreamError::AlreadyEnded => Self::AlreadyEnded,
            StreamError::Db(e) => e.into(),
            e => Self::Unknown(e.to_string()),
        }
    }
}
