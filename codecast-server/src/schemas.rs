use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::errors::ServerError;

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterSchema {
    #[validate(length(min = 2, max = 32))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 64))]
    pub password: String,
    #[validate(length(min = 2, max = 64))]
    pub display_name: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginSchema {
    #[validate(length(max = 128))]
    pub username: String,
    #[validate(length(max = 64))]
    pub password: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StartStreamSchema {
    #[validate(length(min = 1, max = 100))]
    pub title: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    pub category: Option<String>,
    #[validate(length(max = 5))]
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileSchema {
    #[validate(length(min = 2, max = 64))]
    pub display_name: Option<String>,
    #[validate(length(max = 300))]
    pub avatar_url: Option<String>,
    #[validate(length(max = 160))]
    pub bio: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct StreamQuery {
    /// Restrict to an exact category, or `ALL` for no restriction
    pub category: Option<String>,
    /// Case-insensitive substring match against title, tags, and category
    pub search: Option<String>,
}

pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let extracted_json: Json<T> = Json::from_request(req, state)
            .await
            .map_err(|_| ServerError::Validation("JSON parse failed".to_string()))?;

        extracted_json
            .0
            .validate()
            .map_err(|e| ServerError::Validation(e.to_string()))?;

        Ok(Self(extracted_json.0))
    }
}
