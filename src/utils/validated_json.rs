//! JSON body extractors that run `validator` rules after deserializing.

use axum::{
    Json, async_trait,
    body::Bytes,
    extract::{FromRequest, Request, rejection::JsonRejection},
};
use serde::de::DeserializeOwned;
use tracing::debug;
use validator::Validate;

use crate::error::AppError;

/// Syntax errors map to 400; a well formed body of the wrong shape to 422.
fn map_rejection(rejection: JsonRejection) -> AppError {
    debug!(error = %rejection, "rejected json body");
    match rejection {
        JsonRejection::JsonDataError(e) => AppError::unprocessable(e.body_text()),
        _ => AppError::BadRequest("Request malformed".into()),
    }
}

#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(map_rejection)?;

        value.validate()?;

        Ok(ValidatedJson(value))
    }
}

/// Like [`ValidatedJson`] but yields `None` for an empty body. The content
/// type is not checked.
#[derive(Debug, Clone)]
pub struct OptionalValidatedJson<T>(pub Option<T>);

#[async_trait]
impl<S, T> FromRequest<S> for OptionalValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|_| AppError::BadRequest("Request malformed".into()))?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(OptionalValidatedJson(None));
        }

        let Json(value) = Json::<T>::from_bytes(&bytes).map_err(map_rejection)?;
        value.validate()?;

        Ok(OptionalValidatedJson(Some(value)))
    }
}
