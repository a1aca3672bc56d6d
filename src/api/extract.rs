/// JSON body extractor with the API's error shape
use crate::error::PocketError;
use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;

/// Like `axum::Json`, but a bad body is a `400 InvalidRequest`
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = PocketError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| ApiJson(value))
            .map_err(rejection_error)
    }
}

fn rejection_error(rejection: JsonRejection) -> PocketError {
    tracing::debug!(status = %rejection.status(), "Rejected request body");
    PocketError::Validation(rejection.body_text())
}
