//! Request body extractor accepting JSON or form encoding.

use axum::{
    Form, Json,
    extract::{FromRequest, Request},
    http::header::CONTENT_TYPE,
};
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// Body decoded as JSON when the request says so, as a urlencoded form
/// otherwise.
#[derive(Debug, Clone)]
pub struct Payload<T>(pub T);

impl<S, T> FromRequest<S> for Payload<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/json"));

        if is_json {
            let Json(value) = Json::<T>::from_request(req, state)
                .await
                .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
            Ok(Self(value))
        } else {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
            Ok(Self(value))
        }
    }
}
