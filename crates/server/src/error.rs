use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Server error kinds, mapped one-to-one onto HTTP status codes.
///
/// Expired resources surface as `NotFound`, indistinguishable from resources
/// that never existed. Every token failure surfaces as `Forbidden` with no
/// detail about why, so a caller cannot probe signatures, scopes, or expiry
/// separately.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found")]
    NotFound,
    #[error("forbidden")]
    Forbidden,
    #[error("payload too large")]
    PayloadTooLarge,
    #[error("{0}")]
    Validation(String),
    #[error("storage unavailable")]
    Unavailable,
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = core::result::Result<T, Error>;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            Error::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            Error::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            Error::PayloadTooLarge => {
                (StatusCode::PAYLOAD_TOO_LARGE, "Payload too large".to_string())
            }
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            Error::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Storage unavailable".to_string(),
            ),
            Error::Internal(msg) => {
                tracing::error!("internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": error_message
            }
        }));

        (status, body).into_response()
    }
}

impl From<crate::tokens::TokenInvalid> for Error {
    fn from(_: crate::tokens::TokenInvalid) -> Self {
        Error::Forbidden
    }
}

impl From<ember_blob::BlobError> for Error {
    fn from(err: ember_blob::BlobError) -> Self {
        match err {
            ember_blob::BlobError::NotFound => Error::NotFound,
            ember_blob::BlobError::PayloadTooLarge { .. } => Error::PayloadTooLarge,
        }
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        tracing::error!("redis error: {err}");
        Error::Unavailable
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for Error {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Error::Internal(format!("token encoding failed: {err}"))
    }
}

impl From<bcrypt::BcryptError> for Error {
    fn from(err: bcrypt::BcryptError) -> Self {
        Error::Internal(format!("pin hashing failed: {err}"))
    }
}
