use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::WWW_AUTHENTICATE},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::error;

/// Error type shared by every handler.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Field errors: `{"field": ["message", ...]}` or a list of those for batch bodies.
    #[error("validation failed")]
    Validation(Value),
    #[error("{0}")]
    BadRequest(String),
    /// Failed login or refresh.
    #[error("{0}")]
    Auth(String),
    /// Missing or unusable bearer credentials on a protected route.
    #[error("{0}")]
    Authz(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Single-field validation error.
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        Self::Validation(json!({ field: [message.into()] }))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(errors) => (StatusCode::BAD_REQUEST, Json(errors)).into_response(),
            Self::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            Self::Auth(message) => {
                (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response()
            }
            Self::Authz(message) => {
                let mut response =
                    (StatusCode::UNAUTHORIZED, Json(json!({ "detail": message }))).into_response();
                response
                    .headers_mut()
                    .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                response
            }
            Self::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
            }
            Self::Internal(err) => {
                error!("Internal error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}
