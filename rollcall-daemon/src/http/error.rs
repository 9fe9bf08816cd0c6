//! HTTP error mapping and the JSON response envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::{RegistrationError, Rejection};

/// Body shape shared by every JSON endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

/// Errors surfaced to HTTP clients.
///
/// Internal details are logged where the error is created; response bodies
/// only carry the public message.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    /// Missing or wrong shared secret.
    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("the LMS is unavailable, please try again later")]
    Upstream,

    #[error("rate limit exceeded, please try again later")]
    RateLimited,

    #[error("internal server error")]
    Internal,
}

impl ApiError {
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Upstream => StatusCode::BAD_GATEWAY,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(ApiResponse::failure(self.to_string()))).into_response()
    }
}

impl From<Rejection> for ApiError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::Validation(msg) => Self::BadRequest(msg),
            r @ (Rejection::HandshakeNotFound | Rejection::NoCourseRegistered) => {
                Self::NotFound(r.to_string())
            }
            r @ (Rejection::InvalidToken | Rejection::GuildMismatch | Rejection::NotEnrolled) => {
                Self::Forbidden(r.to_string())
            }
            r @ Rejection::HandshakePending => Self::Conflict(r.to_string()),
            Rejection::Transient(_) => Self::Upstream,
            Rejection::Store(e) => {
                tracing::error!(error = %e, "Store failure during verification");
                Self::Internal
            }
            Rejection::Internal(msg) => {
                tracing::error!(error = %msg, "Internal failure during verification");
                Self::Internal
            }
        }
    }
}

impl From<RegistrationError> for ApiError {
    fn from(e: RegistrationError) -> Self {
        match e {
            RegistrationError::Validation(msg) => Self::BadRequest(msg),
            e @ RegistrationError::Unauthorized => Self::Forbidden(e.to_string()),
            e @ RegistrationError::Conflict => Self::Conflict(e.to_string()),
            RegistrationError::Upstream(_) | RegistrationError::Platform(_) => Self::Upstream,
            RegistrationError::Store(e) => {
                tracing::error!(error = %e, "Store failure during registration");
                Self::Internal
            }
        }
    }
}
