//! Error-to-response mapping.
//!
//! # Responsibilities
//! - One error type for every handler and middleware
//! - Map each error kind to its status code and `{ "error": .. }` body
//! - Attach retry metadata to 429 responses
//!
//! # Design Decisions
//! - Messages are generic; internal details go to logs, not clients
//! - Upstream failures keep the `{ success: false, error }` envelope shape

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::push::{DispatchError, RegistryError};
use crate::remote::RemoteError;
use crate::security::rate_limit::{now_epoch_millis, RateLimitDecision};
use crate::security::AuthError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Authentication(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Unsupported Media Type")]
    UnsupportedMediaType,

    #[error("Too many requests")]
    RateLimited(RateLimitDecision),

    #[error("{message}")]
    Upstream { status: StatusCode, message: String },

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream { status, .. } => *status,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        match self {
            Self::RateLimited(decision) => {
                let retry_after = decision.retry_after_secs(now_epoch_millis());
                let mut response = (
                    status,
                    Json(json!({ "error": "Too many requests", "retryAfter": retry_after })),
                )
                    .into_response();
                let headers = response.headers_mut();
                decision.apply_headers(headers);
                headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
                response
            }
            Self::Upstream { message, .. } => {
                (status, Json(json!({ "success": false, "error": message }))).into_response()
            }
            other => (status, Json(json!({ "error": other.to_string() }))).into_response(),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Validation(_) => ApiError::Validation(err.to_string()),
            RegistryError::Store(e) => {
                tracing::error!(error = %e, "Subscription store failed");
                ApiError::Internal("Subscription store unavailable".to_string())
            }
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::MissingTitle => ApiError::Validation(err.to_string()),
            DispatchError::Registry(e) => ApiError::from(e),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(_: AuthError) -> Self {
        ApiError::Authentication("Unauthorized".to_string())
    }
}

impl From<RemoteError> for ApiError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::NotConfigured => {
                ApiError::Unavailable("Remote data service is not configured".to_string())
            }
            other => {
                tracing::error!(error = %other, "Remote data service call failed");
                ApiError::Upstream {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "Remote data service unavailable".to_string(),
                }
            }
        }
    }
}
