use crate::{
    auth::token::TokenError,
    services::{OwnershipError, ServiceError},
    storage::ObjectStoreError,
};
use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

const INTERNAL_MESSAGE: &str = "internal server error";

/// Error returned by every handler. The message is what the client sees, so
/// internal details are logged and replaced before one is built.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Logs `detail` and answers with a generic 500.
    pub fn internal(detail: impl fmt::Display) -> Self {
        tracing::error!("internal error: {}", detail);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::warn!("rejected request body: {}", rejection.body_text());
        AppError::bad_request(rejection.body_text())
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed | TokenError::TooEarly => {
                tracing::warn!("token rejected: {}", err);
                AppError::bad_request(err.to_string())
            }
            TokenError::SignatureInvalid | TokenError::Expired => {
                tracing::warn!("token rejected: {}", err);
                AppError::unauthorized(err.to_string())
            }
            TokenError::Signing(_) => AppError::internal(err),
        }
    }
}

impl From<OwnershipError> for AppError {
    fn from(err: OwnershipError) -> Self {
        match err {
            // A valid token whose account no longer exists.
            OwnershipError::NotFound(_) => {
                tracing::warn!("{}", err);
                AppError::unauthorized("unknown account")
            }
            OwnershipError::Ambiguous { .. } | OwnershipError::Repository(_) => {
                AppError::internal(err)
            }
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Malformed(msg) => {
                tracing::warn!("malformed request: {}", msg);
                AppError::bad_request(msg)
            }
            ServiceError::Unauthorized => {
                tracing::warn!("{}", err);
                AppError::unauthorized("invalid credentials")
            }
            // Photo operations answer "not yours" and "does not exist" alike.
            ServiceError::Forbidden | ServiceError::NotFound(_) => {
                tracing::warn!("{}", err);
                AppError::bad_request("photo not found or not accessible")
            }
            ServiceError::Conflict(msg) => {
                tracing::warn!("conflict: {}", msg);
                AppError::conflict(msg)
            }
            ServiceError::Token(err) => err.into(),
            ServiceError::Ownership(err) => err.into(),
            ServiceError::Storage(ObjectStoreError::InvalidObjectKey) => {
                tracing::warn!("{}", err);
                AppError::bad_request("invalid photo id")
            }
            ServiceError::Storage(_)
            | ServiceError::Repository(_)
            | ServiceError::Hashing(_)
            | ServiceError::Join(_) => AppError::internal(err),
        }
    }
}
