use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{repository::RepoError, storage::StorageError, upload::UploadRejection};

/// ErrorResponse
///
/// JSON envelope returned for every rejected request:
/// `{"error": {"code": "...", "message": "..."}}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// AppError
///
/// The single error type surfaced by middleware and handlers. Every variant is
/// scoped to the offending request and is converted into a status code plus a
/// JSON body at the boundary; nothing here is retried or fatal to the process.
#[derive(Debug, Error)]
pub enum AppError {
    /// No bearer token was supplied.
    #[error("authentication token missing")]
    AuthenticationMissing,
    /// The token failed signature, expiry, or shape checks.
    #[error("authentication token invalid or expired")]
    AuthenticationInvalid,
    /// A permission check ran without identity context in the request.
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("insufficient permissions")]
    InsufficientPermissions,
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("payload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },
    #[error("{0}")]
    Validation(String),
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("internal server error")]
    Internal,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::AuthenticationMissing
            | AppError::NotAuthenticated
            | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::AuthenticationInvalid | AppError::InsufficientPermissions => {
                StatusCode::FORBIDDEN
            }
            AppError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::AuthenticationMissing => "AUTHENTICATION_MISSING",
            AppError::AuthenticationInvalid => "AUTHENTICATION_INVALID",
            AppError::NotAuthenticated => "NOT_AUTHENTICATED",
            AppError::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            AppError::UnsupportedMediaType(_) => "UNSUPPORTED_MEDIA_TYPE",
            AppError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            AppError::Validation(_) => "VALIDATION_FAILED",
            AppError::InvalidCredentials => "INVALID_CREDENTIALS",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Internal => "INTERNAL_SERVER_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code().to_string(),
                message: self.to_string(),
            },
        };

        (self.status(), Json(body)).into_response()
    }
}

impl From<RepoError> for AppError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::Conflict(message) => AppError::Conflict(message),
            RepoError::InvalidReference(message) => AppError::Validation(message),
            RepoError::Db(e) => {
                tracing::error!(error = ?e, "database error");
                AppError::Internal
            }
        }
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        tracing::error!(error = %e, "storage error");
        AppError::Internal
    }
}

impl From<UploadRejection> for AppError {
    fn from(rejection: UploadRejection) -> Self {
        match rejection {
            UploadRejection::UnsupportedMediaType { declared } => {
                AppError::UnsupportedMediaType(declared)
            }
            UploadRejection::PayloadTooLarge { limit } => AppError::PayloadTooLarge { limit },
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::Validation(e.to_string())
    }
}
