/*
 * Responsibility
 * - HTTP-facing AppError and its IntoResponse (status + plain-text body)
 * - Fold auth / path / storage / multipart errors into it
 * - Auth and storage details go to the log only, never to the response body
 */
use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

use crate::services::auth::AuthError;
use crate::services::storage::{PathError, StorageError};

pub const NO_FILES_FOUND: &str = "no files found in request";
pub const PATH_CONFLICT: &str = "upload path conflicts with an existing directory";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("{0}")]
    BadRequest(String),
    #[error("payload too large")]
    PayloadTooLarge,
    #[error("internal server error")]
    Internal,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn no_files() -> Self {
        Self::bad_request(NO_FILES_FOUND)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, self.to_string()).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(_: AuthError) -> Self {
        AppError::Unauthorized
    }
}

impl From<PathError> for AppError {
    fn from(e: PathError) -> Self {
        AppError::bad_request(e.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        if let StorageError::Conflict { path } = &e {
            warn!(path = ?path, "upload refused: file would replace a directory");
            return AppError::bad_request(PATH_CONFLICT);
        }
        error!(error = %e, "upload storage failed");
        AppError::Internal
    }
}

impl From<MultipartError> for AppError {
    fn from(e: MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return AppError::PayloadTooLarge;
        }
        AppError::bad_request(format!("invalid multipart body: {}", e.body_text()))
    }
}
