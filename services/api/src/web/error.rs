//! services/api/src/web/error.rs
//!
//! Maps request failures onto HTTP responses. Storage details are logged and
//! never sent to the caller.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use fee_tracker_core::{FieldError, PortError, UploadError, ValidationError};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

/// Body of every error response.
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldErrorBody>>,
}

/// One failing field of an upload or update.
#[derive(Serialize, ToSchema)]
pub struct FieldErrorBody {
    pub row: usize,
    pub field: String,
    pub message: String,
}

impl From<&FieldError> for FieldErrorBody {
    fn from(e: &FieldError) -> Self {
        Self {
            row: e.row,
            field: e.field.to_string(),
            message: e.message.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Unauthorized")]
    Unauthenticated,

    #[error("Validation failed")]
    Validation(ValidationError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("You cannot delete your own account.")]
    SelfDeletionDenied,

    #[error("{0}")]
    NotFound(String),

    /// The public message for a storage failure. The cause is logged where it happens.
    #[error("{0}")]
    Storage(String),
}

impl RequestError {
    /// Translates a port failure, logging the internal detail of unexpected errors.
    pub fn from_port(e: PortError, public_message: &str) -> Self {
        match e {
            PortError::NotFound(detail) => RequestError::NotFound(detail),
            PortError::Conflict(detail) => RequestError::Conflict(detail),
            PortError::Unauthorized => RequestError::Unauthenticated,
            PortError::Unexpected(detail) => {
                error!("{}: {}", public_message, detail);
                RequestError::Storage(public_message.to_string())
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RequestError::Unauthenticated => StatusCode::UNAUTHORIZED,
            RequestError::Validation(_)
            | RequestError::BadRequest(_)
            | RequestError::SelfDeletionDenied => StatusCode::BAD_REQUEST,
            RequestError::Conflict(_) => StatusCode::CONFLICT,
            RequestError::NotFound(_) => StatusCode::NOT_FOUND,
            RequestError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<UploadError> for RequestError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::Validation(v) => RequestError::Validation(v),
            UploadError::Storage(p) => RequestError::from_port(p, "Failed to upload students"),
        }
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            RequestError::Validation(v) => ErrorBody {
                error: "Validation failed".to_string(),
                details: Some(v.errors.iter().map(FieldErrorBody::from).collect()),
            },
            other => ErrorBody {
                error: other.to_string(),
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}
