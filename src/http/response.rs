//! Response envelopes and error mapping.
//!
//! # Responsibilities
//! - Wrap payloads as `{success: true, data}`
//! - Map library errors to status codes and `{success: false, error}` bodies
//!
//! # Design Decisions
//! - Caller mistakes (shape, validation, permissions, handler veto) are 400
//! - Conflicts are 409 and carry the conflict details
//! - Persistence and internal faults are 500

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::{ConflictError, Error};

/// The body of every `/config` response.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// Error details inside a failed envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub message: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<ConflictError>,
}

/// `200 OK` with a success envelope.
pub fn ok<T: Serialize>(data: T) -> Response {
    let envelope = Envelope {
        success: true,
        data: Some(data),
        error: None,
    };
    (StatusCode::OK, Json(envelope)).into_response()
}

/// Status code for a library error.
pub fn status_code(error: &Error) -> StatusCode {
    match error {
        Error::Conflict(_) => StatusCode::CONFLICT,
        Error::PersistenceFailed(_) | Error::Reentrant | Error::Disjoint => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => StatusCode::BAD_REQUEST,
    }
}

/// An error on its way to becoming a response.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub conflict: Option<ConflictError>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            conflict: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self {
            status: status_code(&error),
            message: error.to_string(),
            conflict: error.conflict().cloned(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = self.status.as_u16(), error = %self.message, "Request failed");
        }
        let envelope: Envelope<()> = Envelope {
            success: false,
            data: None,
            error: Some(ErrorBody {
                message: self.message,
                code: self.status.as_u16(),
                conflict: self.conflict,
            }),
        };
        (self.status, Json(envelope)).into_response()
    }
}
