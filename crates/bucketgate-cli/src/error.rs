//! Error envelope shared by every gateway operation

use axum::{
    extract::rejection::BytesRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// API error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Malformed or missing request payload fields
    #[error("{0}")]
    BadRequest(String),

    /// Requested object cannot be found
    #[error("{0}")]
    NotFound(String),

    /// Any failure surfaced by the storage backend
    #[error("{0}")]
    Backend(String),

    /// Refused by the framework before the operation ran (size limit, method)
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },
}

impl ApiError {
    /// Backend failure prefixed with the operation that failed
    pub fn backend(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Backend(format!("{context}: {err}"))
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Rejected { status, .. } => *status,
        }
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

/// JSON body of every error response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: u16,
    pub error: String,
}

/// Errors a handler ran into, handed to the request logger through response extensions
#[derive(Clone, Debug, Default)]
pub struct HandlerErrors(pub Vec<String>);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        let mut response = (
            status,
            Json(ErrorBody {
                code: status.as_u16(),
                error: message.clone(),
            }),
        )
            .into_response();
        response.extensions_mut().insert(HandlerErrors(vec![message]));
        response
    }
}
