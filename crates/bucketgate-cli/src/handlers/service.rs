//! Service-level handlers (health, unmatched routes)

use crate::ApiError;
use axum::{
    http::{Method, StatusCode, Uri},
    response::IntoResponse,
};

/// GET /health - Health check
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Any request no route matches
pub async fn route_not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("Route not found: {}", uri.path()))
}

/// A known path requested with a method it does not serve
pub async fn method_not_allowed(method: Method, uri: Uri) -> ApiError {
    ApiError::Rejected {
        status: StatusCode::METHOD_NOT_ALLOWED,
        message: format!("Method not allowed: {method} {}", uri.path()),
    }
}
