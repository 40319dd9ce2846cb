//! HTTP route definitions

use crate::access_log::AccessLogger;
use crate::{handlers, middleware, AppState};
use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main router
pub fn create_router(state: Arc<AppState>, logger: Arc<AccessLogger>) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    let max_body_size = state.config.max_body_size;

    Router::new()
        // Service endpoints
        .route("/health", get(handlers::health_check))

        // Bucket endpoints
        .route("/bucket", post(handlers::create_bucket))
        .route("/bucket/{name}", delete(handlers::delete_bucket))
        .route("/buckets", get(handlers::list_buckets))

        // Object endpoints
        .route("/upload/{bucket}", post(handlers::upload_object))
        .route("/download/{bucket}/{*file}", get(handlers::download_object))
        .route("/objects/{bucket}", get(handlers::list_objects))
        .route("/objects/{bucket}/{*file}", delete(handlers::delete_object))

        .fallback(handlers::route_not_found)
        .method_not_allowed_fallback(handlers::method_not_allowed)

        // Apply middleware; the body limit sits outermost so the logger sees it
        .layer(cors)
        .layer(axum_middleware::from_fn_with_state(
            logger,
            middleware::request_logging_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(max_body_size))
        .with_state(state)
}
