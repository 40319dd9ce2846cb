//! Bucket operation handlers

use crate::models::{BucketResponse, CreateBucketRequest, ListBucketsResponse};
use crate::{ApiError, AppState};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Path, State},
    Json,
};
use std::sync::Arc;
use tracing::info;

/// POST /bucket - Create bucket
pub async fn create_bucket(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<BucketResponse>, ApiError> {
    let body = body?;
    let bad_request = |detail: String| {
        ApiError::BadRequest(format!("Bad Request- Bucket could not be created: {detail}"))
    };

    let request: CreateBucketRequest =
        serde_json::from_slice(&body).map_err(|e| bad_request(e.to_string()))?;
    if request.bucket_name.is_empty() {
        return Err(bad_request("bucketName must not be empty".to_string()));
    }

    state
        .storage
        .create_bucket(&request.bucket_name, &state.config.s3.region)
        .await
        .map_err(|e| ApiError::backend("Bucket creation failed", e))?;

    info!(bucket = %request.bucket_name, "Bucket created");

    Ok(Json(BucketResponse {
        message: "Bucket created".to_string(),
        bucket: request.bucket_name,
    }))
}

/// DELETE /bucket/{name} - Delete bucket
pub async fn delete_bucket(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
) -> Result<Json<BucketResponse>, ApiError> {
    state
        .storage
        .delete_bucket(&bucket)
        .await
        .map_err(|e| ApiError::backend("Bucket deletion failed", e))?;

    info!(bucket = %bucket, "Bucket deleted");

    Ok(Json(BucketResponse {
        message: "Bucket deleted".to_string(),
        bucket,
    }))
}

/// GET /buckets - List buckets
pub async fn list_buckets(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListBucketsResponse>, ApiError> {
    let buckets = state
        .storage
        .list_buckets()
        .await
        .map_err(|e| ApiError::backend("Failed to list buckets", e))?;

    Ok(Json(ListBucketsResponse { buckets }))
}
