//! Object operation handlers

use crate::middleware::RequestId;
use crate::models::{DeleteObjectResponse, ListObjectsResponse, UploadFileResponse};
use crate::multipart::ParsedForm;
use crate::{ApiError, AppState};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::Response,
    Json,
};
use bucketgate_store::DEFAULT_CONTENT_TYPE;
use futures::TryStreamExt;
use std::sync::Arc;
use tracing::{info, warn};

/// Multipart field holding the uploaded file
pub const UPLOAD_FIELD: &str = "file";

/// POST /upload/{bucket} - Upload the multipart "file" field as an object named after the file
pub async fn upload_object(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
    ParsedForm(form): ParsedForm,
) -> Result<Json<UploadFileResponse>, ApiError> {
    let part = form.file(UPLOAD_FIELD).ok_or_else(|| {
        ApiError::BadRequest(format!("File missing: no multipart file field named {UPLOAD_FIELD:?}"))
    })?;

    // The client-supplied file name is the object key, verbatim.
    let upload = state
        .storage
        .put_object(&bucket, &part.file_name, part.payload())
        .await
        .map_err(|e| ApiError::backend("Upload failed", e))?;

    info!(
        bucket = %bucket,
        key = %upload.key,
        size = upload.size,
        spilled = part.is_spilled(),
        "Object uploaded"
    );

    Ok(Json(UploadFileResponse {
        message: "File uploaded successfully".to_string(),
        file: upload.key,
        size: upload.size,
        bucket,
        etag: upload.etag,
    }))
}

/// GET /download/{bucket}/{*file} - Stream an object back as an attachment
pub async fn download_object(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let object = state.storage.get_object(&bucket, &key).await.map_err(|e| {
        warn!(request_id = %request_id, bucket = %bucket, key = %key, error = %e, "Object lookup failed");
        if e.is_not_found() {
            ApiError::NotFound("File not found ".to_string())
        } else {
            ApiError::Backend("Failed to get file ".to_string())
        }
    })?;

    let disposition = HeaderValue::from_str(&format!("attachment; filename={key}"))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    let content_type = object
        .info
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));

    // Headers are sent before the body; a failure mid-stream can only be logged.
    let body = object.body.inspect_err(move |e| {
        warn!(request_id = %request_id, bucket = %bucket, key = %key, error = %e, "Download stream interrupted");
    });

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::CONTENT_TYPE, content_type);
    if let Some(size) = object.info.size {
        response = response.header(header::CONTENT_LENGTH, size);
    }

    response
        .body(Body::from_stream(body))
        .map_err(|e| ApiError::backend("Failed to get file", e))
}

/// GET /objects/{bucket} - List every object key in the bucket
pub async fn list_objects(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
) -> Result<Json<ListObjectsResponse>, ApiError> {
    let objects: Vec<String> = state
        .storage
        .list_objects(&bucket)
        .try_collect()
        .await
        .map_err(|e| ApiError::backend("Failed to list objects", e))?;

    Ok(Json(ListObjectsResponse { bucket, objects }))
}

/// DELETE /objects/{bucket}/{*file} - Delete object
pub async fn delete_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Json<DeleteObjectResponse>, ApiError> {
    state
        .storage
        .remove_object(&bucket, &key)
        .await
        .map_err(|e| ApiError::backend("Object deletion failed", e))?;

    info!(bucket = %bucket, key = %key, "Object deleted");

    Ok(Json(DeleteObjectResponse {
        message: "File deleted".to_string(),
        bucket,
        file: key,
    }))
}
