//! Request and response bodies

use serde::{Deserialize, Serialize};

/// `POST /bucket` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBucketRequest {
    pub bucket_name: String,
}

/// Bucket created or deleted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BucketResponse {
    pub message: String,
    pub bucket: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListBucketsResponse {
    pub buckets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadFileResponse {
    pub message: String,
    pub file: String,
    pub size: u64,
    pub bucket: String,
    pub etag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListObjectsResponse {
    pub bucket: String,
    pub objects: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteObjectResponse {
    pub message: String,
    pub bucket: String,
    pub file: String,
}
