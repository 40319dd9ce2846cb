//! # bucketgate-store
//!
//! Storage capability layer for the bucketgate REST gateway.
//!
//! This crate provides:
//! - **StorageClient trait**: create/delete/list buckets, put/get/list/remove objects
//! - **Streaming payloads**: uploads from memory or spilled files, downloads as byte streams
//! - **S3 backend**: any S3-compatible endpoint (MinIO, AWS, ...)
//! - **Memory backend**: in-process store for development and tests
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            Gateway handlers             │
//! ├─────────────────────────────────────────┤
//! │          StorageClient Trait            │
//! ├────────────────────┬────────────────────┤
//! │     S3Storage      │   MemoryStorage    │
//! ├────────────────────┴────────────────────┤
//! │        S3-compatible object store       │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use bucketgate_store::{MemoryStorage, ObjectPayload, StorageClient};
//!
//! let store = MemoryStorage::new();
//! store.create_bucket("reports", "us-east-1").await?;
//! let info = store
//!     .put_object("reports", "q3.csv", ObjectPayload::from_bytes(data, Some("text/csv".into())))
//!     .await?;
//! ```

pub mod error;
pub mod memory;
pub mod payload;
pub mod s3;

pub use error::{Result, StorageError};
pub use memory::MemoryStorage;
pub use payload::{ObjectBody, ObjectInfo, ObjectPayload, PayloadSource, StoredObject, UploadInfo};
pub use s3::{S3Settings, S3Storage};

use async_trait::async_trait;
use futures::stream::BoxStream;

/// Region used when none is configured
pub const DEFAULT_REGION: &str = "us-east-1";

/// Content type reported for objects stored without one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Capability interface to an S3-compatible object store.
///
/// Every operation is addressed by bucket name and (for objects) key and
/// either succeeds or returns a typed [`StorageError`].
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Create a bucket in the given region
    async fn create_bucket(&self, bucket: &str, region: &str) -> Result<()>;

    /// Remove a bucket
    async fn delete_bucket(&self, bucket: &str) -> Result<()>;

    /// Enumerate bucket names in store order
    async fn list_buckets(&self) -> Result<Vec<String>>;

    /// Write an object, consuming the payload incrementally
    async fn put_object(&self, bucket: &str, key: &str, payload: ObjectPayload) -> Result<UploadInfo>;

    /// Open an object for reading
    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject>;

    /// Recursively enumerate object keys.
    ///
    /// The stream may yield an error after some keys; callers decide what to
    /// do with the keys already seen.
    fn list_objects(&self, bucket: &str) -> BoxStream<'static, Result<String>>;

    /// Remove an object
    async fn remove_object(&self, bucket: &str, key: &str) -> Result<()>;
}
