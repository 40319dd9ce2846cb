//! Error types for the bucketgate-store crate

use thiserror::Error;

/// Result type alias using `StorageError`
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Bucket not found
    #[error("bucket not found: {0}")]
    NoSuchBucket(String),

    /// Object not found
    #[error("object not found: {bucket}/{key}")]
    NoSuchKey { bucket: String, key: String },

    /// Bucket already exists
    #[error("bucket already exists: {0}")]
    BucketAlreadyExists(String),

    /// Bucket still holds objects
    #[error("bucket not empty: {0}")]
    BucketNotEmpty(String),

    /// Bucket name rejected by the store
    #[error("invalid bucket name: {0:?}")]
    InvalidBucketName(String),

    /// Any other failure reported by the backend
    #[error("backend error: {0}")]
    Backend(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Create a backend error from anything displayable
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }

    /// Whether the error means the addressed bucket or object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NoSuchBucket(_) | Self::NoSuchKey { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        assert!(StorageError::NoSuchBucket("b".into()).is_not_found());
        assert!(StorageError::NoSuchKey { bucket: "b".into(), key: "k".into() }.is_not_found());
        assert!(!StorageError::BucketNotEmpty("b".into()).is_not_found());
        assert!(!StorageError::backend("connection refused").is_not_found());
    }

    #[test]
    fn test_display() {
        let err = StorageError::NoSuchKey { bucket: "reports".into(), key: "q3.csv".into() };
        assert_eq!(err.to_string(), "object not found: reports/q3.csv");
    }
}
