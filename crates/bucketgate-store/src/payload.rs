//! Upload payloads and download streams

use crate::Result;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use std::fmt;
use std::path::PathBuf;

/// Chunk size used when a store hands out an in-memory object as a stream
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Byte stream of an object being downloaded
pub type ObjectBody = BoxStream<'static, Result<Bytes>>;

/// Where the bytes of an upload live
#[derive(Debug, Clone)]
pub enum PayloadSource {
    /// Entire payload held in memory
    Bytes(Bytes),
    /// Payload spilled to a file; the caller keeps the file alive until the put completes
    File(PathBuf),
}

/// An object to be written: declared size, declared content type and its bytes
#[derive(Debug, Clone)]
pub struct ObjectPayload {
    /// Bytes source
    pub source: PayloadSource,
    /// Declared size in bytes (not verified by the gateway)
    pub size: u64,
    /// Declared content type
    pub content_type: Option<String>,
}

impl ObjectPayload {
    /// Payload backed by an in-memory buffer
    pub fn from_bytes(data: Bytes, content_type: Option<String>) -> Self {
        Self {
            size: data.len() as u64,
            source: PayloadSource::Bytes(data),
            content_type,
        }
    }

    /// Payload backed by a file on disk
    pub fn from_file(path: impl Into<PathBuf>, size: u64, content_type: Option<String>) -> Self {
        Self {
            source: PayloadSource::File(path.into()),
            size,
            content_type,
        }
    }

    /// Read the whole payload into memory
    pub async fn read_all(&self) -> Result<Bytes> {
        match &self.source {
            PayloadSource::Bytes(data) => Ok(data.clone()),
            PayloadSource::File(path) => Ok(Bytes::from(tokio::fs::read(path).await?)),
        }
    }
}

/// Result of a successful put
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadInfo {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    /// Integrity tag returned by the store, without quotes
    pub etag: String,
}

/// Metadata of a stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    /// Size in bytes, when the store reports one
    pub size: Option<u64>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
}

/// An object opened for reading
pub struct StoredObject {
    pub info: ObjectInfo,
    pub body: ObjectBody,
}

impl StoredObject {
    /// Serve an in-memory buffer as a chunked stream
    pub fn from_bytes(info: ObjectInfo, data: Bytes) -> Self {
        let chunks: Vec<Result<Bytes>> = (0..data.len())
            .step_by(STREAM_CHUNK_SIZE)
            .map(|start| Ok(data.slice(start..(start + STREAM_CHUNK_SIZE).min(data.len()))))
            .collect();
        Self {
            info,
            body: stream::iter(chunks).boxed(),
        }
    }

    /// Drain the body into memory
    #[cfg(test)]
    pub(crate) async fn collect(self) -> Result<Bytes> {
        let mut body = self.body;
        let mut buf = Vec::with_capacity(self.info.size.unwrap_or_default() as usize);
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(Bytes::from(buf))
    }
}

impl fmt::Debug for StoredObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredObject").field("info", &self.info).finish_non_exhaustive()
    }
}
