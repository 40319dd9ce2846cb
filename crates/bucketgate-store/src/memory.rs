//! In-memory object store for development and testing

use crate::{
    ObjectInfo, ObjectPayload, Result, StorageClient, StorageError, StoredObject, UploadInfo,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use md5::{Digest, Md5};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone, Debug)]
struct MemoryObject {
    data: Bytes,
    content_type: Option<String>,
    etag: String,
}

type Buckets = BTreeMap<String, BTreeMap<String, MemoryObject>>;

/// An in-memory object store with S3-like semantics
#[derive(Clone, Default)]
pub struct MemoryStorage {
    buckets: Arc<RwLock<Buckets>>,
}

impl MemoryStorage {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of buckets
    pub fn bucket_count(&self) -> usize {
        self.buckets.read().len()
    }

    /// Get the number of objects stored across all buckets
    pub fn object_count(&self) -> usize {
        self.buckets.read().values().map(BTreeMap::len).sum()
    }
}

fn etag_of(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

#[async_trait]
impl StorageClient for MemoryStorage {
    async fn create_bucket(&self, bucket: &str, _region: &str) -> Result<()> {
        if bucket.is_empty() {
            return Err(StorageError::InvalidBucketName(bucket.to_string()));
        }
        let mut buckets = self.buckets.write();
        if buckets.contains_key(bucket) {
            return Err(StorageError::BucketAlreadyExists(bucket.to_string()));
        }
        buckets.insert(bucket.to_string(), BTreeMap::new());
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        let mut buckets = self.buckets.write();
        match buckets.get(bucket) {
            None => Err(StorageError::NoSuchBucket(bucket.to_string())),
            Some(objects) if !objects.is_empty() => {
                Err(StorageError::BucketNotEmpty(bucket.to_string()))
            }
            Some(_) => {
                buckets.remove(bucket);
                Ok(())
            }
        }
    }

    async fn list_buckets(&self) -> Result<Vec<String>> {
        Ok(self.buckets.read().keys().cloned().collect())
    }

    async fn put_object(&self, bucket: &str, key: &str, payload: ObjectPayload) -> Result<UploadInfo> {
        if !self.buckets.read().contains_key(bucket) {
            return Err(StorageError::NoSuchBucket(bucket.to_string()));
        }

        let data = payload.read_all().await?;
        let etag = etag_of(&data);
        let size = data.len() as u64;

        // The bucket may have been removed while the payload was being read.
        let mut buckets = self.buckets.write();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::NoSuchBucket(bucket.to_string()))?;
        objects.insert(
            key.to_string(),
            MemoryObject {
                data,
                content_type: payload.content_type,
                etag: etag.clone(),
            },
        );

        Ok(UploadInfo {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size,
            etag,
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject> {
        let buckets = self.buckets.read();
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| StorageError::NoSuchBucket(bucket.to_string()))?;
        let object = objects.get(key).ok_or_else(|| StorageError::NoSuchKey {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })?;

        let info = ObjectInfo {
            key: key.to_string(),
            size: Some(object.data.len() as u64),
            content_type: object.content_type.clone(),
            etag: Some(object.etag.clone()),
        };
        Ok(StoredObject::from_bytes(info, object.data.clone()))
    }

    fn list_objects(&self, bucket: &str) -> BoxStream<'static, Result<String>> {
        let buckets = self.buckets.read();
        match buckets.get(bucket) {
            Some(objects) => {
                let keys: Vec<Result<String>> = objects.keys().cloned().map(Ok).collect();
                stream::iter(keys).boxed()
            }
            None => stream::once(futures::future::ready(Err(StorageError::NoSuchBucket(
                bucket.to_string(),
            ))))
            .boxed(),
        }
    }

    async fn remove_object(&self, bucket: &str, key: &str) -> Result<()> {
        let mut buckets = self.buckets.write();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::NoSuchBucket(bucket.to_string()))?;
        objects.remove(key);
        Ok(())
    }
}
