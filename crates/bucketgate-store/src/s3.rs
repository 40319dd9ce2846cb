//! S3-compatible object store client

use crate::{
    DEFAULT_REGION, ObjectInfo, ObjectPayload, PayloadSource, Result, StorageClient, StorageError,
    StoredObject, UploadInfo,
};
use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Connection settings for an S3-compatible endpoint
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Settings {
    /// Endpoint, either `host:port` or a full URL
    pub endpoint: String,
    /// Access key
    #[serde(alias = "accessKey", alias = "accesskey")]
    pub access_key: String,
    /// Secret key
    #[serde(alias = "secretKey", alias = "secretkey")]
    pub secret_key: String,
    /// Region used for signing and bucket creation
    pub region: String,
    /// Use HTTPS when the endpoint carries no scheme
    #[serde(alias = "useSSL", alias = "usessl")]
    pub use_ssl: bool,
}

impl Default for S3Settings {
    fn default() -> Self {
        Self {
            endpoint: "localhost:9000".to_string(),
            access_key: String::new(),
            secret_key: String::new(),
            region: DEFAULT_REGION.to_string(),
            use_ssl: false,
        }
    }
}

impl S3Settings {
    /// Endpoint as a URL the SDK accepts
    pub fn endpoint_url(&self) -> String {
        if self.endpoint.contains("://") {
            self.endpoint.clone()
        } else {
            let scheme = if self.use_ssl { "https" } else { "http" };
            format!("{}://{}", scheme, self.endpoint)
        }
    }
}

/// Object store backed by an S3-compatible service
#[derive(Clone, Debug)]
pub struct S3Storage {
    client: Client,
}

impl S3Storage {
    /// Build a client with static credentials and path-style addressing
    pub fn new(settings: &S3Settings) -> Self {
        let creds = Credentials::new(
            settings.access_key.clone(),
            settings.secret_key.clone(),
            None,
            None,
            "bucketgate-config",
        );

        let config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .credentials_provider(creds)
            .endpoint_url(settings.endpoint_url())
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(config),
        }
    }

    /// Wrap an existing SDK client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

/// Map an S3 error code onto a storage error
fn error_from_code(code: Option<&str>, bucket: &str, key: Option<&str>, message: String) -> StorageError {
    match code {
        Some("NoSuchBucket") => StorageError::NoSuchBucket(bucket.to_string()),
        Some("NoSuchKey") | Some("NotFound") => match key {
            Some(key) => StorageError::NoSuchKey {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            None => StorageError::NoSuchBucket(bucket.to_string()),
        },
        Some("BucketAlreadyExists") | Some("BucketAlreadyOwnedByYou") => {
            StorageError::BucketAlreadyExists(bucket.to_string())
        }
        Some("BucketNotEmpty") => StorageError::BucketNotEmpty(bucket.to_string()),
        Some("InvalidBucketName") => StorageError::InvalidBucketName(bucket.to_string()),
        _ => StorageError::Backend(message),
    }
}

fn classify<E, R>(err: SdkError<E, R>, bucket: &str, key: Option<&str>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let code = err.code().map(str::to_owned);
    let message = DisplayErrorContext(&err).to_string();
    error_from_code(code.as_deref(), bucket, key, message)
}

fn strip_quotes(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

#[async_trait]
impl StorageClient for S3Storage {
    async fn create_bucket(&self, bucket: &str, region: &str) -> Result<()> {
        let mut request = self.client.create_bucket().bucket(bucket);
        if !region.is_empty() && region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }
        request.send().await.map_err(|e| classify(e, bucket, None))?;
        debug!(bucket, region, "bucket created");
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| classify(e, bucket, None))?;
        Ok(())
    }

    async fn list_buckets(&self) -> Result<Vec<String>> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| classify(e, "", None))?;
        Ok(output
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(str::to_owned))
            .collect())
    }

    async fn put_object(&self, bucket: &str, key: &str, payload: ObjectPayload) -> Result<UploadInfo> {
        let body = match payload.source {
            PayloadSource::Bytes(data) => ByteStream::from(data),
            PayloadSource::File(path) => ByteStream::from_path(&path)
                .await
                .map_err(StorageError::backend)?,
        };

        let mut request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .content_length(payload.size as i64);
        if let Some(content_type) = payload.content_type {
            request = request.content_type(content_type);
        }

        let output = request.send().await.map_err(|e| classify(e, bucket, Some(key)))?;
        Ok(UploadInfo {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: payload.size,
            etag: output.e_tag().map(strip_quotes).unwrap_or_default(),
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(e, bucket, Some(key)))?;

        let info = ObjectInfo {
            key: key.to_string(),
            size: output.content_length().and_then(|len| u64::try_from(len).ok()),
            content_type: output.content_type().map(str::to_owned),
            etag: output.e_tag().map(strip_quotes),
        };

        let body = stream::unfold(output.body, |mut body| async move {
            body.next()
                .await
                .map(|chunk| (chunk.map_err(StorageError::backend), body))
        })
        .boxed();

        Ok(StoredObject { info, body })
    }

    fn list_objects(&self, bucket: &str) -> BoxStream<'static, Result<String>> {
        let bucket = bucket.to_string();
        let pages = self
            .client
            .list_objects_v2()
            .bucket(&bucket)
            .into_paginator()
            .send();

        stream::unfold(pages, |mut pages| async move {
            pages.next().await.map(|page| (page, pages))
        })
        .flat_map(move |page| {
            let items: Vec<Result<String>> = match page {
                Ok(output) => output
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(|k| Ok(k.to_owned())))
                    .collect(),
                Err(e) => vec![Err(classify(e, &bucket, None))],
            };
            stream::iter(items)
        })
        .boxed()
    }

    async fn remove_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(e, bucket, Some(key)))?;
        Ok(())
    }
}
