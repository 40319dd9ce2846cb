//! Multipart form parsing with spill-to-disk for large parts

use crate::{ApiError, AppState};
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{FromRequest, Multipart, Request};
use bucketgate_store::ObjectPayload;
use bytes::{Bytes, BytesMut};
use std::fmt::Write as _;
use std::sync::Arc;
use tempfile::{NamedTempFile, TempPath};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Where the bytes of a file part ended up
#[derive(Debug)]
pub enum PartData {
    /// Held in memory
    Memory(Bytes),
    /// Written to a temporary file, removed when dropped
    Spilled(TempPath),
}

/// A file part of a multipart form
#[derive(Debug)]
pub struct FilePart {
    /// Form field name
    pub field_name: String,
    /// File name supplied by the client
    pub file_name: String,
    /// Content type declared for the part
    pub content_type: Option<String>,
    /// Bytes received for the part
    pub size: u64,
    pub data: PartData,
}

impl FilePart {
    /// Payload for writing this part to the store
    pub fn payload(&self) -> ObjectPayload {
        match &self.data {
            PartData::Memory(data) => ObjectPayload::from_bytes(data.clone(), self.content_type.clone()),
            PartData::Spilled(path) => {
                ObjectPayload::from_file(path.to_path_buf(), self.size, self.content_type.clone())
            }
        }
    }

    /// Whether the part was spilled to disk
    pub fn is_spilled(&self) -> bool {
        matches!(self.data, PartData::Spilled(_))
    }
}

/// A fully parsed multipart form
#[derive(Debug, Default)]
pub struct MultipartForm {
    /// Plain (non-file) fields in arrival order
    pub values: Vec<(String, String)>,
    /// File fields in arrival order
    pub files: Vec<FilePart>,
}

#[derive(Error, Debug)]
pub enum FormError {
    #[error(transparent)]
    Rejected(#[from] MultipartRejection),

    #[error(transparent)]
    Malformed(#[from] MultipartError),

    #[error("failed to spill multipart part: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FormError> for ApiError {
    fn from(err: FormError) -> Self {
        match err {
            FormError::Io(e) => ApiError::backend("Upload failed", e),
            other => ApiError::BadRequest(format!("File missing: {other}")),
        }
    }
}

impl MultipartForm {
    /// Read every part of the form.
    ///
    /// At most `memory_limit` bytes are held in memory across the whole form;
    /// a file part that would exceed it is written to a temporary file instead.
    pub async fn parse(mut multipart: Multipart, memory_limit: usize) -> Result<Self, FormError> {
        let mut form = MultipartForm::default();
        let mut in_memory = 0usize;

        while let Some(mut field) = multipart.next_field().await? {
            let field_name = field.name().unwrap_or_default().to_string();
            let content_type = field.content_type().map(str::to_owned);
            let file_name = field.file_name().filter(|n| !n.is_empty()).map(str::to_owned);

            let Some(file_name) = file_name else {
                let value = field.text().await?;
                in_memory += value.len();
                form.values.push((field_name, value));
                continue;
            };

            let mut buffer = BytesMut::new();
            let mut spill: Option<(tokio::fs::File, TempPath)> = None;
            let mut size = 0u64;

            while let Some(chunk) = field.chunk().await? {
                size += chunk.len() as u64;
                if let Some((file, _)) = spill.as_mut() {
                    file.write_all(&chunk).await?;
                } else if in_memory + buffer.len() + chunk.len() > memory_limit {
                    let (file, path) = NamedTempFile::new()?.into_parts();
                    let mut file = tokio::fs::File::from_std(file);
                    file.write_all(&buffer).await?;
                    file.write_all(&chunk).await?;
                    buffer.clear();
                    spill = Some((file, path));
                } else {
                    buffer.extend_from_slice(&chunk);
                }
            }

            let data = match spill {
                Some((mut file, path)) => {
                    file.flush().await?;
                    PartData::Spilled(path)
                }
                None => {
                    in_memory += buffer.len();
                    PartData::Memory(buffer.freeze())
                }
            };

            form.files.push(FilePart {
                field_name,
                file_name,
                content_type,
                size,
                data,
            });
        }

        Ok(form)
    }

    /// First file part submitted under `field`
    pub fn file(&self, field: &str) -> Option<&FilePart> {
        self.files.iter().find(|f| f.field_name == field)
    }

    /// One-line description of the file parts, never their contents
    pub fn summary(&self) -> String {
        let mut summary = String::new();
        for file in &self.files {
            let _ = write!(
                summary,
                "[field: {}, name: {}, size: {}, type: {}] ",
                file.field_name,
                file.file_name,
                file.size,
                file.content_type.as_deref().unwrap_or_default()
            );
        }
        summary
    }
}

/// Why the request logger could not parse the form it consumed
#[derive(Clone, Debug)]
pub struct FailedForm(pub ApiError);

/// Extractor for a parsed multipart form.
///
/// Reuses the form (or the parse failure) the request logger already
/// produced, since the raw body is gone at that point; otherwise parses the
/// body itself.
#[derive(Clone, Debug)]
pub struct ParsedForm(pub Arc<MultipartForm>);

impl FromRequest<Arc<AppState>> for ParsedForm {
    type Rejection = ApiError;

    async fn from_request(mut req: Request, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        if let Some(form) = req.extensions_mut().remove::<ParsedForm>() {
            return Ok(form);
        }
        if let Some(FailedForm(err)) = req.extensions_mut().remove::<FailedForm>() {
            return Err(err);
        }

        let multipart = Multipart::from_request(req, state).await.map_err(FormError::from)?;
        let form = MultipartForm::parse(multipart, state.config.multipart_memory_limit).await?;
        Ok(ParsedForm(Arc::new(form)))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::header::CONTENT_TYPE;

    pub(crate) const BOUNDARY: &str = "XBOUNDARY";

    /// Encode `(field, file name, content type, data)` parts; a `None` file name makes a plain value
    pub(crate) fn multipart_body(parts: &[(&str, Option<&str>, &str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (field, file_name, content_type, data) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match file_name {
                Some(name) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{field}\"; filename=\"{name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{field}\"\r\n\r\n").as_bytes(),
                ),
            }
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    pub(crate) fn multipart_request(body: Vec<u8>) -> Request {
        Request::builder()
            .method("POST")
            .uri("/upload/reports")
            .header(CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap()
    }

    async fn parse(body: Vec<u8>, memory_limit: usize) -> MultipartForm {
        let multipart = Multipart::from_request(multipart_request(body), &()).await.unwrap();
        MultipartForm::parse(multipart, memory_limit).await.unwrap()
    }

    #[tokio::test]
    async fn test_parse_files_and_values() {
        let body = multipart_body(&[
            ("note", None, "", b"quarterly"),
            ("file", Some("q3.csv"), "text/csv", b"0123456789"),
        ]);
        let form = parse(body, 10 << 20).await;

        assert_eq!(form.values, vec![("note".to_string(), "quarterly".to_string())]);
        let file = form.file("file").unwrap();
        assert_eq!(file.file_name, "q3.csv");
        assert_eq!(file.size, 10);
        assert_eq!(file.content_type.as_deref(), Some("text/csv"));
        assert!(!file.is_spilled());
        assert_eq!(form.summary(), "[field: file, name: q3.csv, size: 10, type: text/csv] ");
    }

    #[tokio::test]
    async fn test_parts_over_threshold_spill_to_disk() {
        let small = vec![1u8; 16];
        let large = vec![2u8; 4096];
        let body = multipart_body(&[
            ("small", Some("small.bin"), "application/octet-stream", &small),
            ("large", Some("large.bin"), "application/octet-stream", &large),
        ]);
        let form = parse(body, 1024).await;

        let small_part = form.file("small").unwrap();
        assert!(!small_part.is_spilled());

        let large_part = form.file("large").unwrap();
        assert!(large_part.is_spilled());
        assert_eq!(large_part.size, 4096);

        let payload = large_part.payload();
        assert_eq!(payload.size, 4096);
        assert_eq!(payload.read_all().await.unwrap(), Bytes::from(large));
    }

    #[tokio::test]
    async fn test_spilled_file_removed_on_drop() {
        let data = vec![3u8; 2048];
        let form = parse(
            multipart_body(&[("file", Some("big.bin"), "application/octet-stream", &data)]),
            512,
        )
        .await;

        let path = match &form.file("file").unwrap().data {
            PartData::Spilled(path) => path.to_path_buf(),
            PartData::Memory(_) => panic!("expected spilled part"),
        };
        assert!(path.exists());
        drop(form);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_empty_file_name_is_a_value() {
        let form = parse(multipart_body(&[("file", Some(""), "text/plain", b"abc")]), 1024).await;
        assert!(form.file("file").is_none());
        assert!(form.summary().is_empty());
    }
}
