//! Request logging middleware: correlation ids, body capture, one access record per request

use crate::access_log::{AccessLogger, CapturePolicy, LogLevel, LogRecord};
use crate::error::HandlerErrors;
use crate::multipart::{FailedForm, FormError, MultipartForm, ParsedForm};
use crate::ApiError;
use axum::{
    body::{Body, HttpBody},
    extract::{ConnectInfo, FromRequest, FromRequestParts, Multipart, Request, State},
    http::{header, request::Parts, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::Response,
};
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::StreamExt;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Response header carrying the correlation id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation id of the current request
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for RequestId {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<RequestId>().cloned().unwrap_or_default())
    }
}

/// How a request body is treated by the logger
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentKind {
    /// Read verbatim and handed on
    Text,
    /// Parsed once; only file metadata is recorded
    Multipart,
    /// Never read; the media type is recorded
    Binary(String),
}

/// Classify a declared content type
pub fn classify_content_type(content_type: &str) -> ContentKind {
    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match content_type.parse::<mime::Mime>() {
        Ok(m) if m.type_() == mime::TEXT => return ContentKind::Text,
        Ok(m)
            if m.essence_str() == "application/json"
                || m.essence_str() == "application/x-www-form-urlencoded" =>
        {
            return ContentKind::Text;
        }
        _ => {}
    }

    if media_type.starts_with("multipart/form-data") {
        ContentKind::Multipart
    } else {
        ContentKind::Binary(media_type)
    }
}

/// Per-request state gathered before the handler runs
#[derive(Debug)]
pub struct RequestContext {
    pub request_id: String,
    pub method: String,
    pub path: String,
    pub query: String,
    pub client_ip: String,
    pub user_agent: String,
    started: Instant,
}

impl RequestContext {
    /// Start tracking a request under a fresh correlation id
    pub fn new(request: &Request) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            method: request.method().to_string(),
            path: request.uri().path().to_string(),
            query: request.uri().query().unwrap_or_default().to_string(),
            client_ip: client_ip(request),
            user_agent: request
                .headers()
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string(),
            started: Instant::now(),
        }
    }

    /// Build the access record once the handler has produced a response
    pub fn finish(self, status: StatusCode, body: Option<String>, errors: Vec<String>) -> LogRecord {
        let level = if errors.is_empty() { LogLevel::Info } else { LogLevel::Error };
        LogRecord {
            timestamp: Utc::now(),
            level,
            msg: LogRecord::message_for(level),
            request_id: self.request_id,
            status: status.as_u16(),
            method: self.method,
            path: self.path,
            query: self.query,
            client_ip: self.client_ip,
            latency: self.started.elapsed(),
            user_agent: self.user_agent,
            body: body.filter(|b| !b.is_empty()),
            errors,
        }
    }
}

fn client_ip(request: &Request) -> String {
    let headers = request.headers();
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    match forwarded {
        Some(ip) => ip.to_string(),
        None => request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_default(),
    }
}

fn declared_length(request: &Request) -> Option<u64> {
    request.body().size_hint().upper().or_else(|| {
        request
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    })
}

/// A body buffered for logging, or the original bytes replayed when it could not be
enum Buffered {
    Complete(Bytes),
    Replayed { body: Body, note: String },
}

/// Read a body into memory unless it is longer than `limit` or fails midway.
///
/// Chunks already read are replayed ahead of the unread remainder, so the
/// handler sees the same bytes (and the same failure) it would have seen.
async fn buffer_body(body: Body, limit: usize) -> Buffered {
    let mut stream = body.into_data_stream();
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut total = 0usize;

    while let Some(chunk) = stream.next().await {
        let (note, failure) = match chunk {
            Ok(chunk) => {
                total += chunk.len();
                chunks.push(chunk);
                if total <= limit {
                    continue;
                }
                (format!("[body too large: more than {limit} bytes]"), None)
            }
            Err(e) => (format!("[body unreadable: {e}]"), Some(e)),
        };

        let replay = futures::stream::iter(chunks.into_iter().map(Ok).chain(failure.map(Err)));
        return Buffered::Replayed {
            body: Body::from_stream(replay.chain(stream)),
            note,
        };
    }

    let mut buffer = BytesMut::with_capacity(total);
    for chunk in &chunks {
        buffer.extend_from_slice(chunk);
    }
    Buffered::Complete(buffer.freeze())
}

/// Capture the request body according to the policy.
///
/// The returned request carries the same body the handler would have read
/// without logging; anything that cannot be captured without changing that
/// is recorded as a placeholder instead.
pub async fn capture_body(request: Request, policy: &CapturePolicy) -> (Request, Option<String>) {
    if !policy.log_body || matches!(*request.method(), Method::GET | Method::HEAD) {
        return (request, None);
    }

    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    match classify_content_type(&content_type) {
        ContentKind::Text => {
            if let Some(len) = declared_length(&request).filter(|len| *len > policy.max_body_size as u64) {
                return (request, Some(format!("[body too large: {len} bytes]")));
            }

            let (parts, body) = request.into_parts();
            match buffer_body(body, policy.max_body_size).await {
                Buffered::Complete(bytes) => {
                    let captured = String::from_utf8_lossy(&bytes).into_owned();
                    (Request::from_parts(parts, Body::from(bytes)), Some(captured))
                }
                Buffered::Replayed { body, note } => {
                    debug!(note = %note, "Request body forwarded without capture");
                    (Request::from_parts(parts, body), Some(note))
                }
            }
        }
        ContentKind::Multipart => {
            let (parts, body) = request.into_parts();
            let mut form_request = Request::new(body);
            *form_request.headers_mut() = parts.headers.clone();
            *form_request.extensions_mut() = parts.extensions.clone();

            let parsed = match Multipart::from_request(form_request, &()).await {
                Ok(multipart) => MultipartForm::parse(multipart, policy.multipart_memory_limit).await,
                Err(rejection) => Err(FormError::from(rejection)),
            };

            // The raw body is consumed; handlers read the parse outcome instead.
            let mut request = Request::from_parts(parts, Body::empty());
            match parsed {
                Ok(form) => {
                    let summary = form.summary();
                    request.extensions_mut().insert(ParsedForm(Arc::new(form)));
                    (request, Some(summary))
                }
                Err(e) => {
                    debug!(error = %e, "Multipart body could not be parsed for logging");
                    request.extensions_mut().insert(FailedForm(ApiError::from(e)));
                    (request, None)
                }
            }
        }
        ContentKind::Binary(media_type) => {
            (request, Some(format!("[binary content type skipped: {media_type}]")))
        }
    }
}

/// Correlate, capture and log every request
pub async fn request_logging_middleware(
    State(logger): State<Arc<AccessLogger>>,
    request: Request,
    next: Next,
) -> Response {
    let context = RequestContext::new(&request);
    let (mut request, captured) = capture_body(request, logger.policy()).await;
    request.extensions_mut().insert(RequestId(context.request_id.clone()));

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&context.request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    let errors = response
        .extensions_mut()
        .remove::<HandlerErrors>()
        .map(|HandlerErrors(errors)| errors)
        .unwrap_or_default();

    let record = context.finish(response.status(), captured, errors);
    logger.emit(&record);

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_log::MemorySink;
    use crate::config::GatewayConfig;
    use crate::multipart::tests::{multipart_body, multipart_request};
    use axum::{
        body::{to_bytes, Bytes},
        middleware as axum_middleware,
        routing::{get, post},
        Extension, Router,
    };
    use rstest::rstest;
    use tower::ServiceExt;

    fn policy(log_body: bool) -> CapturePolicy {
        CapturePolicy {
            log_body,
            ..CapturePolicy::from_config(&GatewayConfig::default())
        }
    }

    async fn echo(body: Bytes) -> Bytes {
        body
    }

    async fn files(Extension(ParsedForm(form)): Extension<ParsedForm>) -> String {
        form.files.iter().map(|f| f.file_name.clone()).collect::<Vec<_>>().join(",")
    }

    async fn failing() -> Result<String, ApiError> {
        Err(ApiError::backend("Bucket creation failed", "connection refused"))
    }

    fn app(log_body: bool) -> (Router, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let logger = Arc::new(AccessLogger::new(sink.clone(), policy(log_body)));
        let router = Router::new()
            .route("/echo", post(echo).get(echo))
            .route("/files", post(files))
            .route("/fail", post(failing))
            .fallback(|| async { ApiError::NotFound("Route not found".to_string()) })
            .layer(axum_middleware::from_fn_with_state(logger, request_logging_middleware));
        (router, sink)
    }

    fn post_request(uri: &str, content_type: &str, body: impl Into<Body>) -> Request {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, content_type)
            .body(body.into())
            .unwrap()
    }

    #[rstest]
    #[case("text/plain", ContentKind::Text)]
    #[case("text/csv; charset=utf-8", ContentKind::Text)]
    #[case("application/json", ContentKind::Text)]
    #[case("application/json; charset=utf-8", ContentKind::Text)]
    #[case("application/x-www-form-urlencoded", ContentKind::Text)]
    #[case("multipart/form-data; boundary=abc", ContentKind::Multipart)]
    #[case("application/octet-stream", ContentKind::Binary("application/octet-stream".into()))]
    #[case("application/problem+json", ContentKind::Binary("application/problem+json".into()))]
    #[case("image/png", ContentKind::Binary("image/png".into()))]
    #[case("", ContentKind::Binary(String::new()))]
    fn test_classify_content_type(#[case] content_type: &str, #[case] expected: ContentKind) {
        assert_eq!(classify_content_type(content_type), expected);
    }

    #[tokio::test]
    async fn test_text_body_captured_and_restored() {
        let (app, sink) = app(true);
        let payload = r#"{"bucketName":"reports"}"#;

        let response = app
            .oneshot(post_request("/echo?dry=1", "application/json", payload))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let request_id = response.headers()[REQUEST_ID_HEADER].to_str().unwrap().to_string();
        let echoed = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(echoed, payload.as_bytes());

        let records = sink.records();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.request_id, request_id);
        assert_eq!(record.body.as_deref(), Some(payload));
        assert_eq!(record.method, "POST");
        assert_eq!(record.path, "/echo");
        assert_eq!(record.query, "dry=1");
        assert_eq!(record.level, LogLevel::Info);
    }

    #[tokio::test]
    async fn test_binary_body_not_read() {
        let (app, sink) = app(true);
        let response = app
            .oneshot(post_request("/echo", "application/octet-stream", vec![0u8, 159, 146, 150]))
            .await
            .unwrap();
        let echoed = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(echoed.as_ref(), &[0u8, 159, 146, 150]);

        let record = &sink.records()[0];
        assert_eq!(
            record.body.as_deref(),
            Some("[binary content type skipped: application/octet-stream]")
        );
    }

    #[tokio::test]
    async fn test_multipart_summarised_and_forwarded_parsed() {
        let (app, sink) = app(true);
        let body = multipart_body(&[("file", Some("q3.csv"), "text/csv", b"0123456789")]);
        let mut request = multipart_request(body);
        *request.uri_mut() = "/files".parse().unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let names = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(names, "q3.csv");

        let record = &sink.records()[0];
        assert_eq!(
            record.body.as_deref(),
            Some("[field: file, name: q3.csv, size: 10, type: text/csv] ")
        );
    }

    #[tokio::test]
    async fn test_get_requests_never_captured() {
        let (app, sink) = app(true);
        let request = Request::builder()
            .uri("/echo")
            .header(header::CONTENT_TYPE, "text/plain")
            .header(header::USER_AGENT, "curl/8.5")
            .body(Body::from("ignored"))
            .unwrap();
        app.oneshot(request).await.unwrap();

        let record = &sink.records()[0];
        assert!(record.body.is_none());
        assert_eq!(record.user_agent, "curl/8.5");
    }

    #[tokio::test]
    async fn test_capture_disabled() {
        let (app, sink) = app(false);
        app.oneshot(post_request("/echo", "text/plain", "hello")).await.unwrap();
        assert!(sink.records()[0].body.is_none());
    }

    #[tokio::test]
    async fn test_handler_errors_logged_at_error_level() {
        let (app, sink) = app(true);
        let response = app
            .oneshot(post_request("/fail", "application/json", "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
        assert!(response.extensions().get::<HandlerErrors>().is_none());

        let record = &sink.records()[0];
        assert_eq!(record.level, LogLevel::Error);
        assert_eq!(record.status, 500);
        assert_eq!(record.errors, vec!["Bucket creation failed: connection refused".to_string()]);
    }

    #[tokio::test]
    async fn test_unmatched_route_still_logged() {
        let (app, sink) = app(true);
        let response = app
            .oneshot(Request::builder().uri("/nowhere").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(sink.records()[0].status, 404);
    }

    #[tokio::test]
    async fn test_forwarded_client_address() {
        let (app, sink) = app(true);
        let request = Request::builder()
            .uri("/echo")
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        app.oneshot(request).await.unwrap();
        assert_eq!(sink.records()[0].client_ip, "203.0.113.7");
    }

    #[tokio::test]
    async fn test_correlation_ids_are_unique() {
        let (app, sink) = app(true);
        for _ in 0..3 {
            app.clone()
                .oneshot(Request::builder().uri("/echo").body(Body::empty()).unwrap())
                .await
                .unwrap();
        }
        let mut ids: Vec<String> = sink.records().into_iter().map(|r| r.request_id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }

    fn chunks(parts: &[&'static [u8]]) -> Body {
        let parts: Vec<Result<Bytes, std::io::Error>> =
            parts.iter().map(|p| Ok(Bytes::from_static(p))).collect();
        Body::from_stream(futures::stream::iter(parts))
    }

    #[tokio::test]
    async fn test_buffer_body_within_limit() {
        match buffer_body(chunks(&[b"abc", b"def"]), 6).await {
            Buffered::Complete(bytes) => assert_eq!(bytes, "abcdef"),
            Buffered::Replayed { note, .. } => panic!("unexpected replay: {note}"),
        }
    }

    #[tokio::test]
    async fn test_buffer_body_over_limit_replays_every_byte() {
        match buffer_body(chunks(&[b"abc", b"def", b"ghi"]), 4).await {
            Buffered::Replayed { body, note } => {
                assert_eq!(note, "[body too large: more than 4 bytes]");
                let replayed = to_bytes(body, usize::MAX).await.unwrap();
                assert_eq!(replayed, "abcdefghi");
            }
            Buffered::Complete(_) => panic!("body over the limit was buffered"),
        }
    }

    #[tokio::test]
    async fn test_buffer_body_failure_reaches_handler() {
        let parts: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"abc")),
            Err(std::io::Error::other("connection reset")),
        ];
        match buffer_body(Body::from_stream(futures::stream::iter(parts)), 1024).await {
            Buffered::Replayed { body, note } => {
                assert!(note.starts_with("[body unreadable: "));
                assert!(to_bytes(body, usize::MAX).await.is_err());
            }
            Buffered::Complete(_) => panic!("failed body was buffered"),
        }
    }

    #[tokio::test]
    async fn test_declared_oversize_forwarded_untouched() {
        let policy = CapturePolicy { max_body_size: 4, ..policy(true) };
        let (request, captured) =
            capture_body(post_request("/echo", "text/plain", "0123456789"), &policy).await;
        assert_eq!(captured.as_deref(), Some("[body too large: 10 bytes]"));
        let body = to_bytes(request.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, "0123456789");
    }

    #[tokio::test]
    async fn test_missing_content_type_recorded_as_binary() {
        let (app, sink) = app(true);
        let request = Request::builder()
            .method("POST")
            .uri("/echo")
            .body(Body::empty())
            .unwrap();
        app.oneshot(request).await.unwrap();
        assert_eq!(
            sink.records()[0].body.as_deref(),
            Some("[binary content type skipped: ]")
        );
    }
}
