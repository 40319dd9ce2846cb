//! # Bucket Gateway
//!
//! REST gateway exposing bucket and object lifecycle operations on an
//! S3-compatible object store.
//!
//! This crate provides:
//! - **REST API**: create, list and delete buckets; upload, download, list and delete objects
//! - **Access Log**: one structured JSON record per request, correlated by request id
//! - **Multipart Uploads**: large parts spill to temporary files instead of memory
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   HTTP Clients                      │
//! │              (browsers, curl, scripts)              │
//! └─────────────────────────┬───────────────────────────┘
//!                           │
//! ┌─────────────────────────▼───────────────────────────┐
//! │                  Bucket Gateway                     │
//! ├─────────────────────────────────────────────────────┤
//! │  Request Logger │ Body Capture │ Multipart Parser   │
//! ├─────────────────────────────────────────────────────┤
//! │                REST Handlers                        │
//! │   (CreateBucket, Upload, Download, ListObjects)     │
//! ├─────────────────────────────────────────────────────┤
//! │                bucketgate-store                     │
//! │          (S3-compatible client, memory)             │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod access_log;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod multipart;
pub mod routes;
pub mod server;
pub mod state;

pub use access_log::{AccessLogger, CapturePolicy, LogRecord, LogSink, MemorySink};
pub use config::GatewayConfig;
pub use error::{ApiError, ErrorBody};
pub use server::{run_server, run_server_with_shutdown};
pub use state::AppState;
