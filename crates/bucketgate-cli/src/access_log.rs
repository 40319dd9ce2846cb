//! Per-request access log records and the sinks they are written to

use crate::config::{AccessLogConfig, GatewayConfig};
use anyhow::{bail, Context};
use file_rotate::{compression::Compression, suffix::AppendCount, ContentLimit, FileRotate};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, warn};
use tracing_appender::non_blocking::{NonBlocking, NonBlockingBuilder, WorkerGuard};

/// Severity of an access log record
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Error,
}

/// One structured record per completed request
#[derive(Clone, Debug, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub msg: &'static str,
    #[serde(rename = "requestID")]
    pub request_id: String,
    pub status: u16,
    pub method: String,
    pub path: String,
    pub query: String,
    #[serde(rename = "clientIP")]
    pub client_ip: String,
    #[serde(serialize_with = "as_seconds")]
    pub latency: Duration,
    #[serde(rename = "userAgent")]
    pub user_agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

fn as_seconds<S: Serializer>(latency: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(latency.as_secs_f64())
}

impl LogRecord {
    /// Message matching the record severity
    pub fn message_for(level: LogLevel) -> &'static str {
        match level {
            LogLevel::Info => "Handled request",
            LogLevel::Error => "Request encountered errors",
        }
    }
}

/// Append-only destination for access log records
pub trait LogSink: Send + Sync {
    /// Append one record
    fn append(&self, record: &LogRecord) -> io::Result<()>;
}

/// Writes records as JSON lines through a background writer thread
pub struct WriterSink {
    writer: NonBlocking,
}

impl WriterSink {
    /// Size-rotated file under the configured directory
    pub fn rolling(config: &AccessLogConfig) -> anyhow::Result<(Self, WorkerGuard)> {
        let file = RotatingFile::open(RotationSettings::from_config(config))
            .with_context(|| format!("failed to open access log in {}", config.directory))?;
        Ok(Self::wrap(file))
    }

    /// Standard output
    pub fn stdout() -> (Self, WorkerGuard) {
        Self::wrap(io::stdout())
    }

    fn wrap<W: Write + Send + 'static>(inner: W) -> (Self, WorkerGuard) {
        let (writer, guard) = NonBlockingBuilder::default().lossy(false).finish(inner);
        (Self { writer }, guard)
    }
}

impl LogSink for WriterSink {
    fn append(&self, record: &LogRecord) -> io::Result<()> {
        let mut line = serde_json::to_vec(record).map_err(io::Error::other)?;
        line.push(b'\n');
        self.writer.clone().write_all(&line)
    }
}

/// How often rotated files are checked for expiry
const EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Clone, Debug)]
struct RotationSettings {
    directory: PathBuf,
    file_name: String,
    max_bytes: usize,
    max_backups: usize,
    max_age: Option<Duration>,
    compress: bool,
}

impl RotationSettings {
    fn from_config(config: &AccessLogConfig) -> Self {
        let max_bytes = config.max_size_mb.saturating_mul(1024 * 1024);
        Self {
            directory: PathBuf::from(&config.directory),
            file_name: config.file_name.clone(),
            max_bytes: usize::try_from(max_bytes).unwrap_or(usize::MAX),
            max_backups: config.max_backups,
            max_age: (config.max_age_days > 0)
                .then(|| Duration::from_secs(config.max_age_days * 24 * 60 * 60)),
            compress: config.compress,
        }
    }

    /// Scans existing rotated files, so it is reopened after files are removed behind its back
    fn open_rotate(&self) -> FileRotate<AppendCount> {
        let compression = if self.compress {
            Compression::OnRotate(0)
        } else {
            Compression::None
        };
        FileRotate::new(
            self.directory.join(&self.file_name),
            AppendCount::new(self.max_backups),
            ContentLimit::BytesSurpassed(self.max_bytes),
            compression,
            #[cfg(unix)]
            None,
        )
    }
}

/// Log file rotated by size, keeping a bounded number of (optionally gzipped)
/// backups, with backups older than the age limit removed
struct RotatingFile {
    settings: RotationSettings,
    inner: FileRotate<AppendCount>,
    last_sweep: Instant,
}

impl RotatingFile {
    fn open(settings: RotationSettings) -> io::Result<Self> {
        fs::create_dir_all(&settings.directory)?;
        if let Some(max_age) = settings.max_age {
            remove_expired(&settings.directory, &settings.file_name, max_age, SystemTime::now())?;
        }
        Ok(Self {
            inner: settings.open_rotate(),
            settings,
            last_sweep: Instant::now(),
        })
    }

    fn sweep(&mut self) {
        self.last_sweep = Instant::now();
        let Some(max_age) = self.settings.max_age else {
            return;
        };
        match remove_expired(&self.settings.directory, &self.settings.file_name, max_age, SystemTime::now()) {
            Ok(0) => {}
            Ok(removed) => {
                debug!(removed, "Expired rotated access log files");
                self.inner = self.settings.open_rotate();
            }
            Err(e) => warn!(error = %e, "Failed to expire rotated access log files"),
        }
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        if self.last_sweep.elapsed() >= EXPIRY_SWEEP_INTERVAL {
            self.sweep();
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Remove rotated copies of `file_name` last modified more than `max_age` before `now`
fn remove_expired(directory: &Path, file_name: &str, max_age: Duration, now: SystemTime) -> io::Result<usize> {
    let prefix = format!("{file_name}.");
    let mut removed = 0;
    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        if !entry.file_name().to_string_lossy().starts_with(&prefix) {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        if now.duration_since(modified).is_ok_and(|age| age > max_age) {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Keeps records in memory
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the records written so far
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }
}

impl LogSink for MemorySink {
    fn append(&self, record: &LogRecord) -> io::Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

/// What the request logger captures from request bodies
#[derive(Clone, Debug)]
pub struct CapturePolicy {
    /// Capture bodies of non-retrieval requests
    pub log_body: bool,
    /// Largest textual body read into memory
    pub max_body_size: usize,
    /// Multipart bytes kept in memory before spilling
    pub multipart_memory_limit: usize,
}

impl CapturePolicy {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            log_body: config.access_log.log_body,
            max_body_size: config.max_body_size,
            multipart_memory_limit: config.multipart_memory_limit,
        }
    }
}

/// Flushes the background log writer when dropped
pub struct AccessLogGuard {
    _guard: Option<WorkerGuard>,
}

/// The request logging component handed to the middleware
pub struct AccessLogger {
    sink: Arc<dyn LogSink>,
    policy: CapturePolicy,
}

impl AccessLogger {
    pub fn new(sink: Arc<dyn LogSink>, policy: CapturePolicy) -> Self {
        Self { sink, policy }
    }

    /// Open the sink named by the configuration
    pub fn open(config: &GatewayConfig) -> anyhow::Result<(Self, AccessLogGuard)> {
        let (sink, guard) = match config.access_log.target.as_str() {
            "file" => WriterSink::rolling(&config.access_log)?,
            "stdout" => WriterSink::stdout(),
            other => bail!("unknown access log target: {other}"),
        };
        let logger = Self::new(Arc::new(sink), CapturePolicy::from_config(config));
        Ok((logger, AccessLogGuard { _guard: Some(guard) }))
    }

    pub fn policy(&self) -> &CapturePolicy {
        &self.policy
    }

    /// Write a record; sink failures never reach the caller
    pub fn emit(&self, record: &LogRecord) {
        if let Err(e) = self.sink.append(record) {
            warn!(error = %e, request_id = %record.request_id, "Failed to write access log record");
        }
    }
}
