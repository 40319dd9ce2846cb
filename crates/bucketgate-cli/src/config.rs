//! Gateway configuration

use bucketgate_store::S3Settings;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "BUCKETGATE";

/// Gateway server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Object store connection
    pub s3: S3Settings,
    /// Use in-memory storage (for testing/development)
    pub use_memory_store: bool,
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
    /// Multipart bytes kept in memory before parts spill to temporary files
    pub multipart_memory_limit: usize,
    /// Per-request access log
    pub access_log: AccessLogConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            s3: S3Settings::default(),
            use_memory_store: false,
            max_body_size: 5 * 1024 * 1024 * 1024, // 5 GB
            multipart_memory_limit: 10 * 1024 * 1024, // 10 MiB
            access_log: AccessLogConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from an optional YAML file plus `BUCKETGATE__*` environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self, config::ConfigError> {
        let path = path.as_ref();
        config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Access log sink and capture policy
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessLogConfig {
    /// Where records go: `file` (rotating) or `stdout`
    pub target: String,
    /// Capture request bodies of non-retrieval requests
    pub log_body: bool,
    /// Directory holding the log files
    pub directory: String,
    /// Active log file name; rotated files get a numeric suffix
    pub file_name: String,
    /// Size in megabytes after which the active file is rotated
    pub max_size_mb: u64,
    /// Rotated files to retain
    pub max_backups: usize,
    /// Days a rotated file is kept; 0 keeps them regardless of age
    pub max_age_days: u64,
    /// Gzip rotated files
    pub compress: bool,
}

impl Default for AccessLogConfig {
    fn default() -> Self {
        Self {
            target: "file".to_string(),
            log_body: true,
            directory: "./logs".to_string(),
            file_name: "server.log".to_string(),
            max_size_mb: 10,
            max_backups: 5,
            max_age_days: 30,
            compress: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        assert_eq!(config.multipart_memory_limit, 10 << 20);
        assert!(config.access_log.log_body);
        assert_eq!(config.s3.region, "us-east-1");
    }

    #[test]
    fn test_load_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "port: 9090\ns3:\n  endpoint: minio:9000\n  access_key: minio\n  secret_key: minio123\n  region: eu-west-1\n  use_ssl: true\naccess_log:\n  log_body: false\n  max_size_mb: 1\n"
        )
        .unwrap();

        let config = GatewayConfig::load(file.path()).unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.s3.endpoint, "minio:9000");
        assert_eq!(config.s3.access_key, "minio");
        assert_eq!(config.s3.region, "eu-west-1");
        assert!(config.s3.use_ssl);
        assert!(!config.access_log.log_body);
        assert_eq!(config.access_log.max_size_mb, 1);
        assert_eq!(config.access_log.max_backups, 5);
        assert_eq!(config.access_log.max_age_days, 30);
        assert!(config.access_log.compress);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = GatewayConfig::load("/nonexistent/bucketgate.yaml").unwrap();
        assert_eq!(config.port, 8080);
    }
}
