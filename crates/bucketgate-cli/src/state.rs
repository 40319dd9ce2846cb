//! Application state

use crate::config::GatewayConfig;
use bucketgate_store::{MemoryStorage, S3Storage, StorageClient};
use std::sync::Arc;
use tracing::{info, warn};

/// Application state shared across handlers
pub struct AppState {
    /// Gateway configuration
    pub config: GatewayConfig,
    /// Object store every operation is forwarded to
    pub storage: Arc<dyn StorageClient>,
}

impl AppState {
    /// Create the state with the store named by the configuration
    pub fn new(config: GatewayConfig) -> Self {
        let storage: Arc<dyn StorageClient> = if config.use_memory_store {
            warn!("Storage mode: in-memory (NOT persistent, for development only)");
            Arc::new(MemoryStorage::new())
        } else {
            let storage = S3Storage::new(&config.s3);
            info!(endpoint = %config.s3.endpoint_url(), region = %config.s3.region, "Storage mode: S3");
            Arc::new(storage)
        };

        Self::with_storage(config, storage)
    }

    /// Create the state around an existing store
    pub fn with_storage(config: GatewayConfig, storage: Arc<dyn StorageClient>) -> Self {
        Self { config, storage }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_selected() {
        let config = GatewayConfig {
            use_memory_store: true,
            ..Default::default()
        };
        let state = AppState::new(config);
        state.storage.create_bucket("reports", "us-east-1").await.unwrap();
        assert_eq!(state.storage.list_buckets().await.unwrap(), vec!["reports"]);
    }
}
