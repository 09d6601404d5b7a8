pub mod archive;
pub mod store;

use std::sync::Arc;

use etl_core::{ArchiveBackend, ArchiveConfig, ArchiveStore, DocumentStore, StoreBackend, StoreConfig, StoreError};

pub use archive::{FsArchiveStore, MemoryArchiveStore};
pub use store::{MemoryDocumentStore, RedisDocumentStore, RedisStoreConfig};

#[derive(Debug, thiserror::Error)]
pub enum InfraError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt document {id} in {collection}: {reason}")]
    CorruptDocument {
        collection: String,
        id: String,
        reason: String,
    },
}

impl From<InfraError> for StoreError {
    fn from(err: InfraError) -> Self {
        match err {
            InfraError::Redis(e) => StoreError::Unavailable(e.to_string()),
            InfraError::Serialization(e) => StoreError::Serialization(e),
            InfraError::Io(e) => StoreError::Io(e),
            err @ InfraError::CorruptDocument { .. } => StoreError::InvalidDocument(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, InfraError>;

/// Build the document store described by the configuration
pub async fn connect_store(config: &StoreConfig) -> Result<Arc<dyn DocumentStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryDocumentStore::new())),
        StoreBackend::Redis => {
            let redis_config = RedisStoreConfig::new(config.url.clone())
                .with_key_prefix(config.key_prefix.clone());
            Ok(Arc::new(RedisDocumentStore::new(redis_config).await?))
        }
    }
}

/// Build the archive described by the configuration
pub async fn open_archive(config: &ArchiveConfig) -> Result<Arc<dyn ArchiveStore>> {
    match config.backend {
        ArchiveBackend::Memory => Ok(Arc::new(MemoryArchiveStore::new())),
        ArchiveBackend::Filesystem => Ok(Arc::new(FsArchiveStore::open(&config.dir).await?)),
    }
}
