use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub store: StoreConfig,
    #[serde(default)]
    pub collections: CollectionsConfig,
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_env("ETL")
    }

    /// Load configuration from environment with custom prefix
    pub fn load_from_env(prefix: &str) -> Result<Self, ConfigError> {
        let builder = Self::with_defaults(Config::builder())?.add_source(
            Environment::with_prefix(prefix)
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file with environment overrides
    pub fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let builder = Self::with_defaults(Config::builder())?
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("ETL")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject backend combinations that cannot keep state consistent
    ///
    /// The memory store forgets the registry when the process exits while a
    /// filesystem archive keeps the bytes, so later runs would re-ingest and
    /// deletes would only reach the archive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.backend == StoreBackend::Memory
            && self.archive.backend == ArchiveBackend::Filesystem
        {
            return Err(ConfigError::Message(
                "the memory store cannot be combined with the filesystem archive; \
                 use store.backend = \"redis\" or archive.backend = \"memory\""
                    .to_string(),
            ));
        }
        Ok(())
    }

    fn with_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("store.backend", "redis")?
            .set_default("store.url", "redis://127.0.0.1:6379")?
            .set_default("store.key_prefix", "etl:")?
            .set_default("collections.records", "records")?
            .set_default("collections.registry", "file_registry")?
            .set_default("collections.schema", "schema_registry")?
            .set_default("archive.backend", "filesystem")?
            .set_default("archive.dir", "archive")?
            .set_default("pipeline.max_document_size", default_max_document_size() as i64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Redis,
}

/// Document store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    #[serde(default = "default_store_url")]
    pub url: String,
    #[serde(default)]
    pub key_prefix: Option<String>,
}

impl StoreConfig {
    pub fn memory() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: default_store_url(),
            key_prefix: None,
        }
    }

    pub fn redis(url: impl Into<String>) -> Self {
        Self {
            backend: StoreBackend::Redis,
            url: url.into(),
            key_prefix: Some("etl:".to_string()),
        }
    }

    pub fn with_key_prefix(mut self, prefix: Option<String>) -> Self {
        self.key_prefix = prefix;
        self
    }
}

fn default_store_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

/// Names of the collections the pipeline writes to
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionsConfig {
    #[serde(default = "default_records_collection")]
    pub records: String,
    #[serde(default = "default_registry_collection")]
    pub registry: String,
    #[serde(default = "default_schema_collection")]
    pub schema: String,
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            records: default_records_collection(),
            registry: default_registry_collection(),
            schema: default_schema_collection(),
        }
    }
}

fn default_records_collection() -> String {
    "records".to_string()
}

fn default_registry_collection() -> String {
    "file_registry".to_string()
}

fn default_schema_collection() -> String {
    "schema_registry".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveBackend {
    Memory,
    Filesystem,
}

/// Raw-bytes archive configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    pub backend: ArchiveBackend,
    #[serde(default = "default_archive_dir")]
    pub dir: PathBuf,
}

impl ArchiveConfig {
    pub fn filesystem(dir: impl Into<PathBuf>) -> Self {
        Self {
            backend: ArchiveBackend::Filesystem,
            dir: dir.into(),
        }
    }

    pub fn memory() -> Self {
        Self {
            backend: ArchiveBackend::Memory,
            dir: default_archive_dir(),
        }
    }
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from("archive")
}

/// Ingestion pipeline limits
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Maximum upload size in bytes
    #[serde(default = "default_max_document_size")]
    pub max_document_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_document_size: default_max_document_size(),
        }
    }
}

impl PipelineConfig {
    pub fn with_max_document_size(mut self, size: usize) -> Self {
        self.max_document_size = size;
        self
    }
}

fn default_max_document_size() -> usize {
    50 * 1024 * 1024 // 50MB
}
