//! CLI command implementations

pub mod delete;
pub mod files;
pub mod fingerprint;
pub mod ingest;
pub mod schema;

use anyhow::{Context, Result};
use tracing::debug;

use etl_core::AppConfig;
use etl_infra::{connect_store, open_archive};
use etl_ingestion::IngestionPipeline;

/// Connect the configured backends and assemble the pipeline
pub async fn build_pipeline(config: &AppConfig) -> Result<IngestionPipeline> {
    let store = connect_store(&config.store)
        .await
        .with_context(|| format!("Failed to connect to the {:?} document store", config.store.backend))?;
    let archive = open_archive(&config.archive)
        .await
        .with_context(|| format!("Failed to open archive at {}", config.archive.dir.display()))?;

    debug!(store = store.name(), archive = archive.name(), "Backends ready");

    Ok(IngestionPipeline::new(
        store,
        archive,
        &config.collections,
        config.pipeline.clone(),
    ))
}
