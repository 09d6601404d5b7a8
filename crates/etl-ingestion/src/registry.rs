//! Duplicate registry: one entry per ingested content fingerprint

use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use etl_core::{DocumentStore, Filter, Fingerprint, IngestedFile, StoreError, StoreResult};

const FINGERPRINT_FIELD: &str = "fingerprint";

#[derive(Clone)]
pub struct DuplicateRegistry {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl DuplicateRegistry {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    fn filter(fingerprint: &Fingerprint) -> Filter {
        Filter::by(FINGERPRINT_FIELD, fingerprint.as_str())
    }

    /// Whether this content has been ingested before
    pub async fn exists(&self, fingerprint: &Fingerprint) -> StoreResult<bool> {
        Ok(self
            .store
            .find_one(&self.collection, &Self::filter(fingerprint), None)
            .await?
            .is_some())
    }

    /// Record a successful ingestion, stamped with the current time
    pub async fn record(&self, filename: &str, fingerprint: &Fingerprint) -> StoreResult<IngestedFile> {
        let entry = IngestedFile {
            fingerprint: fingerprint.clone(),
            filename: filename.to_string(),
            ingested_at: Utc::now(),
        };

        let doc = match serde_json::to_value(&entry)? {
            serde_json::Value::Object(doc) => doc,
            _ => return Err(StoreError::invalid_document("registry entry is not an object")),
        };
        self.store.insert_one(&self.collection, doc).await?;

        debug!(filename = %filename, fingerprint = %fingerprint, "Registered file");
        Ok(entry)
    }

    /// Remove the entry for a fingerprint, returning how many were removed
    pub async fn delete(&self, fingerprint: &Fingerprint) -> StoreResult<u64> {
        self.store
            .delete_many(&self.collection, &Self::filter(fingerprint))
            .await
    }

    /// Every registered file, in registration order
    pub async fn list(&self) -> StoreResult<Vec<IngestedFile>> {
        self.store
            .find_many(&self.collection, &Filter::new())
            .await?
            .into_iter()
            .map(|doc| -> StoreResult<IngestedFile> {
                Ok(serde_json::from_value(serde_json::Value::Object(doc))?)
            })
            .collect()
    }
}
