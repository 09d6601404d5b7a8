//! Schema registry
//!
//! Keeps an append-only log of inferred schemas in a document-store
//! collection. A new version is written only when the inferred schema of a
//! batch differs from the most recent one.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use etl_core::{
    Document, DocumentStore, Filter, Record, Schema, SchemaDiff, SchemaVersion, Sort, StoreError,
    StoreResult, TypeChange, TypeTag,
};

/// Field the log is ordered by
const VERSION_TS_FIELD: &str = "version_ts";

/// Infer the schema of a batch: one tag per field, `mixed` once a field has
/// been seen with two different tags
pub fn infer(records: &[Record]) -> Schema {
    let mut schema = Schema::new();
    for record in records {
        for (field, value) in &record.fields {
            let tag = value.type_tag();
            schema
                .entry(field.clone())
                .and_modify(|existing| {
                    if *existing != tag {
                        *existing = TypeTag::Mixed;
                    }
                })
                .or_insert(tag);
        }
    }
    schema
}

/// Structural difference between two schemas, `None` when identical.
/// A missing old schema counts as empty.
pub fn diff(old: Option<&Schema>, new: &Schema) -> Option<SchemaDiff> {
    let empty = Schema::new();
    let old = old.unwrap_or(&empty);
    let mut diff = SchemaDiff::default();

    for (field, &tag) in new {
        match old.get(field) {
            None => {
                diff.added.insert(field.clone(), tag);
            }
            Some(&previous) if previous != tag => {
                diff.changed
                    .insert(field.clone(), TypeChange { from: previous, to: tag });
            }
            Some(_) => {}
        }
    }
    for (field, &tag) in old {
        if !new.contains_key(field) {
            diff.removed.insert(field.clone(), tag);
        }
    }

    (!diff.is_empty()).then_some(diff)
}

/// Append-only schema log over a document-store collection
#[derive(Clone)]
pub struct SchemaRegistry {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl SchemaRegistry {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    /// Most recent version, if any
    pub async fn latest(&self) -> StoreResult<Option<SchemaVersion>> {
        self.store
            .find_one(
                &self.collection,
                &Filter::new(),
                Some(&Sort::descending(VERSION_TS_FIELD)),
            )
            .await?
            .map(decode_version)
            .transpose()
    }

    /// Every version, oldest first
    pub async fn history(&self) -> StoreResult<Vec<SchemaVersion>> {
        let mut docs = self.store.find_many(&self.collection, &Filter::new()).await?;
        let sort = Sort::ascending(VERSION_TS_FIELD);
        docs.sort_by(|a, b| sort.compare(a, b));
        docs.into_iter().map(decode_version).collect()
    }

    /// Append a version when `schema` differs from the latest one.
    /// Returns the appended version, or `None` when nothing changed.
    pub async fn append_if_changed(&self, schema: Schema) -> StoreResult<Option<SchemaVersion>> {
        let latest = self.latest().await?;

        let Some(diff) = diff(latest.as_ref().map(|v| &v.schema), &schema) else {
            debug!(fields = schema.len(), "Schema unchanged");
            return Ok(None);
        };

        let version = SchemaVersion {
            version_ts: next_version_ts(latest.as_ref().map(|v| v.version_ts)),
            schema,
            diff_from_prev: Some(diff),
        };
        self.store
            .insert_one(&self.collection, encode_version(&version)?)
            .await?;

        info!(
            version_ts = %etl_core::timestamp::format(&version.version_ts),
            fields = version.schema.len(),
            changes = version.diff_from_prev.as_ref().map_or(0, SchemaDiff::len),
            "Recorded new schema version"
        );
        Ok(Some(version))
    }
}

/// Current time at stored precision, forced strictly past the previous version
fn next_version_ts(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now().trunc_subsecs(6);
    match previous {
        Some(prev) if now <= prev => prev + Duration::microseconds(1),
        _ => now,
    }
}

fn encode_version(version: &SchemaVersion) -> StoreResult<Document> {
    match serde_json::to_value(version)? {
        serde_json::Value::Object(doc) => Ok(doc),
        _ => Err(StoreError::invalid_document("schema version is not an object")),
    }
}

fn decode_version(doc: Document) -> StoreResult<SchemaVersion> {
    Ok(serde_json::from_value(serde_json::Value::Object(doc))?)
}
