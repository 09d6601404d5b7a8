//! Ingestion orchestrator
//!
//! Composes fingerprinting, duplicate detection, parsing, flattening, schema
//! tracking, loading and archiving into the end-to-end ingest operation, and
//! the three independent removals into the delete operation.

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use etl_core::{
    ArchiveStore, CollectionsConfig, DocumentStore, Filter, Fingerprint, PipelineConfig, Record,
    StoreError, FILE_HASH_FIELD,
};

use crate::flatten::flatten_all;
use crate::parsers::ParserRegistry;
use crate::registry::DuplicateRegistry;
use crate::schema::{self, SchemaRegistry};
use crate::{IngestionError, Result};

pub const SUCCESS_MESSAGE: &str = "File processed successfully";
pub const DUPLICATE_MESSAGE: &str = "Duplicate file detected, skipped ingestion";

/// An upload: raw bytes plus the name they arrived under
#[derive(Debug, Clone)]
pub struct RawFile {
    pub filename: String,
    pub content: Vec<u8>,
}

impl RawFile {
    pub fn new(filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }

    /// Read a file from disk, named after its final path component
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read(path).await?;

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self::new(filename, content))
    }
}

/// Progress of a single ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStage {
    Fingerprinted,
    Duplicate,
    Parsed,
    Flattened,
    SchemaChecked,
    Loaded,
    Registered,
    Archived,
}

impl IngestStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStage::Fingerprinted => "fingerprinted",
            IngestStage::Duplicate => "duplicate",
            IngestStage::Parsed => "parsed",
            IngestStage::Flattened => "flattened",
            IngestStage::SchemaChecked => "schema_checked",
            IngestStage::Loaded => "loaded",
            IngestStage::Registered => "registered",
            IngestStage::Archived => "archived",
        }
    }
}

impl std::fmt::Display for IngestStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of ingesting one file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestOutcome {
    pub filename: String,
    pub fingerprint: Fingerprint,
    pub inserted_count: u64,
    pub message: String,
    /// True when the content had been ingested before and nothing was done
    pub duplicate: bool,
    /// True when this batch appended a new schema version
    pub schema_changed: bool,
}

/// One of the three stores a delete touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteTarget {
    Records,
    Registry,
    Archive,
}

impl std::fmt::Display for DeleteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DeleteTarget::Records => "records",
            DeleteTarget::Registry => "registry",
            DeleteTarget::Archive => "archive",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteFailure {
    pub target: DeleteTarget,
    pub message: String,
}

/// Per-target outcome of a delete. Targets are independent: a failure in one
/// is recorded here and the others still run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteReport {
    pub fingerprint: Fingerprint,
    pub records_deleted: u64,
    pub registry_deleted: u64,
    pub archive_deleted: bool,
    pub failures: Vec<DeleteFailure>,
}

impl DeleteReport {
    fn new(fingerprint: Fingerprint) -> Self {
        Self {
            fingerprint,
            records_deleted: 0,
            registry_deleted: 0,
            archive_deleted: false,
            failures: Vec::new(),
        }
    }

    fn fail(&mut self, target: DeleteTarget, err: StoreError) {
        warn!(
            fingerprint = %self.fingerprint,
            target = %target,
            error = %err,
            "Delete target failed"
        );
        self.failures.push(DeleteFailure {
            target,
            message: err.to_string(),
        });
    }

    /// Every target was reached without error
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Anything at all was removed
    pub fn removed_anything(&self) -> bool {
        self.records_deleted > 0 || self.registry_deleted > 0 || self.archive_deleted
    }
}

/// End-to-end ingestion pipeline
pub struct IngestionPipeline {
    store: Arc<dyn DocumentStore>,
    archive: Arc<dyn ArchiveStore>,
    parsers: ParserRegistry,
    schemas: SchemaRegistry,
    registry: DuplicateRegistry,
    records_collection: String,
    config: PipelineConfig,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        archive: Arc<dyn ArchiveStore>,
        collections: &CollectionsConfig,
        config: PipelineConfig,
    ) -> Self {
        Self {
            schemas: SchemaRegistry::new(store.clone(), collections.schema.clone()),
            registry: DuplicateRegistry::new(store.clone(), collections.registry.clone()),
            records_collection: collections.records.clone(),
            parsers: ParserRegistry::with_defaults(),
            store,
            archive,
            config,
        }
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    pub fn registry(&self) -> &DuplicateRegistry {
        &self.registry
    }

    /// Ingest one file. Content seen before is skipped without parsing.
    pub async fn ingest(&self, file: &RawFile) -> Result<IngestOutcome> {
        let filename = file.filename.as_str();
        let size = file.content.len();
        if size > self.config.max_document_size {
            return Err(IngestionError::DocumentTooLarge {
                size,
                max: self.config.max_document_size,
            });
        }

        let fingerprint = Fingerprint::of(&file.content);
        debug!(
            filename = %filename,
            fingerprint = %fingerprint,
            stage = %IngestStage::Fingerprinted,
            size = size
        );

        if self.registry.exists(&fingerprint).await? {
            warn!(
                filename = %filename,
                fingerprint = %fingerprint,
                stage = %IngestStage::Duplicate,
                "Duplicate content, skipping"
            );
            return Ok(IngestOutcome {
                filename: filename.to_string(),
                fingerprint,
                inserted_count: 0,
                message: DUPLICATE_MESSAGE.to_string(),
                duplicate: true,
                schema_changed: false,
            });
        }

        let records = self.transform(filename, &fingerprint, &file.content)?;

        let mut inserted_count = 0;
        let mut schema_changed = false;
        if !records.is_empty() {
            let batch_schema = schema::infer(&records);
            schema_changed = self.schemas.append_if_changed(batch_schema).await?.is_some();
            debug!(
                filename = %filename,
                stage = %IngestStage::SchemaChecked,
                schema_changed = schema_changed
            );

            let docs = records.iter().map(Record::to_document).collect();
            inserted_count = self.store.insert_many(&self.records_collection, docs).await?;
            debug!(filename = %filename, stage = %IngestStage::Loaded, inserted = inserted_count);
        }

        self.registry.record(filename, &fingerprint).await?;
        debug!(filename = %filename, stage = %IngestStage::Registered);

        let key = self
            .archive
            .put(&fingerprint, filename, &file.content)
            .await
            .map_err(IngestionError::Archive)?;
        debug!(filename = %filename, stage = %IngestStage::Archived, key = %key);

        info!(
            filename = %filename,
            fingerprint = %fingerprint,
            inserted = inserted_count,
            schema_changed = schema_changed,
            "File ingested"
        );

        Ok(IngestOutcome {
            filename: filename.to_string(),
            fingerprint,
            inserted_count,
            message: SUCCESS_MESSAGE.to_string(),
            duplicate: false,
            schema_changed,
        })
    }

    /// Ingest files one after another. A failure is reported for its file
    /// and does not stop the rest.
    pub async fn ingest_many(&self, files: &[RawFile]) -> Vec<(String, Result<IngestOutcome>)> {
        let mut results = Vec::with_capacity(files.len());
        for file in files {
            let result = self.ingest(file).await;
            if let Err(ref err) = result {
                warn!(filename = %file.filename, error = %err, "Ingestion failed");
            }
            results.push((file.filename.clone(), result));
        }

        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        info!(files = files.len(), failed = failed, "Batch ingestion finished");
        results
    }

    /// Parse, flatten and tag the records of one upload
    fn transform(&self, filename: &str, fingerprint: &Fingerprint, content: &[u8]) -> Result<Vec<Record>> {
        let parser = self.parsers.get_by_filename(filename);
        let nodes = parser.parse(content).map_err(|source| IngestionError::Parse {
            filename: filename.to_string(),
            format: parser.format(),
            source,
        })?;
        debug!(
            filename = %filename,
            format = %parser.format(),
            stage = %IngestStage::Parsed,
            records = nodes.len()
        );

        let records: Vec<Record> = flatten_all(&nodes)
            .into_iter()
            .map(|fields| Record::new(fields, fingerprint.clone()))
            .collect();
        debug!(filename = %filename, stage = %IngestStage::Flattened, records = records.len());

        Ok(records)
    }

    /// Remove the records, registry entry and archived bytes of a fingerprint.
    ///
    /// An unknown fingerprint is not an error; the report is simply all zero.
    pub async fn delete(&self, fingerprint: &str) -> Result<DeleteReport> {
        let fingerprint = Fingerprint::parse(fingerprint)?;
        let mut report = DeleteReport::new(fingerprint.clone());

        let records_filter = Filter::by(FILE_HASH_FIELD, fingerprint.as_str());
        match self.store.delete_many(&self.records_collection, &records_filter).await {
            Ok(count) => report.records_deleted = count,
            Err(err) => report.fail(DeleteTarget::Records, err),
        }

        match self.registry.delete(&fingerprint).await {
            Ok(count) => report.registry_deleted = count,
            Err(err) => report.fail(DeleteTarget::Registry, err),
        }

        match self.archive.delete_by_prefix(&fingerprint).await {
            Ok(removed) => report.archive_deleted = removed,
            Err(err) => report.fail(DeleteTarget::Archive, err),
        }

        info!(
            fingerprint = %fingerprint,
            records = report.records_deleted,
            registry = report.registry_deleted,
            archive = report.archive_deleted,
            failures = report.failures.len(),
            "Delete finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use etl_core::{StoreResult, TypeTag};
    use etl_infra::{FsArchiveStore, MemoryArchiveStore, MemoryDocumentStore};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const DATA_CSV: &[u8] = b"name,age\nalice,30\nbob,41\n";

    struct Harness {
        pipeline: IngestionPipeline,
        store: MemoryDocumentStore,
        archive: Arc<dyn ArchiveStore>,
    }

    fn harness_with_archive(archive: Arc<dyn ArchiveStore>) -> Harness {
        let store = MemoryDocumentStore::new();
        let pipeline = IngestionPipeline::new(
            Arc::new(store.clone()),
            archive.clone(),
            &CollectionsConfig::default(),
            PipelineConfig::default(),
        );
        Harness {
            pipeline,
            store,
            archive,
        }
    }

    fn harness() -> Harness {
        harness_with_archive(Arc::new(MemoryArchiveStore::new()))
    }

    /// Archive that refuses every operation
    struct BrokenArchive;

    #[async_trait]
    impl ArchiveStore for BrokenArchive {
        async fn put(&self, _: &Fingerprint, _: &str, _: &[u8]) -> StoreResult<String> {
            Err(StoreError::unavailable("archive offline"))
        }

        async fn delete_by_prefix(&self, _: &Fingerprint) -> StoreResult<bool> {
            Err(StoreError::unavailable("archive offline"))
        }

        async fn list(&self) -> StoreResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn get(&self, _: &str) -> StoreResult<Option<Vec<u8>>> {
            Ok(None)
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_csv_ingest_duplicate_and_delete() {
        let h = harness();
        let file = RawFile::new("data.csv", DATA_CSV);

        let outcome = h.pipeline.ingest(&file).await.unwrap();
        assert_eq!(outcome.filename, "data.csv");
        assert_eq!(outcome.inserted_count, 2);
        assert_eq!(outcome.message, SUCCESS_MESSAGE);
        assert!(!outcome.duplicate);
        assert_eq!(outcome.fingerprint, Fingerprint::of(DATA_CSV));

        let docs = h.store.find_many("records", &Filter::new()).await.unwrap();
        assert_eq!(docs.len(), 2);
        for doc in &docs {
            let mut keys: Vec<_> = doc.keys().map(String::as_str).collect();
            keys.sort();
            assert_eq!(keys, vec!["_file_hash", "age", "name"]);
            assert_eq!(doc["_file_hash"], json!(outcome.fingerprint.as_str()));
        }
        assert_eq!(docs[0]["name"], json!("alice"));
        assert_eq!(docs[1]["age"], json!(41));

        let again = h.pipeline.ingest(&file).await.unwrap();
        assert_eq!(again.inserted_count, 0);
        assert!(again.duplicate);
        assert_eq!(again.message, DUPLICATE_MESSAGE);
        assert_eq!(h.store.len("records").await, 2);

        let report = h.pipeline.delete(outcome.fingerprint.as_str()).await.unwrap();
        assert_eq!(report.records_deleted, 2);
        assert_eq!(report.registry_deleted, 1);
        assert!(report.archive_deleted);
        assert!(report.is_complete());

        assert_eq!(h.store.len("records").await, 0);
        assert!(!h.pipeline.registry().exists(&outcome.fingerprint).await.unwrap());
        assert!(h.archive.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_same_bytes_under_another_name_are_duplicates() {
        let h = harness();

        let first = h.pipeline.ingest(&RawFile::new("a.csv", DATA_CSV)).await.unwrap();
        let second = h.pipeline.ingest(&RawFile::new("b.csv", DATA_CSV)).await.unwrap();

        assert_eq!(first.fingerprint, second.fingerprint);
        assert!(second.duplicate);
        assert_eq!(h.pipeline.registry().list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_nested_json_is_flattened() {
        let h = harness();
        let file = RawFile::new("nested.json", br#"{"a": {"b": [1, 2]}}"#.to_vec());

        let outcome = h.pipeline.ingest(&file).await.unwrap();
        assert_eq!(outcome.inserted_count, 1);

        let docs = h.store.find_many("records", &Filter::new()).await.unwrap();
        assert_eq!(
            serde_json::Value::Object(docs[0].clone()),
            json!({"a.b.0": 1, "a.b.1": 2, "_file_hash": outcome.fingerprint.as_str()})
        );
    }

    #[tokio::test]
    async fn test_csv_columns_get_one_type_each() {
        let h = harness();
        let file = RawFile::new("prices.csv", b"zip,price\n02134,1\nAB123,2.5\n".to_vec());
        h.pipeline.ingest(&file).await.unwrap();

        let latest = h.pipeline.schemas().latest().await.unwrap().unwrap();
        assert_eq!(latest.schema["zip"], TypeTag::String);
        assert_eq!(latest.schema["price"], TypeTag::Float);

        let docs = h.store.find_many("records", &Filter::new()).await.unwrap();
        assert_eq!(docs[0]["zip"], json!("02134"));
        assert_eq!(docs[0]["price"], json!(1.0));
    }

    #[tokio::test]
    async fn test_schema_versions_follow_batches() {
        let h = harness();

        let first = h
            .pipeline
            .ingest(&RawFile::new("one.json", br#"[{"id": 1, "v": "x"}]"#.to_vec()))
            .await
            .unwrap();
        assert!(first.schema_changed);

        // Same shape, different content
        let second = h
            .pipeline
            .ingest(&RawFile::new("two.json", br#"[{"id": 2, "v": "y"}]"#.to_vec()))
            .await
            .unwrap();
        assert!(!second.schema_changed);

        let third = h
            .pipeline
            .ingest(&RawFile::new("three.json", br#"[{"id": 3, "v": 1.5}]"#.to_vec()))
            .await
            .unwrap();
        assert!(third.schema_changed);

        let history = h.pipeline.schemas().history().await.unwrap();
        assert_eq!(history.len(), 2);
        let diff = history[1].diff_from_prev.clone().unwrap();
        assert!(diff.added.is_empty() && diff.removed.is_empty());
        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed["v"].from, TypeTag::String);
        assert_eq!(diff.changed["v"].to, TypeTag::Float);
    }

    #[tokio::test]
    async fn test_parse_error_aborts_before_writes() {
        let h = harness();
        let err = h
            .pipeline
            .ingest(&RawFile::new("broken.json", b"{\"a\":".to_vec()))
            .await
            .unwrap_err();

        match err {
            IngestionError::Parse { filename, format, .. } => {
                assert_eq!(filename, "broken.json");
                assert_eq!(format, crate::Format::Json);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(h.pipeline.registry().list().await.unwrap().is_empty());
        assert!(h.pipeline.schemas().latest().await.unwrap().is_none());
        assert!(h.archive.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch_is_registered_and_archived() {
        let h = harness();
        let outcome = h
            .pipeline
            .ingest(&RawFile::new("empty.json", b"[]".to_vec()))
            .await
            .unwrap();

        assert_eq!(outcome.inserted_count, 0);
        assert!(!outcome.duplicate);
        assert!(!outcome.schema_changed);
        assert!(h.pipeline.schemas().latest().await.unwrap().is_none());
        assert!(h.pipeline.registry().exists(&outcome.fingerprint).await.unwrap());
        assert_eq!(h.archive.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_extension_is_ingested_as_text() {
        let h = harness();
        let outcome = h
            .pipeline
            .ingest(&RawFile::new("notes.md", b"# hello".to_vec()))
            .await
            .unwrap();
        assert_eq!(outcome.inserted_count, 1);

        let docs = h.store.find_many("records", &Filter::new()).await.unwrap();
        assert_eq!(docs[0]["raw_text"], json!("# hello"));
        assert_eq!(docs[0]["length"], json!(7));
    }

    #[tokio::test]
    async fn test_oversized_upload_is_rejected() {
        let store = MemoryDocumentStore::new();
        let pipeline = IngestionPipeline::new(
            Arc::new(store),
            Arc::new(MemoryArchiveStore::new()),
            &CollectionsConfig::default(),
            PipelineConfig::default().with_max_document_size(4),
        );

        let err = pipeline
            .ingest(&RawFile::new("big.txt", b"too many bytes".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestionError::DocumentTooLarge { size: 14, max: 4 }));
    }

    #[tokio::test]
    async fn test_delete_unknown_fingerprint() {
        let h = harness();
        let report = h
            .pipeline
            .delete(Fingerprint::of(b"never seen").as_str())
            .await
            .unwrap();

        assert_eq!(report.records_deleted, 0);
        assert_eq!(report.registry_deleted, 0);
        assert!(!report.archive_deleted);
        assert!(report.is_complete());
        assert!(!report.removed_anything());
    }

    #[tokio::test]
    async fn test_delete_rejects_malformed_fingerprint() {
        let h = harness();
        h.pipeline.ingest(&RawFile::new("data.csv", DATA_CSV)).await.unwrap();

        for bad in ["", "abc", "not-a-fingerprint"] {
            let err = h.pipeline.delete(bad).await.unwrap_err();
            assert!(matches!(err, IngestionError::InvalidFingerprint(_)));
        }
        assert_eq!(h.archive.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_only_touches_its_own_file() {
        let h = harness();
        let keep = h.pipeline.ingest(&RawFile::new("keep.csv", b"x\n1\n2\n3\n".to_vec())).await.unwrap();
        let gone = h.pipeline.ingest(&RawFile::new("data.csv", DATA_CSV)).await.unwrap();

        let report = h
            .pipeline
            .delete(&gone.fingerprint.as_str().to_uppercase())
            .await
            .unwrap();
        assert_eq!(report.records_deleted, 2);

        assert_eq!(h.store.len("records").await, 3);
        assert!(h.pipeline.registry().exists(&keep.fingerprint).await.unwrap());
        assert_eq!(h.archive.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_archive_failure_is_reported_per_target() {
        let h = harness_with_archive(Arc::new(BrokenArchive));

        let err = h
            .pipeline
            .ingest(&RawFile::new("data.csv", DATA_CSV))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestionError::Archive(_)));

        let report = h
            .pipeline
            .delete(Fingerprint::of(DATA_CSV).as_str())
            .await
            .unwrap();
        assert_eq!(report.records_deleted, 2);
        assert_eq!(report.registry_deleted, 1);
        assert!(!report.archive_deleted);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].target, DeleteTarget::Archive);
        assert!(report.failures[0].message.contains("archive offline"));
    }

    #[tokio::test]
    async fn test_filesystem_archive_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let archive = FsArchiveStore::open(dir.path()).await.unwrap();
        let h = harness_with_archive(Arc::new(archive));

        let file = RawFile::new("report.xml", b"<r><row id=\"1\"/></r>".to_vec());
        let outcome = h.pipeline.ingest(&file).await.unwrap();

        let key = format!("{}_report.xml", outcome.fingerprint);
        assert!(dir.path().join(&key).is_file());
        assert_eq!(h.archive.get(&key).await.unwrap(), Some(file.content.clone()));

        let report = h.pipeline.delete(outcome.fingerprint.as_str()).await.unwrap();
        assert!(report.archive_deleted);
        assert!(!dir.path().join(&key).exists());
    }

    #[tokio::test]
    async fn test_ingest_many_keeps_going_after_errors() {
        let h = harness();
        let files = vec![
            RawFile::new("data.csv", DATA_CSV),
            RawFile::new("broken.xml", b"<a>".to_vec()),
            RawFile::new("log.txt", b"line one\nline two".to_vec()),
        ];

        let results = h.pipeline.ingest_many(&files).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0, "data.csv");
        assert_eq!(results[0].1.as_ref().unwrap().inserted_count, 2);
        assert!(results[1].1.is_err());
        assert_eq!(results[2].1.as_ref().unwrap().inserted_count, 1);
    }

    #[tokio::test]
    async fn test_raw_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        tokio::fs::write(&path, DATA_CSV).await.unwrap();

        let file = RawFile::from_file(&path).await.unwrap();
        assert_eq!(file.filename, "data.csv");
        assert_eq!(file.content, DATA_CSV);
    }
}
