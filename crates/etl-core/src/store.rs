//! Store boundary: the document store and the raw-bytes archive.
//!
//! Both are consumed as opaque collaborators. Backends live in `etl-infra`;
//! the ingestion pipeline only sees these traits.

use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;

use crate::error::StoreResult;
use crate::types::{Document, Fingerprint};

/// Conjunction of field-equality conditions. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter on a single field
    pub fn by(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new().and_eq(field, value)
    }

    pub fn and_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions
            .iter()
            .all(|(field, expected)| doc.get(field) == Some(expected))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Single-field sort
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub order: SortOrder,
}

impl Sort {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Ascending,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Descending,
        }
    }

    /// Compare two documents on the sort field, honouring the direction
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        let ordering = compare_values(a.get(&self.field), b.get(&self.field));
        match self.order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    }
}

/// Total order over optional JSON values: missing < null < bool < number < string < other
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::Bool(_)) => 2,
            Some(Value::Number(_)) => 3,
            Some(Value::String(_)) => 4,
            Some(_) => 5,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Document store consumed by the pipeline
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert documents, returning how many were written
    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> StoreResult<u64>;

    /// Insert a single document
    async fn insert_one(&self, collection: &str, doc: Document) -> StoreResult<()> {
        self.insert_many(collection, vec![doc]).await.map(|_| ())
    }

    /// Delete every matching document, returning how many were removed
    async fn delete_many(&self, collection: &str, filter: &Filter) -> StoreResult<u64>;

    /// First matching document, optionally after sorting
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
    ) -> StoreResult<Option<Document>>;

    /// All matching documents in insertion order
    async fn find_many(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Document>>;

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        Ok(self.find_many(collection, filter).await?.len() as u64)
    }

    /// Backend name, for logs
    fn name(&self) -> &'static str;
}

/// Content-addressable archive of raw uploads
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Persist raw bytes under `archive_key(fingerprint, filename)`
    async fn put(&self, fingerprint: &Fingerprint, filename: &str, content: &[u8]) -> StoreResult<String>;

    /// Remove every entry whose key starts with the fingerprint; true if any was removed
    async fn delete_by_prefix(&self, fingerprint: &Fingerprint) -> StoreResult<bool>;

    /// All stored keys, sorted
    async fn list(&self) -> StoreResult<Vec<String>>;

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    fn name(&self) -> &'static str;
}

/// Archive key for an upload. Path separators in the filename are replaced so
/// the key is always a single flat name.
pub fn archive_key(fingerprint: &Fingerprint, filename: &str) -> String {
    let safe: String = filename
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    format!("{}_{}", fingerprint, safe)
}
