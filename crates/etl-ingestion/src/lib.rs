//! Ingestion pipeline for Dynamic-ETL
//!
//! Turns uploaded files into flat, typed records in a document store while
//! tracking the shape of the data over time.
//!
//! # Features
//!
//! - Format-aware parsing (JSON, CSV, XML, HTML, plain text)
//! - Recursive flattening of nested structures into dotted paths
//! - Content deduplication by SHA-256 fingerprint
//! - Append-only schema history with structural diffs
//! - Cascading delete of records, registry entry and archived bytes

pub mod flatten;
pub mod parsers;
pub mod pipeline;
pub mod registry;
pub mod schema;

// Re-exports
pub use flatten::{flatten, flatten_all};
pub use parsers::{
    CsvParser, Format, FormatParser, HtmlParser, JsonParser, ParseError, ParserRegistry,
    TextParser, XmlParser,
};
pub use pipeline::{
    DeleteFailure, DeleteReport, DeleteTarget, IngestOutcome, IngestStage, IngestionPipeline,
    RawFile,
};
pub use registry::DuplicateRegistry;
pub use schema::SchemaRegistry;

use etl_core::{InvalidFingerprint, StoreError};

/// Error types for ingestion operations
#[derive(Debug, thiserror::Error)]
pub enum IngestionError {
    #[error("Failed to parse {filename} as {format}: {source}")]
    Parse {
        filename: String,
        format: Format,
        #[source]
        source: ParseError,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Archive error: {0}")]
    Archive(#[source] StoreError),

    #[error(transparent)]
    InvalidFingerprint(#[from] InvalidFingerprint),

    #[error("Document too large: {size} bytes (max {max})")]
    DocumentTooLarge { size: usize, max: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IngestionError>;
