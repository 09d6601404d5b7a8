//! Format parsers
//!
//! Each parser turns raw bytes into an ordered sequence of record trees. The
//! registry picks one by lower-cased file extension and falls back to plain
//! text for anything it does not recognise.

mod csv;
mod html;
mod json;
mod text;
mod xml;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use etl_core::Node;

pub use self::csv::CsvParser;
pub use self::html::HtmlParser;
pub use self::json::JsonParser;
pub use self::text::TextParser;
pub use self::xml::XmlParser;

/// Supported input formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Json,
    Csv,
    Xml,
    Html,
    Text,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Csv => "csv",
            Format::Xml => "xml",
            Format::Html => "html",
            Format::Text => "text",
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lower-cased text after the last `.` of the filename (the whole name if it has none)
pub fn detect_extension(filename: &str) -> String {
    filename
        .rsplit('.')
        .next()
        .unwrap_or(filename)
        .to_lowercase()
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid CSV: {0}")]
    Csv(#[from] ::csv::Error),

    #[error("invalid XML: {0}")]
    Xml(String),

    #[error("invalid HTML: {0}")]
    Html(String),

    #[error("{0}")]
    Malformed(String),
}

impl From<quick_xml::Error> for ParseError {
    fn from(err: quick_xml::Error) -> Self {
        ParseError::Xml(err.to_string())
    }
}

pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// Trait for format parsers
pub trait FormatParser: Send + Sync {
    /// Parse raw content into record trees
    fn parse(&self, content: &[u8]) -> ParseResult<Vec<Node>>;

    fn format(&self) -> Format;

    /// Lower-case file extensions this parser claims
    fn extensions(&self) -> &'static [&'static str];

    fn can_handle(&self, extension: &str) -> bool {
        self.extensions().contains(&extension)
    }
}

/// Registry of format parsers
pub struct ParserRegistry {
    parsers: Vec<Arc<dyn FormatParser>>,
    fallback: Arc<dyn FormatParser>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
            fallback: Arc::new(TextParser::new()),
        }
    }

    /// Create with the built-in parsers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(JsonParser::new()));
        registry.register(Arc::new(CsvParser::new()));
        registry.register(Arc::new(XmlParser::new()));
        registry.register(Arc::new(HtmlParser::new()));
        registry.register(Arc::new(TextParser::new()));
        registry
    }

    pub fn register(&mut self, parser: Arc<dyn FormatParser>) {
        self.parsers.push(parser);
    }

    /// Parser for a file extension, falling back to plain text
    pub fn get_by_extension(&self, extension: &str) -> Arc<dyn FormatParser> {
        let extension = extension.to_lowercase();
        self.parsers
            .iter()
            .find(|p| p.can_handle(&extension))
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }

    pub fn get_by_filename(&self, filename: &str) -> Arc<dyn FormatParser> {
        self.get_by_extension(&detect_extension(filename))
    }

    /// Formats of all registered parsers
    pub fn list(&self) -> Vec<Format> {
        self.parsers.iter().map(|p| p.format()).collect()
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
