use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Field every stored record carries, pointing back at its source file.
pub const FILE_HASH_FIELD: &str = "_file_hash";

/// A JSON object, the unit the document store deals in.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Content fingerprint: lowercase hex SHA-256 of the raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Length of the hex encoding of a 256-bit digest
    pub const HEX_LEN: usize = 64;

    /// Compute the fingerprint of raw content
    pub fn of(content: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content);
        Self(hex::encode(hasher.finalize()))
    }

    /// Parse a user-supplied fingerprint, normalising case and whitespace
    pub fn parse(value: &str) -> Result<Self, InvalidFingerprint> {
        let normalized = value.trim().to_ascii_lowercase();
        if normalized.len() != Self::HEX_LEN || !normalized.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(InvalidFingerprint(value.to_string()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First few characters, for display
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid fingerprint {0:?}: expected {len} hexadecimal characters", len = Fingerprint::HEX_LEN)]
pub struct InvalidFingerprint(pub String);

/// Leaf value of a parsed record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl Scalar {
    /// Replace not-a-number floats with an explicit null
    pub fn sanitize(self) -> Self {
        match self {
            Scalar::Float(f) if f.is_nan() => Scalar::Null,
            other => other,
        }
    }

    pub fn type_tag(&self) -> TypeTag {
        match self {
            Scalar::Null => TypeTag::Null,
            Scalar::Bool(_) => TypeTag::Boolean,
            Scalar::Integer(_) => TypeTag::Integer,
            Scalar::Float(_) => TypeTag::Float,
            Scalar::String(_) => TypeTag::String,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Scalar::Null => serde_json::Value::Null,
            Scalar::Bool(b) => serde_json::Value::Bool(*b),
            Scalar::Integer(i) => serde_json::Value::from(*i),
            Scalar::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Scalar::String(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::String(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::String(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Integer(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<&serde_json::Number> for Scalar {
    fn from(n: &serde_json::Number) -> Self {
        if let Some(i) = n.as_i64() {
            Scalar::Integer(i)
        } else {
            n.as_f64().map(Scalar::Float).unwrap_or(Scalar::Null)
        }
    }
}

pub type NodeMap = BTreeMap<String, Node>;

/// Parsed, still-nested record tree produced by the format parsers
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Scalar(Scalar),
    Sequence(Vec<Node>),
    Map(NodeMap),
}

impl Node {
    pub fn null() -> Self {
        Node::Scalar(Scalar::Null)
    }

    pub fn string(value: impl Into<String>) -> Self {
        Node::Scalar(Scalar::String(value.into()))
    }

    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Node)>,
    {
        Node::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn as_map(&self) -> Option<&NodeMap> {
        match self {
            Node::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl From<Scalar> for Node {
    fn from(value: Scalar) -> Self {
        Node::Scalar(value)
    }
}

impl From<serde_json::Value> for Node {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Node::null(),
            serde_json::Value::Bool(b) => Node::Scalar(Scalar::Bool(b)),
            serde_json::Value::Number(n) => Node::Scalar(Scalar::from(&n)),
            serde_json::Value::String(s) => Node::Scalar(Scalar::String(s)),
            serde_json::Value::Array(items) => {
                Node::Sequence(items.into_iter().map(Node::from).collect())
            }
            serde_json::Value::Object(obj) => {
                Node::Map(obj.into_iter().map(|(k, v)| (k, Node::from(v))).collect())
            }
        }
    }
}

/// Single-level record keyed by dotted paths
pub type FlatRecord = BTreeMap<String, Scalar>;

/// A flattened record tagged with the fingerprint of the file it came from
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub fields: FlatRecord,
    pub fingerprint: Fingerprint,
}

impl Record {
    pub fn new(mut fields: FlatRecord, fingerprint: Fingerprint) -> Self {
        fields.insert(
            FILE_HASH_FIELD.to_string(),
            Scalar::String(fingerprint.to_string()),
        );
        Self { fields, fingerprint }
    }

    pub fn to_document(&self) -> Document {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect()
    }
}

/// Registry entry written once per distinct content fingerprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestedFile {
    pub fingerprint: Fingerprint,
    pub filename: String,
    #[serde(with = "timestamp")]
    pub ingested_at: DateTime<Utc>,
}

/// Closed set of inferred field types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    String,
    Integer,
    Float,
    Boolean,
    Null,
    Mixed,
}

impl TypeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeTag::String => "string",
            TypeTag::Integer => "integer",
            TypeTag::Float => "float",
            TypeTag::Boolean => "boolean",
            TypeTag::Null => "null",
            TypeTag::Mixed => "mixed",
        }
    }
}

impl std::fmt::Display for TypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field path to type tag
pub type Schema = BTreeMap<String, TypeTag>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeChange {
    pub from: TypeTag,
    pub to: TypeTag,
}

/// Structural difference between two schemas
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDiff {
    #[serde(default)]
    pub added: Schema,
    #[serde(default)]
    pub removed: Schema,
    #[serde(default)]
    pub changed: BTreeMap<String, TypeChange>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// Total number of affected fields
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.changed.len()
    }
}

/// One entry of the append-only schema log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaVersion {
    #[serde(with = "timestamp")]
    pub version_ts: DateTime<Utc>,
    pub schema: Schema,
    pub diff_from_prev: Option<SchemaDiff>,
}

/// Fixed-width RFC 3339 timestamps, so that string order is time order
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = Fingerprint::of(b"name,age\nalice,30\n");
        let b = Fingerprint::of(b"name,age\nalice,30\n");
        let c = Fingerprint::of(b"name,age\nbob,41\n");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), Fingerprint::HEX_LEN);
        assert!(a.as_str().chars().all(|ch| ch.is_ascii_digit() || ('a'..='f').contains(&ch)));
    }

    #[test]
    fn test_fingerprint_known_digest() {
        assert_eq!(
            Fingerprint::of(b"").as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_fingerprint_short_prefix() {
        let fp = Fingerprint::of(b"");
        assert_eq!(fp.short(), "e3b0c44298fc");
        assert!(fp.as_str().starts_with(fp.short()));
    }

    #[test]
    fn test_fingerprint_parse() {
        let fp = Fingerprint::of(b"hello");
        let upper = format!("  {}  ", fp.as_str().to_uppercase());

        assert_eq!(Fingerprint::parse(&upper).unwrap(), fp);
        assert!(Fingerprint::parse("").is_err());
        assert!(Fingerprint::parse("abc123").is_err());
        assert!(Fingerprint::parse(&"z".repeat(64)).is_err());
    }

    #[test]
    fn test_scalar_sanitize() {
        assert_eq!(Scalar::Float(f64::NAN).sanitize(), Scalar::Null);
        assert_eq!(Scalar::Float(1.5).sanitize(), Scalar::Float(1.5));
        assert_eq!(Scalar::from("x").sanitize(), Scalar::from("x"));
    }

    #[test]
    fn test_scalar_type_tags() {
        assert_eq!(Scalar::Null.type_tag(), TypeTag::Null);
        assert_eq!(Scalar::Bool(true).type_tag(), TypeTag::Boolean);
        assert_eq!(Scalar::Integer(3).type_tag(), TypeTag::Integer);
        assert_eq!(Scalar::Float(0.5).type_tag(), TypeTag::Float);
        assert_eq!(Scalar::from("a").type_tag(), TypeTag::String);
    }

    #[test]
    fn test_node_from_json() {
        let node = Node::from(serde_json::json!({"a": [1, 2.5, null], "b": {"c": true}}));

        let expected = Node::map([
            (
                "a",
                Node::Sequence(vec![
                    Node::Scalar(Scalar::Integer(1)),
                    Node::Scalar(Scalar::Float(2.5)),
                    Node::null(),
                ]),
            ),
            ("b", Node::map([("c", Node::Scalar(Scalar::Bool(true)))])),
        ]);
        assert_eq!(node, expected);
    }

    #[test]
    fn test_record_document_carries_file_hash() {
        let fp = Fingerprint::of(b"data");
        let mut fields = FlatRecord::new();
        fields.insert("name".to_string(), Scalar::from("alice"));
        let record = Record::new(fields, fp.clone());

        let doc = record.to_document();
        assert_eq!(doc["name"], serde_json::json!("alice"));
        assert_eq!(doc[FILE_HASH_FIELD], serde_json::json!(fp.as_str()));
    }

    #[test]
    fn test_schema_version_serialization() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut schema = Schema::new();
        schema.insert("age".to_string(), TypeTag::Integer);
        let version = SchemaVersion {
            version_ts: ts,
            schema,
            diff_from_prev: None,
        };

        let value = serde_json::to_value(&version).unwrap();
        assert_eq!(value["version_ts"], "2024-05-01T12:00:00.000000Z");
        assert_eq!(value["schema"]["age"], "integer");

        let back: SchemaVersion = serde_json::from_value(value).unwrap();
        assert_eq!(back, version);
    }
}
