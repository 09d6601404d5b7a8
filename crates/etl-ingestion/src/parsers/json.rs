use serde_json::Value;
use tracing::debug;

use etl_core::Node;

use super::{Format, FormatParser, ParseError, ParseResult};

/// JSON parser
///
/// A top-level object is one record, a top-level array yields its elements
/// as-is, and any other value is wrapped under a synthetic `value` key.
#[derive(Debug, Default)]
pub struct JsonParser;

impl JsonParser {
    pub fn new() -> Self {
        Self
    }
}

/// Parse a JSON document, honouring a UTF-8 or UTF-16 byte-order mark
fn parse_value(content: &[u8]) -> ParseResult<Value> {
    match encoding_rs::Encoding::for_bom(content) {
        None => Ok(serde_json::from_slice(content)?),
        Some((encoding, bom_len)) if encoding == encoding_rs::UTF_8 => {
            Ok(serde_json::from_slice(&content[bom_len..])?)
        }
        Some((encoding, _)) => {
            let (text, had_errors) = encoding.decode_with_bom_removal(content);
            if had_errors {
                return Err(ParseError::Malformed(format!(
                    "invalid {} text",
                    encoding.name()
                )));
            }
            Ok(serde_json::from_str(&text)?)
        }
    }
}

impl FormatParser for JsonParser {
    fn parse(&self, content: &[u8]) -> ParseResult<Vec<Node>> {
        let parsed = parse_value(content)?;

        let records = match parsed {
            Value::Object(_) => vec![Node::from(parsed)],
            Value::Array(items) => items.into_iter().map(Node::from).collect(),
            scalar => vec![Node::map([("value", Node::from(scalar))])],
        };

        debug!(records = records.len(), "Parsed JSON");
        Ok(records)
    }

    fn format(&self) -> Format {
        Format::Json
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["json"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use etl_core::Scalar;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_object_is_single_record() {
        let records = JsonParser::new().parse(br#"{"a": 1, "b": {"c": "x"}}"#).unwrap();

        assert_eq!(records.len(), 1);
        let map = records[0].as_map().unwrap();
        assert_eq!(map["a"], Node::Scalar(Scalar::Integer(1)));
        assert_eq!(map["b"], Node::map([("c", Node::string("x"))]));
    }

    #[test]
    fn test_array_yields_elements() {
        let records = JsonParser::new()
            .parse(br#"[{"id": 1}, {"id": 2}, 3]"#)
            .unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[2], Node::Scalar(Scalar::Integer(3)));
    }

    #[test]
    fn test_scalar_is_wrapped() {
        let records = JsonParser::new().parse(b"\"hello\"").unwrap();
        assert_eq!(records, vec![Node::map([("value", Node::string("hello"))])]);

        let records = JsonParser::new().parse(b"null").unwrap();
        assert_eq!(records, vec![Node::map([("value", Node::null())])]);
    }

    #[test]
    fn test_byte_order_mark_is_skipped() {
        let records = JsonParser::new().parse(b"\xEF\xBB\xBF{\"a\": 1}").unwrap();
        assert_eq!(records, vec![Node::map([("a", Node::Scalar(Scalar::Integer(1)))])]);

        let utf16: Vec<u8> = [0xFF, 0xFE]
            .into_iter()
            .chain("{\"a\": \"\u{e9}\"}".encode_utf16().flat_map(u16::to_le_bytes))
            .collect();
        let records = JsonParser::new().parse(&utf16).unwrap();
        assert_eq!(records, vec![Node::map([("a", Node::string("\u{e9}"))])]);
    }

    #[test]
    fn test_malformed_json() {
        let err = JsonParser::new().parse(b"{\"a\": ").unwrap_err();
        assert!(matches!(err, ParseError::Json(_)));
    }
}
