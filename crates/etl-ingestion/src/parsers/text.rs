use std::borrow::Cow;
use tracing::{debug, warn};

use etl_core::{Node, Scalar};

use super::{Format, FormatParser, ParseResult};

/// Decode bytes as UTF-8, honouring a byte-order mark and replacing
/// undecodable sequences with U+FFFD
pub(crate) fn decode_lossy(content: &[u8]) -> Cow<'_, str> {
    let (text, encoding, had_errors) = encoding_rs::UTF_8.decode(content);
    if had_errors {
        warn!(
            encoding = %encoding.name(),
            size = content.len(),
            "Replaced undecodable bytes while decoding text"
        );
    }
    text
}

/// Plain text parser, also the fallback for unknown extensions
#[derive(Debug, Default)]
pub struct TextParser;

impl TextParser {
    pub fn new() -> Self {
        Self
    }
}

impl FormatParser for TextParser {
    fn parse(&self, content: &[u8]) -> ParseResult<Vec<Node>> {
        let text = decode_lossy(content);
        let length = text.chars().count();

        debug!(size = content.len(), length = length, "Decoded plain text");

        Ok(vec![Node::map([
            ("raw_text", Node::string(text)),
            ("length", Node::Scalar(Scalar::Integer(length as i64))),
        ])])
    }

    fn format(&self) -> Format {
        Format::Text
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["txt", "log"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_text_record() {
        let records = TextParser::new().parse("héllo\nworld".as_bytes()).unwrap();

        assert_eq!(
            records,
            vec![Node::map([
                ("raw_text", Node::string("héllo\nworld")),
                ("length", Node::Scalar(Scalar::Integer(11))),
            ])]
        );
    }

    #[test]
    fn test_invalid_bytes_are_tolerated() {
        let records = TextParser::new().parse(b"ok\xff\xfe!").unwrap();
        let map = records[0].as_map().unwrap();

        match &map["raw_text"] {
            Node::Scalar(Scalar::String(text)) => {
                assert!(text.starts_with("ok"));
                assert!(text.ends_with('!'));
            }
            other => panic!("unexpected raw_text {:?}", other),
        }
    }

    #[test]
    fn test_byte_order_mark_is_stripped() {
        let text = decode_lossy(b"\xef\xbb\xbfhello");
        assert_eq!(text, "hello");
    }

    #[test]
    fn test_empty_input() {
        let records = TextParser::new().parse(b"").unwrap();
        let map = records[0].as_map().unwrap();
        assert_eq!(map["length"], Node::Scalar(Scalar::Integer(0)));
    }
}
