use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

use etl_core::{Node, NodeMap};

use super::{Format, FormatParser, ParseError, ParseResult};

/// XML parser
///
/// The root element becomes a single record. Attributes are keyed `@name`,
/// child elements are grouped by tag into lists (always a list, even for a
/// single child), and the text before the first child is kept as `#text`.
#[derive(Debug, Default)]
pub struct XmlParser;

impl XmlParser {
    pub fn new() -> Self {
        Self
    }
}

/// An element whose end tag has not been reached yet
#[derive(Default)]
struct Frame {
    name: String,
    fields: NodeMap,
    leading_text: String,
    has_children: bool,
}

impl Frame {
    fn open<R>(reader: &Reader<R>, start: &BytesStart<'_>) -> ParseResult<Self> {
        let decoder = reader.decoder();
        let name = decoder
            .decode(start.name().as_ref())
            .map_err(|e| ParseError::Xml(e.to_string()))?
            .into_owned();

        let mut fields = NodeMap::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| ParseError::Xml(e.to_string()))?;
            let key = decoder
                .decode(attr.key.as_ref())
                .map_err(|e| ParseError::Xml(e.to_string()))?;
            let value = attr
                .unescape_value()
                .map_err(|e| ParseError::Xml(e.to_string()))?;
            fields.insert(format!("@{}", key), Node::string(value));
        }

        Ok(Self {
            name,
            fields,
            ..Default::default()
        })
    }

    fn push_text(&mut self, text: &str) {
        if !self.has_children {
            self.leading_text.push_str(text);
        }
    }

    fn push_child(&mut self, name: String, child: Node) {
        self.has_children = true;
        match self
            .fields
            .entry(name)
            .or_insert_with(|| Node::Sequence(Vec::new()))
        {
            Node::Sequence(items) => items.push(child),
            // An attribute can't collide: its key always starts with '@'
            other => *other = Node::Sequence(vec![child]),
        }
    }

    fn close(mut self) -> (String, Node) {
        let text = self.leading_text.trim();
        if !text.is_empty() {
            self.fields.insert("#text".to_string(), Node::string(text));
        }
        (self.name, Node::Map(self.fields))
    }
}

impl FormatParser for XmlParser {
    fn parse(&self, content: &[u8]) -> ParseResult<Vec<Node>> {
        let mut reader = Reader::from_reader(content);
        let mut buf = Vec::new();
        let mut stack: Vec<Frame> = Vec::new();
        let mut root: Option<Node> = None;

        loop {
            let event = reader.read_event_into(&mut buf)?;
            match event {
                Event::Start(ref start) => {
                    if root.is_some() {
                        return Err(ParseError::Xml("content after the root element".to_string()));
                    }
                    stack.push(Frame::open(&reader, start)?);
                }
                Event::Empty(ref start) => {
                    if root.is_some() {
                        return Err(ParseError::Xml("content after the root element".to_string()));
                    }
                    let (name, node) = Frame::open(&reader, start)?.close();
                    match stack.last_mut() {
                        Some(parent) => parent.push_child(name, node),
                        None => root = Some(node),
                    }
                }
                Event::End(_) => {
                    let frame = stack
                        .pop()
                        .ok_or_else(|| ParseError::Xml("unexpected closing tag".to_string()))?;
                    let (name, node) = frame.close();
                    match stack.last_mut() {
                        Some(parent) => parent.push_child(name, node),
                        None => root = Some(node),
                    }
                }
                Event::Text(ref text) => {
                    let text = text.unescape().map_err(|e| ParseError::Xml(e.to_string()))?;
                    match stack.last_mut() {
                        Some(frame) => frame.push_text(&text),
                        None if text.trim().is_empty() => {}
                        None => {
                            return Err(ParseError::Xml("text outside the root element".to_string()))
                        }
                    }
                }
                Event::CData(ref data) => {
                    if let Some(frame) = stack.last_mut() {
                        frame.push_text(&String::from_utf8_lossy(data));
                    }
                }
                Event::Eof => break,
                // Declarations, comments, processing instructions and doctypes carry no data
                _ => {}
            }
            buf.clear();
        }

        if let Some(open) = stack.last() {
            return Err(ParseError::Xml(format!(
                "unexpected end of document inside <{}>",
                open.name
            )));
        }

        let root = root.ok_or_else(|| ParseError::Xml("no root element".to_string()))?;
        debug!("Parsed XML document");
        Ok(vec![root])
    }

    fn format(&self) -> Format {
        Format::Xml
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["xml"]
    }
}
