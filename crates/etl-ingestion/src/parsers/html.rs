use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use etl_core::{Node, NodeMap};

use super::text::decode_lossy;
use super::{Format, FormatParser, ParseError, ParseResult};

/// Elements whose contents never count as visible text
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

const HEADING_LEVELS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

/// HTML parser
///
/// Produces one record with the fixed keys `title`, `meta`, `headings`,
/// `links`, `paragraphs`, `tables` and `raw_text`.
#[derive(Debug, Default)]
pub struct HtmlParser;

impl HtmlParser {
    pub fn new() -> Self {
        Self
    }
}

fn selector(css: &str) -> ParseResult<Selector> {
    Selector::parse(css).map_err(|e| ParseError::Html(format!("bad selector {:?}: {}", css, e)))
}

/// Text of an element: pieces trimmed, empty pieces dropped, joined with a space
fn element_text(element: ElementRef<'_>) -> String {
    join_pieces(element.text())
}

fn join_pieces<'a>(pieces: impl Iterator<Item = &'a str>) -> String {
    pieces
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Visible text of the whole document
fn visible_text(document: &Html) -> String {
    let pieces = document.root_element().descendants().filter_map(|node| {
        let text = node.value().as_text()?;
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map_or(false, |element| HIDDEN_ELEMENTS.contains(&element.name()))
        });
        (!hidden).then_some(&**text)
    });
    join_pieces(pieces)
}

impl FormatParser for HtmlParser {
    fn parse(&self, content: &[u8]) -> ParseResult<Vec<Node>> {
        let source = decode_lossy(content);
        let document = Html::parse_document(&source);

        let title = document
            .select(&selector("title")?)
            .next()
            .map(|t| Node::string(element_text(t)))
            .unwrap_or_else(Node::null);

        let mut meta = NodeMap::new();
        for element in document.select(&selector("meta[name]")?) {
            let attrs = element.value();
            if let Some(name) = attrs.attr("name").filter(|n| !n.is_empty()) {
                let content = attrs.attr("content").map(Node::string).unwrap_or_else(Node::null);
                meta.insert(name.to_string(), content);
            }
        }

        // One entry per level; a repeated level keeps its last heading
        let mut headings = NodeMap::new();
        for element in document.select(&selector(&HEADING_LEVELS.join(","))?) {
            headings.insert(
                element.value().name().to_string(),
                Node::string(element_text(element)),
            );
        }

        let links = document
            .select(&selector("a[href]")?)
            .filter_map(|a| a.value().attr("href"))
            .map(Node::string)
            .collect();

        let paragraphs = document
            .select(&selector("p")?)
            .map(|p| Node::string(element_text(p)))
            .collect();

        let row_selector = selector("tr")?;
        let cell_selector = selector("td, th")?;
        let tables: Vec<Node> = document
            .select(&selector("table")?)
            .map(|table| {
                let rows = table
                    .select(&row_selector)
                    .map(|row| {
                        Node::Sequence(
                            row.select(&cell_selector)
                                .map(|cell| Node::string(element_text(cell)))
                                .collect(),
                        )
                    })
                    .collect();
                Node::Sequence(rows)
            })
            .collect();

        debug!(
            headings = headings.len(),
            tables = tables.len(),
            "Parsed HTML document"
        );

        Ok(vec![Node::map([
            ("title", title),
            ("meta", Node::Map(meta)),
            ("headings", Node::Map(headings)),
            ("links", Node::Sequence(links)),
            ("paragraphs", Node::Sequence(paragraphs)),
            ("tables", Node::Sequence(tables)),
            ("raw_text", Node::string(visible_text(&document))),
        ])])
    }

    fn format(&self) -> Format {
        Format::Html
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["html", "htm"]
    }
}
