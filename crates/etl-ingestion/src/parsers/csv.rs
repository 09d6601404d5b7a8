use std::collections::HashSet;
use tracing::debug;

use etl_core::{Node, Scalar};

use super::{Format, FormatParser, ParseError, ParseResult};

/// Cell values read as missing
const NA_VALUES: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// CSV parser with a header row; one record per data row
#[derive(Debug)]
pub struct CsvParser {
    delimiter: u8,
}

impl CsvParser {
    pub fn new() -> Self {
        Self { delimiter: b',' }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Name blank headers by position and suffix repeated ones with `.n`
    fn column_names(raw: &csv::StringRecord) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut names = Vec::with_capacity(raw.len());

        for (index, header) in raw.iter().enumerate() {
            let base = if header.trim().is_empty() {
                format!("Unnamed: {}", index)
            } else {
                header.to_string()
            };

            let mut name = base.clone();
            let mut suffix = 1;
            while seen.contains(&name) {
                name = format!("{}.{}", base, suffix);
                suffix += 1;
            }
            seen.insert(name.clone());
            names.push(name);
        }

        names
    }
}

impl Default for CsvParser {
    fn default() -> Self {
        Self::new()
    }
}

fn is_missing(cell: &str) -> bool {
    NA_VALUES.contains(&cell) || cell.trim().is_empty()
}

/// Type shared by every non-missing cell of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Integer,
    Float,
    Boolean,
    Text,
}

impl ColumnKind {
    fn of_cell(cell: &str) -> Self {
        let trimmed = cell.trim();
        if trimmed.parse::<i64>().is_ok() {
            return Self::Integer;
        }
        // Rejects "inf" and friends, which f64 would otherwise accept
        if trimmed.chars().any(|c| c.is_ascii_digit()) && trimmed.parse::<f64>().is_ok() {
            return Self::Float;
        }
        if trimmed.eq_ignore_ascii_case("true") || trimmed.eq_ignore_ascii_case("false") {
            return Self::Boolean;
        }
        Self::Text
    }

    fn widen(self, other: Self) -> Self {
        use ColumnKind::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Integer, Float) | (Float, Integer) => Float,
            _ => Text,
        }
    }

    /// Infer the kind of a whole column, `None` when every cell is missing
    fn infer<'a>(cells: impl IntoIterator<Item = &'a str>) -> Option<Self> {
        cells
            .into_iter()
            .filter(|cell| !is_missing(cell))
            .map(Self::of_cell)
            .reduce(Self::widen)
    }

    fn convert(self, cell: &str) -> Scalar {
        if is_missing(cell) {
            return Scalar::Null;
        }
        let trimmed = cell.trim();
        let typed = match self {
            Self::Integer => trimmed.parse::<i64>().ok().map(Scalar::Integer),
            Self::Float => trimmed.parse::<f64>().ok().map(|f| Scalar::Float(f).sanitize()),
            Self::Boolean => Some(Scalar::Bool(trimmed.eq_ignore_ascii_case("true"))),
            Self::Text => None,
        };
        typed.unwrap_or_else(|| Scalar::String(cell.to_string()))
    }
}

impl FormatParser for CsvParser {
    fn parse(&self, content: &[u8]) -> ParseResult<Vec<Node>> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(content);

        let headers = reader.headers()?.clone();
        if headers.is_empty() {
            return Err(ParseError::Malformed("no columns to parse from file".to_string()));
        }
        let columns = Self::column_names(&headers);

        let mut rows = Vec::new();
        for row in reader.records() {
            let row = row?;
            if row.len() > columns.len() {
                let line = row.position().map(|p| p.line()).unwrap_or_default();
                return Err(ParseError::Malformed(format!(
                    "expected {} fields on line {}, saw {}",
                    columns.len(),
                    line,
                    row.len()
                )));
            }
            rows.push(row);
        }

        let kinds: Vec<Option<ColumnKind>> = (0..columns.len())
            .map(|i| ColumnKind::infer(rows.iter().filter_map(|row| row.get(i))))
            .collect();

        let records: Vec<Node> = rows
            .iter()
            .map(|row| {
                Node::map(columns.iter().zip(&kinds).enumerate().map(|(i, (column, kind))| {
                    let value = match (row.get(i), kind) {
                        (Some(cell), Some(kind)) => kind.convert(cell),
                        _ => Scalar::Null,
                    };
                    (column.clone(), Node::Scalar(value))
                }))
            })
            .collect();

        debug!(columns = columns.len(), records = records.len(), "Parsed CSV");
        Ok(records)
    }

    fn format(&self) -> Format {
        Format::Csv
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["csv"]
    }
}
