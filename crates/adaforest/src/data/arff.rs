//! Attribute-relation (ARFF) text format.
//!
//! Only the dense subset is supported:
//!
//! ```text
//! % comment
//! @relation weather
//! @attribute temperature numeric
//! @attribute outlook {sunny, rainy}
//! @attribute play {yes, no}
//! @data
//! 21.5,sunny,yes
//! ```
//!
//! The format is used to re-ingest a consolidated window of batches and as
//! the file format of the batch-log driver.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use super::record::unquote;
use super::{Attribute, BatchStats, DataError, Record, RecordStream, Schema};

// =============================================================================
// Header parsing
// =============================================================================

/// Parse the header of an ARFF document.
///
/// Returns the schema and the 0-based line index of the first data line.
fn parse_header(lines: &[&str], class_index: Option<usize>) -> Result<(Schema, usize), DataError> {
    let mut relation = String::new();
    let mut attributes = Vec::new();

    for (i, raw) in lines.iter().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('%') {
            continue;
        }
        let lower = line.to_ascii_lowercase();
        if lower.starts_with("@relation") {
            relation = unquote(line["@relation".len()..].trim()).to_string();
        } else if lower.starts_with("@attribute") {
            attributes.push(parse_attribute(&line["@attribute".len()..], i + 1)?);
        } else if lower.starts_with("@data") {
            let schema = Schema::new(relation, attributes, class_index)?;
            return Ok((schema, i + 1));
        } else {
            return Err(DataError::InvalidHeader {
                line: i + 1,
                message: format!("unexpected line `{}`", line),
            });
        }
    }

    Err(DataError::InvalidHeader {
        line: lines.len(),
        message: "missing @data section".to_string(),
    })
}

fn parse_attribute(rest: &str, line: usize) -> Result<Attribute, DataError> {
    let rest = rest.trim();
    let (name, ty) = split_name(rest).ok_or_else(|| DataError::InvalidHeader {
        line,
        message: format!("cannot read attribute `{}`", rest),
    })?;

    if let Some(body) = ty.strip_prefix('{') {
        let body = body.strip_suffix('}').ok_or_else(|| DataError::InvalidHeader {
            line,
            message: format!("unterminated domain for attribute `{}`", name),
        })?;
        let domain = body
            .split(',')
            .map(|v| unquote(v.trim()).to_string())
            .filter(|v| !v.is_empty());
        return Ok(Attribute::categorical(name, domain));
    }

    match ty.to_ascii_lowercase().as_str() {
        "numeric" | "real" | "integer" => Ok(Attribute::numeric(name)),
        other => Err(DataError::InvalidHeader {
            line,
            message: format!("unsupported type `{}` for attribute `{}`", other, name),
        }),
    }
}

/// Split `name type` where the name may be quoted.
fn split_name(s: &str) -> Option<(String, &str)> {
    let first = s.chars().next()?;
    if first == '\'' || first == '"' {
        let end = s[1..].find(first)? + 1;
        Some((s[1..end].to_string(), s[end + 1..].trim()))
    } else {
        let end = s.find(char::is_whitespace)?;
        Some((s[..end].to_string(), s[end..].trim()))
    }
}

fn split_row(line: &str) -> Vec<&str> {
    line.split(',').map(str::trim).collect()
}

// =============================================================================
// Stream
// =============================================================================

/// A [`RecordStream`] over an ARFF document held in memory.
#[derive(Debug, Clone)]
pub struct ArffStream {
    schema: Arc<Schema>,
    /// `(1-based line number, row text)` of each data row.
    rows: Vec<(usize, String)>,
    cursor: usize,
}

impl ArffStream {
    /// Parse `content`. `class_index = None` selects the last attribute.
    pub fn from_string(content: &str, class_index: Option<usize>) -> Result<Self, DataError> {
        let lines: Vec<&str> = content.lines().collect();
        let (schema, data_start) = parse_header(&lines, class_index)?;
        let rows = lines[data_start..]
            .iter()
            .enumerate()
            .filter_map(|(offset, raw)| {
                let line = raw.trim();
                (!line.is_empty() && !line.starts_with('%'))
                    .then(|| (data_start + offset + 1, line.to_string()))
            })
            .collect();
        Ok(Self {
            schema: Arc::new(schema),
            rows,
            cursor: 0,
        })
    }

    pub fn from_file(path: impl AsRef<Path>, class_index: Option<usize>) -> Result<Self, DataError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_string(&content, class_index)
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl RecordStream for ArffStream {
    fn header(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn has_more(&self) -> bool {
        self.cursor < self.rows.len()
    }

    fn next_record(&mut self) -> Option<Result<Record, DataError>> {
        let (line, text) = self.rows.get(self.cursor)?;
        self.cursor += 1;
        Some(Record::parse(&self.schema, &split_row(text), *line))
    }

    fn restart(&mut self) {
        self.cursor = 0;
    }
}

// =============================================================================
// Writer
// =============================================================================

/// Render a batch as an ARFF document.
///
/// Categorical domains are the declared domain extended with any value the
/// records use, so the output always re-parses under its own header.
pub fn write_arff(batch: &BatchStats) -> String {
    let schema = batch.schema();
    let mut out = String::new();
    let _ = writeln!(out, "@relation {}", quote(schema.relation()));
    out.push('\n');

    for (index, attribute) in schema.attributes().iter().enumerate() {
        if attribute.is_numeric() && index != schema.class_index() {
            let _ = writeln!(out, "@attribute {} numeric", quote(attribute.name()));
            continue;
        }
        let mut domain: Vec<&str> = attribute.domain().iter().map(String::as_str).collect();
        for record in batch.records() {
            if let Some(v) = record.value(index).as_str() {
                if !domain.contains(&v) {
                    domain.push(v);
                }
            }
        }
        let domain: Vec<String> = domain.into_iter().map(quote).collect();
        let _ = writeln!(out, "@attribute {} {{{}}}", quote(attribute.name()), domain.join(","));
    }

    out.push_str("\n@data\n");
    for record in batch.records() {
        let fields: Vec<String> = record
            .values()
            .iter()
            .map(|v| match v.as_str() {
                Some(s) => quote(s),
                None => v.to_string(),
            })
            .collect();
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

fn quote(s: &str) -> String {
    if s.is_empty() || s.contains(|c: char| c.is_whitespace() || matches!(c, ',' | '{' | '}' | '%' | '\'')) {
        format!("\"{}\"", s)
    } else {
        s.to_string()
    }
}
