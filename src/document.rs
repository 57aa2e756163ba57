//! Front-matter parsing: raw document text in, a typed field map and a body
//! out. Field semantics (required fields, enum labels) are the validator's
//! concern; this module only decides the lexical shape of each value, so an
//! unrecognized difficulty label passes through as a string and is rejected
//! downstream.

use std::{collections::BTreeMap, sync::OnceLock};

use regex::Regex;
use time::{Date, format_description::BorrowedFormatItem, macros::format_description};

use crate::record::Body;

const BLOCK_DELIMITER: &str = "---";

pub(crate) const DATE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]");

fn date_shape() -> &'static Regex {
    static SHAPE: OnceLock<Regex> = OnceLock::new();
    SHAPE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap())
}

/// A raw document handed to the pipeline: an identity plus the text to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub source: String,
    pub text: String,
}

impl SourceDocument {
    #[must_use]
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
        }
    }
}

/// A primitive metadata value as it appears in the front matter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Str(String),
    Bool(bool),
    Date(Date),
    List(Vec<FieldValue>),
}

impl FieldValue {
    /// Lexical name used in type-mismatch reports.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::Bool(_) => "boolean",
            Self::Date(_) => "date",
            Self::List(_) => "list",
        }
    }
}

/// Structural parse failure. Everything here is about the shape of the
/// document, never about what the fields mean.
#[derive(Debug, thiserror::Error)]
pub enum MalformedDocument {
    #[error("document has no metadata block")]
    MissingMetadataBlock,
    #[error("metadata block is never terminated")]
    UnterminatedMetadataBlock,
    #[error("metadata line {line} is not a `key: value` pair: `{text}`")]
    InvalidMetadataLine { line: usize, text: String },
    #[error("metadata key on line {line} is empty")]
    EmptyKey { line: usize },
    #[error("metadata key `{key}` has no value")]
    MissingValue { key: String },
    #[error("list value for key `{key}` is never closed")]
    UnterminatedList { key: String },
}

/// The outcome of a structural parse: a field map for the validator and the
/// content body with its teaser split already computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDocument {
    pub fields: BTreeMap<String, FieldValue>,
    pub body: Body,
}

/// Split a raw document into its metadata block and body.
///
/// The metadata block is a `---`-delimited prefix of `key: value` lines.
/// Duplicate keys keep the last occurrence.
///
/// # Errors
/// Returns `MalformedDocument` when the block is missing or unterminated,
/// or when a line inside it has no parseable `key: value` shape.
pub fn parse(text: &str) -> Result<ParsedDocument, MalformedDocument> {
    let mut segments = text.split_inclusive('\n');
    let mut offset = 0;

    let Some(first) = segments.next() else {
        return Err(MalformedDocument::MissingMetadataBlock);
    };
    offset += first.len();
    if trim_line(first) != BLOCK_DELIMITER {
        return Err(MalformedDocument::MissingMetadataBlock);
    }

    let mut fields = BTreeMap::new();
    // Line numbers are 1-based; line 1 is the opening delimiter.
    let mut number = 1;
    let mut terminated = false;
    for raw in segments {
        offset += raw.len();
        number += 1;
        let line = trim_line(raw);
        if line == BLOCK_DELIMITER {
            terminated = true;
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        let (key, value) = parse_line(line, number)?;
        fields.insert(key, value);
    }
    if !terminated {
        return Err(MalformedDocument::UnterminatedMetadataBlock);
    }

    Ok(ParsedDocument {
        fields,
        body: Body::new(&text[offset..]),
    })
}

fn trim_line(raw: &str) -> &str {
    raw.strip_suffix('\n').unwrap_or(raw).trim_end()
}

fn parse_line(line: &str, number: usize) -> Result<(String, FieldValue), MalformedDocument> {
    let Some((key, value)) = line.split_once(':') else {
        return Err(MalformedDocument::InvalidMetadataLine {
            line: number,
            text: line.trim().to_string(),
        });
    };

    let key = key.trim();
    if key.is_empty() {
        return Err(MalformedDocument::EmptyKey { line: number });
    }

    let value = value.trim();
    if value.is_empty() {
        return Err(MalformedDocument::MissingValue {
            key: key.to_string(),
        });
    }

    let value = if value.starts_with('[') {
        parse_list(key, value)?
    } else {
        scalar(value)
    };
    Ok((key.to_string(), value))
}

fn parse_list(key: &str, value: &str) -> Result<FieldValue, MalformedDocument> {
    let Some(inner) = value
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
    else {
        return Err(MalformedDocument::UnterminatedList {
            key: key.to_string(),
        });
    };

    let inner = inner.trim();
    if inner.is_empty() {
        return Ok(FieldValue::List(Vec::new()));
    }

    let entries = inner
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(scalar)
        .collect();
    Ok(FieldValue::List(entries))
}

// Lexical typing only: quoting forces a string; `true`/`false` become
// booleans; a value shaped like a calendar date becomes a date when it is
// one (`2024-13-40` stays a string for the validator to reject).
fn scalar(value: &str) -> FieldValue {
    if let Some(quoted) = unquote(value) {
        return FieldValue::Str(quoted.to_string());
    }
    match value {
        "true" => return FieldValue::Bool(true),
        "false" => return FieldValue::Bool(false),
        _ => {}
    }
    if date_shape().is_match(value) {
        if let Ok(date) = Date::parse(value, DATE_FORMAT) {
            return FieldValue::Date(date);
        }
    }
    FieldValue::Str(value.to_string())
}

fn unquote(value: &str) -> Option<&str> {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return Some(&value[1..value.len() - 1]);
        }
    }
    None
}
