//! Format parser: extract raw identifiers from a located entry.
//!
//! ## JSON shapes
//!
//! Historical export layouts are resolved by structural inspection into a
//! closed set of variants, checked in this order:
//!
//! ```text
//! [ {string_list_data: [{href, value}, ..]}, .. ]   → last href path segment, else value
//! [ {username}, .. ]                                → username
//! { followers: [ {username}, .. ] }                 → username
//! { relationships_*: [ .. ] }                       → per element, as for lists
//! anything else                                     → no identifiers (not an error)
//! ```
//!
//! ## CSV layout
//!
//! First line is a header and is skipped; every other non-empty line yields
//! its first comma-separated field with surrounding quotes and whitespace
//! stripped.
//!
//! Raw identifiers are returned as found: duplicates and case are left for
//! [`crate::normalize`].

use std::borrow::Cow;

use percent_encoding::percent_decode_str;
use serde_json::{Map, Value};
use url::Url;

use crate::archive::ContentFormat;

/// Key prefix of wrapper objects used by newer export layouts.
const RELATIONSHIPS_PREFIX: &str = "relationships_";

/// Error type for parsing a located entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Content cannot be read as its declared format at all.
    #[error("Malformed {format} input: {reason}")]
    MalformedInput {
        /// Declared format.
        format: ContentFormat,
        /// What went wrong.
        reason: String,
    },
}

/// Top-level shape of a JSON export document.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportDocument<'a> {
    /// A list of per-follower objects.
    Entries(&'a [Value]),
    /// `{"followers": [...]}` with `username` elements.
    FollowersWrapper(&'a [Value]),
    /// `{"relationships_<kind>": [...]}` from newer layouts.
    RelationshipsWrapper {
        /// The wrapper key, e.g. `relationships_following`.
        key: &'a str,
        /// The wrapped list.
        entries: &'a [Value],
    },
    /// No known shape.
    Unrecognized,
}

impl<'a> ExportDocument<'a> {
    /// Resolve the shape of a parsed document.
    pub fn classify(doc: &'a Value) -> Self {
        match doc {
            Value::Array(items) => Self::Entries(items),
            Value::Object(map) => {
                if let Some(Value::Array(items)) = map.get("followers") {
                    return Self::FollowersWrapper(items);
                }
                map.iter()
                    .find_map(|(key, value)| match value {
                        Value::Array(items) if key.starts_with(RELATIONSHIPS_PREFIX) => {
                            Some(Self::RelationshipsWrapper { key, entries: items })
                        }
                        _ => None,
                    })
                    .unwrap_or(Self::Unrecognized)
            }
            _ => Self::Unrecognized,
        }
    }

    /// Extract raw identifiers in document order.
    pub fn identifiers(&self) -> Vec<String> {
        match self {
            Self::Entries(items) | Self::RelationshipsWrapper { entries: items, .. } => items
                .iter()
                .filter_map(|item| ExportEntry::classify(item).identifier())
                .collect(),
            Self::FollowersWrapper(items) => items
                .iter()
                .filter_map(|item| username_of(item.as_object()?))
                .map(str::to_string)
                .collect(),
            Self::Unrecognized => Vec::new(),
        }
    }
}

/// Shape of one element of a follower list.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportEntry<'a> {
    /// `{"string_list_data": [first, ..]}` with a non-empty list.
    StringListData(&'a Map<String, Value>),
    /// `{"username": "..."}`.
    Username(&'a str),
    /// Anything else.
    Skip,
}

impl<'a> ExportEntry<'a> {
    /// Resolve the shape of one list element.
    pub fn classify(item: &'a Value) -> Self {
        let Some(obj) = item.as_object() else {
            return Self::Skip;
        };

        if let Some(Value::Array(list)) = obj.get("string_list_data") {
            if let Some(first) = list.first() {
                return match first.as_object() {
                    Some(first) => Self::StringListData(first),
                    None => Self::Skip,
                };
            }
        }

        match username_of(obj) {
            Some(username) => Self::Username(username),
            None => Self::Skip,
        }
    }

    /// Raw identifier carried by this element, if any.
    pub fn identifier(&self) -> Option<String> {
        match self {
            Self::StringListData(first) => match first.get("href") {
                Some(Value::String(href)) => identifier_from_href(href),
                _ => first.get("value")?.as_str().map(str::to_string),
            },
            Self::Username(username) => Some((*username).to_string()),
            Self::Skip => None,
        }
    }
}

fn username_of(obj: &Map<String, Value>) -> Option<&str> {
    obj.get("username")?.as_str()
}

/// Last non-empty path segment of a profile URL, percent-decoded.
///
/// `https://platform.example/jane_doe/` → `jane_doe`,
/// `https://platform.example/_u/jane_doe` → `jane_doe`,
/// `https://platform.example/jos%C3%A9` → `josé`.
pub fn identifier_from_href(href: &str) -> Option<String> {
    let path = match Url::parse(href.trim()) {
        Ok(url) => url.path().to_string(),
        Err(_) => href
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };

    path.rsplit('/')
        .map(decode_segment)
        .map(|segment| segment.trim().to_string())
        .find(|segment| !segment.is_empty())
}

/// Segments that do not decode to UTF-8 are kept as written.
fn decode_segment(segment: &str) -> Cow<'_, str> {
    percent_decode_str(segment)
        .decode_utf8()
        .unwrap_or(Cow::Borrowed(segment))
}

/// Extract raw identifiers from entry bytes in the declared format.
pub fn parse(bytes: &[u8], format: ContentFormat) -> Result<Vec<String>, ParseError> {
    let text = std::str::from_utf8(bytes).map_err(|e| ParseError::MalformedInput {
        format,
        reason: format!("not valid UTF-8: {}", e),
    })?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    match format {
        ContentFormat::Json => parse_json(text),
        ContentFormat::Csv => Ok(parse_csv(text)),
    }
}

/// Extract raw identifiers from a JSON document.
pub fn parse_json(text: &str) -> Result<Vec<String>, ParseError> {
    let doc: Value = serde_json::from_str(text).map_err(|e| ParseError::MalformedInput {
        format: ContentFormat::Json,
        reason: e.to_string(),
    })?;

    let shape = ExportDocument::classify(&doc);
    let ids = shape.identifiers();

    if ids.is_empty() {
        tracing::debug!(shape = shape_name(&shape), "JSON export yielded no identifiers");
    }

    Ok(ids)
}

/// Extract raw identifiers from delimited text.
pub fn parse_csv(text: &str) -> Vec<String> {
    text.split('\n')
        .skip(1)
        .filter_map(|line| {
            let line = line.strip_suffix('\r').unwrap_or(line);
            let first = line.split(',').next()?;
            let candidate = first.trim().trim_matches('"').trim();
            (!candidate.is_empty()).then(|| candidate.to_string())
        })
        .collect()
}

fn shape_name(shape: &ExportDocument<'_>) -> &'static str {
    match shape {
        ExportDocument::Entries(_) => "entries",
        ExportDocument::FollowersWrapper(_) => "followers_wrapper",
        ExportDocument::RelationshipsWrapper { .. } => "relationships_wrapper",
        ExportDocument::Unrecognized => "unrecognized",
    }
}
