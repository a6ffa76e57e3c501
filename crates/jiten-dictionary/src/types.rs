use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DictionaryError;
use crate::schema::stores;

/// The set of installed-dictionary titles a lookup may match against.
pub type DictionarySet = HashSet<String>;

/// Which index and query-range strategy a term lookup uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Exact,
    Prefix,
    Suffix,
}

/// Which index produced a term hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSource {
    Term,
    Reading,
    Sequence,
}

/// A row type the importer may write, bound to its object store.
pub trait DictionaryRecord: Serialize {
    const STORE: &'static str;

    fn to_row(&self) -> Result<Value, DictionaryError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// A stored term row. The reverse fields are derived at insert time and
/// never written by callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermRecord {
    pub dictionary: String,
    pub expression: String,
    pub reading: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_tags: Option<String>,
    /// Legacy alias for `definition_tags` kept for old imports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    #[serde(default)]
    pub term_tags: String,
    pub rules: String,
    pub score: f64,
    pub glossary: Vec<Value>,
}

impl DictionaryRecord for TermRecord {
    const STORE: &'static str = stores::TERMS;

    fn to_row(&self) -> Result<Value, DictionaryError> {
        let mut row = serde_json::to_value(self)?;
        if let Some(object) = row.as_object_mut() {
            object.insert(
                "expressionReverse".to_string(),
                Value::String(reverse_string(&self.expression)),
            );
            object.insert(
                "readingReverse".to_string(),
                Value::String(reverse_string(&self.reading)),
            );
        }
        Ok(row)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KanjiRecord {
    pub dictionary: String,
    pub character: String,
    #[serde(default)]
    pub onyomi: String,
    #[serde(default)]
    pub kunyomi: String,
    #[serde(default)]
    pub tags: String,
    pub meanings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Value>,
}

impl DictionaryRecord for KanjiRecord {
    const STORE: &'static str = stores::KANJI;
}

/// Term meta mode tag. Payloads are opaque to this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TermMetaMode {
    Freq,
    Pitch,
    Ipa,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermMetaRecord {
    pub dictionary: String,
    pub expression: String,
    pub mode: TermMetaMode,
    pub data: Value,
}

impl DictionaryRecord for TermMetaRecord {
    const STORE: &'static str = stores::TERM_META;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KanjiMetaRecord {
    pub dictionary: String,
    pub character: String,
    pub mode: String,
    pub data: Value,
}

impl DictionaryRecord for KanjiMetaRecord {
    const STORE: &'static str = stores::KANJI_META;
}

/// A tag row; returned as-is by the tag lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub dictionary: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub score: f64,
}

impl DictionaryRecord for Tag {
    const STORE: &'static str = stores::TAG_META;
}

/// One registry row per installed dictionary; its presence is the source of
/// truth for "is this dictionary installed".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DictionarySummary {
    pub title: String,
    pub revision: String,
    pub version: u64,
    #[serde(default)]
    pub sequenced: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counts: Option<Value>,
}

impl DictionaryRecord for DictionarySummary {
    const STORE: &'static str = stores::DICTIONARIES;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRecord {
    pub dictionary: String,
    pub path: String,
    pub media_type: String,
    pub width: u32,
    pub height: u32,
    #[serde(with = "content_base64")]
    pub content: Vec<u8>,
}

impl DictionaryRecord for MediaRecord {
    const STORE: &'static str = stores::MEDIA;
}

/// Media blobs travel inside JSON rows as base64 text.
mod content_base64 {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

// Bulk-find requests.

#[derive(Debug, Clone)]
pub struct TermExactRequest {
    pub term: String,
    pub reading: String,
}

#[derive(Debug, Clone)]
pub struct TermSequenceRequest {
    pub sequence: i64,
    pub dictionary: String,
}

#[derive(Debug, Clone)]
pub struct TagMetaRequest {
    pub name: String,
    pub dictionary: String,
}

#[derive(Debug, Clone)]
pub struct MediaRequest {
    pub path: String,
    pub dictionary: String,
}

// Entities. Every entity carries the index of the input item that produced
// it so callers can reassemble results against their original input order.

#[derive(Debug, Clone, PartialEq)]
pub struct TermEntry {
    pub index: usize,
    pub match_type: MatchType,
    pub match_source: MatchSource,
    pub term: String,
    pub reading: String,
    pub definition_tags: Vec<String>,
    pub term_tags: Vec<String>,
    pub rules: Vec<String>,
    pub definitions: Vec<Value>,
    pub score: f64,
    pub dictionary: String,
    pub id: u64,
    /// `-1` when the stored row has no sequence.
    pub sequence: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KanjiEntry {
    pub index: usize,
    pub character: String,
    pub onyomi: Vec<String>,
    pub kunyomi: Vec<String>,
    pub tags: Vec<String>,
    pub definitions: Vec<String>,
    pub stats: serde_json::Map<String, Value>,
    pub dictionary: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TermMetaEntry {
    pub index: usize,
    pub term: String,
    pub mode: TermMetaMode,
    pub data: Value,
    pub dictionary: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KanjiMetaEntry {
    pub index: usize,
    pub character: String,
    pub mode: String,
    pub data: Value,
    pub dictionary: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Media {
    pub index: usize,
    pub dictionary: String,
    pub path: String,
    pub media_type: String,
    pub width: u32,
    pub height: u32,
    pub content: Vec<u8>,
}

/// A media row joined with the draw targets requesting it.
#[derive(Debug, Clone)]
pub struct DrawMedia {
    pub index: usize,
    pub dictionary: String,
    pub path: String,
    pub media_type: String,
    pub width: u32,
    pub height: u32,
    pub content: Vec<u8>,
    pub canvas_indexes: Vec<usize>,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub generation: u64,
}

/// Reverses a string by code point.
pub(crate) fn reverse_string(text: &str) -> String {
    text.chars().rev().collect()
}

/// Splits a space-delimited field, treating an absent or empty field as no
/// entries.
pub(crate) fn split_field(field: Option<&str>) -> Vec<String> {
    match field {
        Some(text) if !text.is_empty() => text.split(' ').map(str::to_string).collect(),
        _ => Vec::new(),
    }
}
