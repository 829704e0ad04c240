//! Knowledge base of the last registration code seen per entity.
//!
//! One record per entity name, last write wins. The reconciler only needs
//! `get`/`put`, so the same logic runs against the JSON file the tool has
//! always used, an SQLite file, or memory.

pub mod json;
pub mod sqlite;

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use json::JsonFileStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    #[serde(rename = "codigo")]
    pub code: String,
    #[serde(rename = "fecha", with = "ymd_format", default = "default_seen")]
    pub last_seen: NaiveDate,
    #[serde(rename = "archivo", default)]
    pub source_file: String,
    #[serde(rename = "descripcion", default)]
    pub description: String,
}

/// Records written without a date are treated as very old.
fn default_seen() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default()
}

impl KnowledgeRecord {
    pub fn new(code: &str, last_seen: NaiveDate, source_file: &str, description: &str) -> Self {
        Self {
            code: code.to_string(),
            last_seen,
            source_file: source_file.to_string(),
            description: excerpt(description, EXCERPT_CHARS),
        }
    }
}

pub const EXCERPT_CHARS: usize = 200;

/// First `max` characters with line breaks flattened.
pub fn excerpt(text: &str, max: usize) -> String {
    text.chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .take(max)
        .collect()
}

pub trait KnowledgeStore: Send {
    fn get(&self, entity: &str) -> Result<Option<KnowledgeRecord>>;
    fn put(&mut self, entity: &str, record: KnowledgeRecord) -> Result<()>;
    /// All records, ordered by entity name.
    fn entries(&self) -> Result<Vec<(String, KnowledgeRecord)>>;
    /// Persist buffered writes. Stores that write through do nothing.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    records: BTreeMap<String, KnowledgeRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl KnowledgeStore for MemoryStore {
    fn get(&self, entity: &str) -> Result<Option<KnowledgeRecord>> {
        Ok(self.records.get(entity).cloned())
    }

    fn put(&mut self, entity: &str, record: KnowledgeRecord) -> Result<()> {
        self.records.insert(entity.to_string(), record);
        Ok(())
    }

    fn entries(&self) -> Result<Vec<(String, KnowledgeRecord)>> {
        Ok(self.records.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

/// Pick the backend from the file extension: `.sqlite`/`.db` → SQLite, anything else → JSON.
pub fn open_store(path: &Path) -> Result<Box<dyn KnowledgeStore>> {
    match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("sqlite") | Some("db") => Ok(Box::new(SqliteStore::open(path)?)),
        _ => Ok(Box::new(JsonFileStore::open(path)?)),
    }
}

/// `YYYYMMDD` on the wire, as in the historical JSON file.
pub(crate) mod ymd_format {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&date.format("%Y%m%d").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDate::parse_from_str(raw.trim(), "%Y%m%d").map_err(serde::de::Error::custom)
    }
}
