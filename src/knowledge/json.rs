use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use super::{KnowledgeRecord, KnowledgeStore};
use crate::error::{BocmError, Result};

/// `codigos_convenios.json`: one object keyed by entity name.
///
/// Loaded whole on open, written back on `flush`. Concurrent processes
/// writing the same file will lose updates.
pub struct JsonFileStore {
    path: PathBuf,
    records: BTreeMap<String, KnowledgeRecord>,
    dirty: bool,
}

impl JsonFileStore {
    /// Open the file, creating an empty `{}` one if it does not exist.
    pub fn open(path: &Path) -> Result<Self> {
        let records = if path.exists() {
            let raw = fs::read_to_string(path)?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw).map_err(|e| {
                    BocmError::Persistence(format!("{}: {}", path.display(), e))
                })?
            }
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, "{}")?;
            info!(path = %path.display(), "created empty knowledge base");
            BTreeMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            records,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KnowledgeStore for JsonFileStore {
    fn get(&self, entity: &str) -> Result<Option<KnowledgeRecord>> {
        Ok(self.records.get(entity).cloned())
    }

    fn put(&mut self, entity: &str, record: KnowledgeRecord) -> Result<()> {
        self.records.insert(entity.to_string(), record);
        self.dirty = true;
        Ok(())
    }

    fn entries(&self) -> Result<Vec<(String, KnowledgeRecord)>> {
        Ok(self.records.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let body = serde_json::to_string_pretty(&self.records)?;
        // Write beside the target and rename so a crash never leaves half a file.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)?;
        self.dirty = false;
        info!(path = %self.path.display(), records = self.records.len(), "knowledge base saved");
        Ok(())
    }
}
