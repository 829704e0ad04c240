use std::path::Path;

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};

use super::{KnowledgeRecord, KnowledgeStore};
use crate::error::{BocmError, Result};

/// Write-through SQLite backend.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS knowledge (
            entity      TEXT PRIMARY KEY,
            codigo      TEXT NOT NULL,
            fecha       TEXT NOT NULL,
            archivo     TEXT NOT NULL DEFAULT '',
            descripcion TEXT NOT NULL DEFAULT '',
            updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_knowledge_codigo ON knowledge(codigo);
        ",
    )?;
    Ok(())
}

fn row_to_record(codigo: String, fecha: String, archivo: String, descripcion: String) -> Result<KnowledgeRecord> {
    let last_seen = NaiveDate::parse_from_str(&fecha, "%Y%m%d")
        .map_err(|e| BocmError::Persistence(format!("bad fecha {fecha:?}: {e}")))?;
    Ok(KnowledgeRecord {
        code: codigo,
        last_seen,
        source_file: archivo,
        description: descripcion,
    })
}

impl KnowledgeStore for SqliteStore {
    fn get(&self, entity: &str) -> Result<Option<KnowledgeRecord>> {
        let row: Option<(String, String, String, String)> = self
            .conn
            .query_row(
                "SELECT codigo, fecha, archivo, descripcion FROM knowledge WHERE entity = ?1",
                [entity],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;
        row.map(|(c, f, a, d)| row_to_record(c, f, a, d)).transpose()
    }

    fn put(&mut self, entity: &str, record: KnowledgeRecord) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO knowledge (entity, codigo, fecha, archivo, descripcion, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))",
            rusqlite::params![
                entity,
                record.code,
                record.last_seen.format("%Y%m%d").to_string(),
                record.source_file,
                record.description,
            ],
        )?;
        Ok(())
    }

    fn entries(&self) -> Result<Vec<(String, KnowledgeRecord)>> {
        let mut stmt = self.conn.prepare(
            "SELECT entity, codigo, fecha, archivo, descripcion FROM knowledge ORDER BY entity",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })?
            .collect::<std::result::Result<Vec<(String, String, String, String, String)>, _>>()?;
        rows.into_iter()
            .map(|(e, c, f, a, d)| Ok((e, row_to_record(c, f, a, d)?)))
            .collect()
    }
}
