//! Seed or refresh the knowledge base from a folder of reference agreement PDFs.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::bulletin::date_from_file_name;
use crate::detector::document::extract_code;
use crate::detector::entity::extract_entity;
use crate::error::Result;
use crate::knowledge::{KnowledgeRecord, KnowledgeStore};
use crate::pdf::TextExtractor;

const CHUNK: usize = 64;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestStats {
    pub files: usize,
    pub stored: usize,
    pub no_code: usize,
    pub no_entity: usize,
    pub unreadable: usize,
}

enum Parsed {
    Record { entity: String, record: KnowledgeRecord },
    NoCode,
    NoEntity,
    Unreadable,
}

/// `*.pdf` / `*.PDF` files directly inside `dir`, sorted by name.
pub fn reference_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Extract every reference file in parallel, then write the records from
/// this thread.
pub fn ingest_dir(
    dir: &Path,
    extractor: &dyn TextExtractor,
    store: &mut dyn KnowledgeStore,
    show_progress: bool,
) -> Result<IngestStats> {
    let files = reference_files(dir)?;
    let mut stats = IngestStats {
        files: files.len(),
        ..Default::default()
    };
    if files.is_empty() {
        warn!(dir = %dir.display(), "no reference PDFs found");
        return Ok(stats);
    }
    info!(dir = %dir.display(), files = files.len(), "ingesting reference PDFs");

    let pb = if show_progress {
        ProgressBar::new(files.len() as u64)
    } else {
        ProgressBar::hidden()
    };
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }

    for chunk in files.chunks(CHUNK) {
        let parsed: Vec<(String, Parsed)> = chunk
            .par_iter()
            .map(|path| (display_name(path), parse_file(path, extractor)))
            .collect();

        for (name, p) in parsed {
            match p {
                Parsed::Record { entity, record } => {
                    info!(file = %name, entity = %entity, code = %record.code, "reference stored");
                    store.put(&entity, record)?;
                    stats.stored += 1;
                }
                Parsed::NoCode => {
                    warn!(file = %name, "no registration code found");
                    stats.no_code += 1;
                }
                Parsed::NoEntity => {
                    warn!(file = %name, "no company or sector name found");
                    stats.no_entity += 1;
                }
                Parsed::Unreadable => stats.unreadable += 1,
            }
        }
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    store.flush()?;
    Ok(stats)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn parse_file(path: &Path, extractor: &dyn TextExtractor) -> Parsed {
    let name = display_name(path);
    let text = match std::fs::read(path)
        .map_err(Into::into)
        .and_then(|bytes| extractor.extract_text(&bytes))
    {
        Ok(text) => text,
        Err(e) => {
            warn!(file = %name, error = %e, "reference PDF unreadable");
            return Parsed::Unreadable;
        }
    };

    let Some(code) = extract_code(&text) else {
        return Parsed::NoCode;
    };
    let Some(entity) = extract_entity(&text) else {
        return Parsed::NoEntity;
    };
    let date = date_from_file_name(&name).unwrap_or_else(epoch);

    Parsed::Record {
        record: KnowledgeRecord::new(&code, date, &name, &text),
        entity,
    }
}

/// Date assumed for references whose file name carries none.
fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default()
}
