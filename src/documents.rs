//! Individual agreement documents: download the ones a day flagged, confirm
//! the change against the code printed in the document itself, and build the
//! export records handed to the downstream agreements database.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::detector::document::{extract_code, extract_title};
use crate::detector::entity::extract_entity;
use crate::error::{BocmError, Result};
use crate::knowledge::KnowledgeStore;
use crate::pdf::{extract_or_empty, TextExtractor};
use crate::processor::{DayOutcome, Finding};
use crate::reconcile::{Reconciler, Reconciliation, Verdict};
use crate::transport::{fetch_ok, Transport};

/// Provenance id of the BOCM in the agreements database.
pub const BOCM_SOURCE_ID: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRecord {
    pub fichero: String,
    pub nombre_convenio: String,
    pub codigo_principal: String,
    pub id_procedencia: u32,
}

#[derive(Debug, Clone)]
pub struct DocumentResult {
    pub path: PathBuf,
    pub export: ExportRecord,
    pub verification: Reconciliation,
}

pub struct DocumentDownloader {
    transport: Arc<dyn Transport>,
    extractor: Arc<dyn TextExtractor>,
    reconciler: Reconciler,
    dir: PathBuf,
    timeout: Duration,
    source_id: u32,
}

impl DocumentDownloader {
    pub fn new(
        transport: Arc<dyn Transport>,
        extractor: Arc<dyn TextExtractor>,
        reconciler: Reconciler,
        dir: &Path,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            extractor,
            reconciler,
            dir: dir.to_path_buf(),
            timeout,
            source_id: BOCM_SOURCE_ID,
        }
    }

    pub fn with_source_id(mut self, source_id: u32) -> Self {
        self.source_id = source_id;
        self
    }

    /// Download, verify and export every eligible entry of a processed day.
    ///
    /// Documents that cannot be fetched are skipped with a warning; store
    /// failures abort.
    pub async fn process_day(
        &self,
        outcome: &DayOutcome,
        store: &mut dyn KnowledgeStore,
    ) -> Result<Vec<DocumentResult>> {
        let mut results = Vec::new();
        for finding in outcome.eligible() {
            if let Some(result) = self.process_finding(finding, outcome.date, store).await? {
                results.push(result);
            }
        }
        store.flush()?;
        info!(date = %outcome.date, documents = results.len(), "documents processed");
        Ok(results)
    }

    pub async fn process_finding(
        &self,
        finding: &Finding,
        date: NaiveDate,
        store: &mut dyn KnowledgeStore,
    ) -> Result<Option<DocumentResult>> {
        let entry = &finding.entry;
        let (Some(url), Some(file)) = (entry.source_url.as_deref(), entry.file_name(date)) else {
            warn!(code = %entry.code, "entry has no document number, nothing to download");
            return Ok(None);
        };

        let path = self.dir.join(&file);
        let Some(bytes) = self.fetch_document(url, &path).await? else {
            return Ok(None);
        };

        let text = extract_or_empty(self.extractor.as_ref(), &bytes, &file);
        let verification = self.verify(finding, &text, &file, date, store)?;

        let nombre_convenio =
            extract_title(&text).unwrap_or_else(|| format!("Convenio {}", verification.new_code));
        let export = ExportRecord {
            fichero: file,
            nombre_convenio,
            codigo_principal: verification.new_code.clone(),
            id_procedencia: self.source_id,
        };
        Ok(Some(DocumentResult {
            path,
            export,
            verification,
        }))
    }

    /// Bytes of the document at `path`, downloading it first when missing.
    async fn fetch_document(&self, url: &str, path: &Path) -> Result<Option<Vec<u8>>> {
        if tokio::fs::try_exists(path).await? {
            debug!(path = %path.display(), "document already on disk");
            return Ok(Some(tokio::fs::read(path).await?));
        }

        match fetch_ok(self.transport.as_ref(), url, self.timeout).await {
            Ok(bytes) => {
                tokio::fs::create_dir_all(&self.dir).await?;
                tokio::fs::write(path, &bytes).await?;
                info!(url = %url, path = %path.display(), bytes = bytes.len(), "document saved");
                Ok(Some(bytes))
            }
            Err(e @ (BocmError::Http { .. } | BocmError::Request(_))) => {
                warn!(url = %url, error = %e, "document download failed, skipping");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Reconcile the code printed in the document itself.
    ///
    /// The summary entity keeps the key stable; the document's own entity
    /// name is used only when the summary had none. When the summary step
    /// already recorded this entry as NEW or CHANGED, the document is judged
    /// against the record as it stood before that write.
    fn verify(
        &self,
        finding: &Finding,
        text: &str,
        file: &str,
        date: NaiveDate,
        store: &mut dyn KnowledgeStore,
    ) -> Result<Reconciliation> {
        let entry = &finding.entry;
        let code = extract_code(text).unwrap_or_else(|| entry.code.clone());
        if code != entry.code {
            warn!(summary = %entry.code, document = %code, "document code differs from summary");
        }
        let key = entry
            .entity
            .clone()
            .or_else(|| extract_entity(text))
            .unwrap_or_else(|| finding.reconciliation.key.clone());

        let description = if text.trim().is_empty() {
            entry.description.as_str()
        } else {
            text
        };

        let summary = &finding.reconciliation;
        let current = store.get(&key)?;
        let baseline = if key == summary.key && summary.has_change() {
            summary.prior_code.as_ref().and_then(|prior| {
                current.map(|mut rec| {
                    rec.code = prior.clone();
                    rec
                })
            })
        } else {
            current
        };
        let result = self
            .reconciler
            .classify(&key, baseline.as_ref(), &code, description, date);

        match result.verdict {
            Verdict::Changed => info!(
                entity = %key,
                "*** code changed {} -> {}",
                result.prior_code.as_deref().unwrap_or("-"),
                result.new_code
            ),
            Verdict::New => info!(entity = %key, code = %code, "new agreement confirmed"),
            Verdict::Unchanged { .. } => info!(entity = %key, code = %code, "code unchanged"),
        }

        // The downloaded document is authoritative: record it for changes and
        // re-stamp stale or temporary records.
        if result.eligible_for_download() {
            self.reconciler
                .refresh(store, &key, &code, description, file, date)?;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::ChangeDetector;
    use crate::knowledge::{KnowledgeRecord, MemoryStore};
    use crate::pdf::fake::PlainText;
    use crate::processor::DayProcessor;
    use crate::transport::fake::FakeTransport;

    const BASE: &str = "https://bocm.test";
    const DOC_URL: &str = "https://bocm.test/boletin/CM_Orden_BOCM/2025/01/01/BOCM-20250101-12.PDF";
    const SUMMARY: &str = "Resolución sobre registro, depósito y publicación del convenio colectivo \
        de la empresa ACME, S.L. (Código número 28001234567890). BOCM-20250101-12";
    const DOCUMENT: &str = "BOCM-20250101-12\nRESOLUCIÓN de la Dirección General de Trabajo sobre \
        registro, depósito y publicación del convenio colectivo de la empresa ACME Servicios, S.L. \
        (código número 28001234567890).";

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    }

    fn day(store: &mut MemoryStore) -> DayOutcome {
        DayProcessor::new(ChangeDetector::new(BASE), Reconciler::default(), Arc::new(PlainText))
            .process_text(date(), SUMMARY, store)
            .unwrap()
    }

    fn downloader(transport: Arc<FakeTransport>, dir: &Path) -> DocumentDownloader {
        DocumentDownloader::new(
            transport,
            Arc::new(PlainText),
            Reconciler::default(),
            dir,
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn downloads_verifies_and_exports() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(FakeTransport::with(&[(DOC_URL, DOCUMENT.as_bytes())]));
        let mut store = MemoryStore::new();
        let outcome = day(&mut store);

        let results = downloader(transport, dir.path())
            .process_day(&outcome, &mut store)
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(
            r.export,
            ExportRecord {
                fichero: "BOCM-20250101-12.PDF".into(),
                nombre_convenio: "ACME Servicios".into(),
                codigo_principal: "28001234567890".into(),
                id_procedencia: 3,
            }
        );
        // Recorded from the summary already; the document confirms it as new.
        assert_eq!(r.verification.verdict, Verdict::New);
        assert!(r.verification.prior_code.is_none());
        assert!(r.path.exists());

        let json = serde_json::to_value(&r.export).unwrap();
        assert_eq!(json["fichero"], "BOCM-20250101-12.PDF");
        assert_eq!(json["id_procedencia"], 3);
    }

    #[tokio::test]
    async fn existing_file_is_not_fetched_again() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("BOCM-20250101-12.PDF"), DOCUMENT).unwrap();
        let transport = Arc::new(FakeTransport::default());
        let mut store = MemoryStore::new();
        let outcome = day(&mut store);

        let results = downloader(transport.clone(), dir.path())
            .process_day(&outcome, &mut store)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(transport.fetched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_document_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(FakeTransport::default());
        let mut store = MemoryStore::new();
        let outcome = day(&mut store);

        let results = downloader(transport, dir.path())
            .process_day(&outcome, &mut store)
            .await
            .unwrap();
        assert!(results.is_empty());
        assert!(!dir.path().join("BOCM-20250101-12.PDF").exists());
    }

    #[tokio::test]
    async fn summary_change_is_confirmed_against_prior_code() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(FakeTransport::with(&[(DOC_URL, DOCUMENT.as_bytes())]));
        let mut store = MemoryStore::new();
        let earlier = NaiveDate::from_ymd_opt(2024, 11, 1).unwrap();
        store
            .put("ACME", KnowledgeRecord::new("11111111111111", earlier, "", ""))
            .unwrap();

        let outcome = day(&mut store);
        assert_eq!(outcome.findings[0].reconciliation.verdict, Verdict::Changed);

        let results = downloader(transport, dir.path())
            .process_day(&outcome, &mut store)
            .await
            .unwrap();
        let r = &results[0];
        assert_eq!(r.verification.verdict, Verdict::Changed);
        assert_eq!(r.verification.prior_code.as_deref(), Some("11111111111111"));
        assert_eq!(r.verification.new_code, "28001234567890");
        assert_eq!(store.get("ACME").unwrap().unwrap().code, "28001234567890");
    }

    #[tokio::test]
    async fn document_code_overrides_summary_code() {
        let dir = tempfile::tempdir().unwrap();
        let newer = DOCUMENT.replace("28001234567890", "28001234599999");
        let transport = Arc::new(FakeTransport::with(&[(DOC_URL, newer.as_bytes())]));
        let mut store = MemoryStore::new();
        let earlier = NaiveDate::from_ymd_opt(2024, 11, 1).unwrap();
        store
            .put("ACME", KnowledgeRecord::new("11111111111111", earlier, "", ""))
            .unwrap();
        let outcome = day(&mut store);

        let results = downloader(transport, dir.path())
            .process_day(&outcome, &mut store)
            .await
            .unwrap();
        let r = &results[0];
        assert_eq!(r.verification.verdict, Verdict::Changed);
        assert_eq!(r.verification.prior_code.as_deref(), Some("11111111111111"));
        assert_eq!(r.export.codigo_principal, "28001234599999");
        let rec = store.get("ACME").unwrap().unwrap();
        assert_eq!(rec.code, "28001234599999");
        assert_eq!(rec.source_file, "BOCM-20250101-12.PDF");
    }

    #[tokio::test]
    async fn stale_record_is_refreshed_after_download() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(FakeTransport::with(&[(DOC_URL, DOCUMENT.as_bytes())]));
        let mut store = MemoryStore::new();
        let old = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        store
            .put("ACME", KnowledgeRecord::new("28001234567890", old, "", ""))
            .unwrap();

        let outcome = day(&mut store);
        assert_eq!(outcome.eligible().count(), 1);
        assert!(outcome.findings[0].reconciliation.stale);

        downloader(transport, dir.path())
            .process_day(&outcome, &mut store)
            .await
            .unwrap();
        let rec = store.get("ACME").unwrap().unwrap();
        assert_eq!(rec.last_seen, date());
        assert_eq!(rec.source_file, "BOCM-20250101-12.PDF");
    }

    #[tokio::test]
    async fn title_falls_back_to_code() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(FakeTransport::with(&[(DOC_URL, b"Texto sin cabecera reconocible".as_slice())]));
        let mut store = MemoryStore::new();
        let outcome = day(&mut store);

        let results = downloader(transport, dir.path())
            .with_source_id(9)
            .process_day(&outcome, &mut store)
            .await
            .unwrap();
        assert_eq!(results[0].export.nombre_convenio, "Convenio 28001234567890");
        assert_eq!(results[0].export.id_procedencia, 9);
    }
}
