//! One calendar date end to end: locate the summary, fetch it, extract its
//! text, detect agreement entries and reconcile each against the knowledge base.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use crate::bulletin::ymd;
use crate::detector::{ChangeDetector, ChangeReason, DetectedEntry};
use crate::error::{BocmError, Result};
use crate::knowledge::KnowledgeStore;
use crate::pdf::{extract_or_empty, TextExtractor};
use crate::reconcile::{Reconciler, Reconciliation, Verdict};
use crate::resolver::SummaryLocator;
use crate::transport::{fetch_ok, Transport};

pub const REPORT_DESCRIPTION_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportDetail {
    pub documento: Option<u32>,
    pub codigo: String,
    pub tipo_cambio: ChangeReason,
    pub descripcion: String,
    #[serde(flatten)]
    pub estado: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codigo_anterior: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empresa: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Worth fetching the full document.
    pub revisar: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayReport {
    pub fecha: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sumario: Option<String>,
    pub convenios_detectados: usize,
    pub convenios_con_cambios: usize,
    pub detalles: Vec<ReportDetail>,
}

impl DayReport {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            fecha: ymd(date),
            sumario: None,
            convenios_detectados: 0,
            convenios_con_cambios: 0,
            detalles: Vec::new(),
        }
    }
}

/// An entry together with what the knowledge base said about it.
#[derive(Debug, Clone)]
pub struct Finding {
    pub entry: DetectedEntry,
    pub reconciliation: Reconciliation,
}

#[derive(Debug, Clone)]
pub struct DayOutcome {
    pub date: NaiveDate,
    pub report: DayReport,
    pub findings: Vec<Finding>,
}

impl DayOutcome {
    fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            report: DayReport::empty(date),
            findings: Vec::new(),
        }
    }

    pub fn eligible(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.reconciliation.eligible_for_download())
    }
}

pub struct DayProcessor {
    pub detector: ChangeDetector,
    pub reconciler: Reconciler,
    extractor: Arc<dyn TextExtractor>,
}

impl DayProcessor {
    pub fn new(detector: ChangeDetector, reconciler: Reconciler, extractor: Arc<dyn TextExtractor>) -> Self {
        Self {
            detector,
            reconciler,
            extractor,
        }
    }

    pub fn extractor(&self) -> &dyn TextExtractor {
        self.extractor.as_ref()
    }

    /// Detect and reconcile the entries of an already-fetched summary.
    ///
    /// Unreadable PDFs yield an empty report. Store failures propagate.
    pub fn process_summary(
        &self,
        date: NaiveDate,
        summary: &[u8],
        store: &mut dyn KnowledgeStore,
    ) -> Result<DayOutcome> {
        let text = extract_or_empty(self.extractor.as_ref(), summary, &format!("sumario {}", ymd(date)));
        self.process_text(date, &text, store)
    }

    pub fn process_text(
        &self,
        date: NaiveDate,
        text: &str,
        store: &mut dyn KnowledgeStore,
    ) -> Result<DayOutcome> {
        info!(date = %date, chars = text.chars().count(), "processing summary");
        let entries = self.detector.detect(text, date);
        if entries.is_empty() {
            info!(date = %date, "no labor agreement entries");
            return Ok(DayOutcome::empty(date));
        }

        let mut findings = Vec::with_capacity(entries.len());
        for entry in entries {
            let reconciliation = self.reconciler.reconcile_entry(store, &entry, date)?;
            findings.push(Finding {
                entry,
                reconciliation,
            });
        }

        let detalles: Vec<ReportDetail> = findings.iter().map(detail).collect();
        let report = DayReport {
            fecha: ymd(date),
            sumario: None,
            convenios_detectados: findings.len(),
            convenios_con_cambios: findings.iter().filter(|f| f.reconciliation.has_change()).count(),
            detalles,
        };
        info!(
            date = %date,
            detected = report.convenios_detectados,
            changed = report.convenios_con_cambios,
            "day processed"
        );
        Ok(DayOutcome {
            date,
            report,
            findings,
        })
    }

    /// Locate, fetch and process the summary for `date`, then flush the store.
    ///
    /// A date without a summary, or whose summary cannot be downloaded,
    /// yields an empty report.
    pub async fn run_date(
        &self,
        locator: &SummaryLocator,
        transport: &dyn Transport,
        download_timeout: Duration,
        date: NaiveDate,
        store: &mut dyn KnowledgeStore,
    ) -> Result<DayOutcome> {
        let url = match locator.locate(date).await {
            Ok(url) => url,
            Err(BocmError::NotFound { .. }) => {
                info!(date = %date, "no bulletin published for this date");
                return Ok(DayOutcome::empty(date));
            }
            Err(e) => return Err(e),
        };

        let bytes = match fetch_ok(transport, &url, download_timeout).await {
            Ok(bytes) => bytes,
            Err(e @ (BocmError::Http { .. } | BocmError::Request(_))) => {
                warn!(date = %date, url = %url, error = %e, "summary download failed");
                let mut outcome = DayOutcome::empty(date);
                outcome.report.sumario = Some(url);
                return Ok(outcome);
            }
            Err(e) => return Err(e),
        };

        let mut outcome = self.process_summary(date, &bytes, store)?;
        outcome.report.sumario = Some(url);
        store.flush()?;
        Ok(outcome)
    }
}

fn detail(finding: &Finding) -> ReportDetail {
    let Finding {
        entry,
        reconciliation,
    } = finding;
    ReportDetail {
        documento: entry.document,
        codigo: entry.code.clone(),
        tipo_cambio: entry.reason,
        descripcion: truncate(&entry.description, REPORT_DESCRIPTION_CHARS),
        estado: reconciliation.verdict,
        codigo_anterior: reconciliation.prior_code.clone(),
        empresa: entry.entity.clone(),
        url: entry.source_url.clone(),
        revisar: reconciliation.eligible_for_download(),
    }
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates::{BocmConventions, CandidateStrategy};
    use crate::knowledge::{KnowledgeRecord, KnowledgeStore, MemoryStore};
    use crate::pdf::fake::PlainText;
    use crate::resolver::ResolverOptions;
    use crate::transport::fake::FakeTransport;

    const SUMMARY: &str = "III. ADMINISTRACIÓN LOCAL\n\
        Resolución sobre registro, depósito y publicación del convenio colectivo de la \
        empresa ACME, S.L. (Código número 28001234567890). BOCM-20250101-12\n\
        Convocatoria de subvenciones para comercio. BOCM-20250101-13\n\
        Prórroga del convenio colectivo de la empresa Beta Logística, S.A. \
        (Código número 28009999999999). BOCM-20250101-14";

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    }

    /// Store whose disk is gone: every read and write fails.
    #[derive(Default)]
    struct UnavailableStore {
        flushed: bool,
    }

    impl KnowledgeStore for UnavailableStore {
        fn get(&self, _entity: &str) -> Result<Option<KnowledgeRecord>> {
            Err(BocmError::Persistence("disk gone".into()))
        }

        fn put(&mut self, _entity: &str, _record: KnowledgeRecord) -> Result<()> {
            Err(BocmError::Persistence("disk gone".into()))
        }

        fn entries(&self) -> Result<Vec<(String, KnowledgeRecord)>> {
            Err(BocmError::Persistence("disk gone".into()))
        }

        fn flush(&mut self) -> Result<()> {
            self.flushed = true;
            Ok(())
        }
    }

    fn processor() -> DayProcessor {
        DayProcessor::new(ChangeDetector::default(), Reconciler::default(), Arc::new(PlainText))
    }

    fn locator(transport: Arc<FakeTransport>) -> SummaryLocator {
        let options = ResolverOptions {
            batch_size: 10,
            max_workers: 4,
            probe_timeout: Duration::from_millis(50),
            batch_timeout: Duration::from_secs(5),
        };
        SummaryLocator::new(Box::new(BocmConventions::new("https://bocm.test", 3)), transport, options)
    }

    #[test]
    fn report_counts_changes_only_for_new_or_changed() {
        let mut store = MemoryStore::new();
        store
            .put("Beta Logística", KnowledgeRecord::new("28009999999999", date(), "", ""))
            .unwrap();

        let outcome = processor()
            .process_summary(date(), SUMMARY.as_bytes(), &mut store)
            .unwrap();
        let report = &outcome.report;
        assert_eq!(report.fecha, "20250101");
        assert_eq!(report.convenios_detectados, 2);
        assert_eq!(report.convenios_con_cambios, 1);

        let acme = &report.detalles[0];
        assert_eq!(acme.documento, Some(12));
        assert_eq!(acme.codigo, "28001234567890");
        assert_eq!(acme.estado, Verdict::New);
        assert!(acme.revisar);

        let beta = &report.detalles[1];
        assert_eq!(beta.tipo_cambio, ChangeReason::Extension);
        assert!(matches!(beta.estado, Verdict::Unchanged { suspect: true }));
        assert_eq!(outcome.eligible().count(), 1);
    }

    #[test]
    fn report_serializes_with_historical_keys() {
        let mut store = MemoryStore::new();
        let outcome = processor()
            .process_summary(date(), SUMMARY.as_bytes(), &mut store)
            .unwrap();
        let json = serde_json::to_value(&outcome.report).unwrap();
        assert_eq!(json["convenios_detectados"], 2);
        assert_eq!(json["detalles"][0]["documento"], 12);
        assert_eq!(json["detalles"][0]["tipo_cambio"], "Nuevo registro/depósito");
        assert_eq!(json["detalles"][0]["estado"], "new");
        let desc = json["detalles"][0]["descripcion"].as_str().unwrap();
        assert!(desc.ends_with("..."));
        assert_eq!(desc.chars().count(), REPORT_DESCRIPTION_CHARS + 3);
    }

    #[test]
    fn unreadable_summary_yields_empty_report() {
        let mut store = MemoryStore::new();
        let outcome = processor()
            .process_summary(date(), b"!fail broken pdf", &mut store)
            .unwrap();
        assert_eq!(outcome.report, DayReport::empty(date()));
        assert!(store.is_empty());
    }

    #[test]
    fn truncate_keeps_short_text() {
        assert_eq!(truncate("corto", 10), "corto");
        assert_eq!(truncate("ñandúes", 3), "ñan...");
    }

    #[tokio::test]
    async fn run_date_without_summary_is_empty_report() {
        let transport = Arc::new(FakeTransport::default());
        let mut store = MemoryStore::new();
        let outcome = processor()
            .run_date(&locator(transport.clone()), transport.as_ref(), Duration::from_secs(1), date(), &mut store)
            .await
            .unwrap();
        assert_eq!(outcome.report.convenios_detectados, 0);
        assert!(outcome.report.sumario.is_none());
        assert!(!transport.probed().is_empty());
    }

    #[tokio::test]
    async fn run_date_fetches_and_reconciles() {
        let url = BocmConventions::new("https://bocm.test", 3).candidates(date())[0].clone();
        let transport = Arc::new(FakeTransport::with(&[(url.as_str(), SUMMARY.as_bytes())]));
        let mut store = MemoryStore::new();

        let outcome = processor()
            .run_date(&locator(transport.clone()), transport.as_ref(), Duration::from_secs(1), date(), &mut store)
            .await
            .unwrap();
        assert_eq!(outcome.report.sumario.as_deref(), Some(url.as_str()));
        assert_eq!(outcome.report.convenios_con_cambios, 2);
        assert_eq!(store.len(), 2);
        assert_eq!(transport.fetched.lock().unwrap().as_slice(), &[url]);
    }

    #[test]
    fn store_failure_propagates() {
        let mut store = UnavailableStore::default();
        let err = processor()
            .process_text(date(), SUMMARY, &mut store)
            .unwrap_err();
        assert!(matches!(err, BocmError::Persistence(ref m) if m == "disk gone"));
    }

    #[tokio::test]
    async fn run_date_aborts_on_store_failure_without_flushing() {
        let url = BocmConventions::new("https://bocm.test", 3).candidates(date())[0].clone();
        let transport = Arc::new(FakeTransport::with(&[(url.as_str(), SUMMARY.as_bytes())]));
        let mut store = UnavailableStore::default();

        let result = processor()
            .run_date(&locator(transport.clone()), transport.as_ref(), Duration::from_secs(1), date(), &mut store)
            .await;
        assert!(matches!(result, Err(BocmError::Persistence(_))));
        assert!(!store.flushed);
    }
}
