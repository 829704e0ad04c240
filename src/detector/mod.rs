pub mod document;
pub mod entity;
pub mod fallback;
pub mod primary;
pub mod reason;
pub mod vocab;

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::bulletin::{document_file_name, document_url};
pub use reason::ChangeReason;
pub use vocab::Vocabularies;

static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// `BOCM-YYYYMMDD-N` document reference as printed in summaries.
pub(crate) static DOC_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"BOCM-(\d{8})-(\d+)").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionPass {
    Primary,
    Fallback,
}

/// One labor-agreement mention found in a summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedEntry {
    /// Issue sub-number within the bulletin (`N` in `BOCM-YYYYMMDD-N`).
    pub document: Option<u32>,
    /// Publication date printed in the document reference.
    pub published: Option<NaiveDate>,
    pub description: String,
    pub code: String,
    pub entity: Option<String>,
    pub reason: ChangeReason,
    pub source_url: Option<String>,
    pub pass: DetectionPass,
}

impl DetectedEntry {
    /// Document file name, when the entry carries a document number.
    pub fn file_name(&self, date: NaiveDate) -> Option<String> {
        self.document
            .map(|n| document_file_name(self.published.unwrap_or(date), n))
    }

    /// Key under which this entry is reconciled.
    ///
    /// Falls back to the document file name, then to the code, when no
    /// entity name could be extracted.
    pub fn knowledge_key(&self, date: NaiveDate) -> String {
        self.entity
            .clone()
            .or_else(|| self.file_name(date))
            .unwrap_or_else(|| format!("codigo:{}", self.code))
    }
}

/// Summary-text scanner: compound pass first, code-window pass only when
/// the compound pass finds nothing.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    pub vocab: Vocabularies,
    pub base_url: String,
}

impl ChangeDetector {
    pub fn new(base_url: &str) -> Self {
        Self {
            vocab: Vocabularies::standard(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn detect(&self, text: &str, date: NaiveDate) -> Vec<DetectedEntry> {
        let normalized = normalize(text);

        let mut entries = primary::scan(&normalized, &self.vocab);
        if entries.is_empty() {
            debug!(date = %date, "compound pattern found nothing, running code-window pass");
            entries = fallback::scan(&normalized, &self.vocab);
        }

        for entry in &mut entries {
            entry.source_url = entry
                .document
                .map(|n| document_url(&self.base_url, entry.published.unwrap_or(date), n));
            info!(
                date = %date,
                document = ?entry.document,
                code = %entry.code,
                entity = entry.entity.as_deref().unwrap_or("-"),
                pass = ?entry.pass,
                "agreement entry detected"
            );
        }
        entries
    }
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new("https://www.bocm.es")
    }
}

/// Collapse line breaks and whitespace runs so multi-line entries read as one line.
pub fn normalize(text: &str) -> String {
    WS_RE.replace_all(text, " ").trim().to_string()
}

/// Byte offset `n` characters before `pos` (clamped at 0).
pub(crate) fn chars_back(text: &str, pos: usize, n: usize) -> usize {
    text[..pos]
        .char_indices()
        .rev()
        .nth(n.saturating_sub(1))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Byte offset `n` characters after `pos` (clamped at the end).
pub(crate) fn chars_forward(text: &str, pos: usize, n: usize) -> usize {
    text[pos..]
        .char_indices()
        .nth(n)
        .map(|(i, _)| pos + i)
        .unwrap_or(text.len())
}

pub(crate) fn parse_ref_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y%m%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    }

    const ACME: &str = "convenio colectivo de la empresa ACME, S.L. (Código número 28001234567890) \
                        texto adicional BOCM-20250101-12";

    #[test]
    fn acme_entry() {
        let entries = ChangeDetector::default().detect(ACME, date());
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert_eq!(e.code, "28001234567890");
        assert_eq!(e.document, Some(12));
        assert!(e.entity.as_deref().unwrap().contains("ACME"));
        assert_eq!(e.pass, DetectionPass::Primary);
        assert_eq!(
            e.source_url.as_deref(),
            Some("https://www.bocm.es/boletin/CM_Orden_BOCM/2025/01/01/BOCM-20250101-12.PDF")
        );
    }

    #[test]
    fn exclusion_vocabulary_wins() {
        let text = format!("convocatoria {ACME}");
        assert!(ChangeDetector::default().detect(&text, date()).is_empty());
    }

    #[test]
    fn multi_line_entries_are_joined() {
        let text = "RESOLUCIÓN sobre registro, depósito y publicación del\nconvenio colectivo de la\n\
                    empresa ACME, S.L. (Código\nnúmero 28001234567890).\nBOCM-20250101-12";
        let entries = ChangeDetector::default().detect(text, date());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].reason, ChangeReason::NewRegistration);
    }

    #[test]
    fn fallback_only_without_primary_hits() {
        // No "(código número …)" parenthesis, so the compound pattern cannot match.
        let text = "Acuerdo laboral de la empresa Beta Logística sobre salarios, \
                    código número 28009999999999, BOCM-20250101-40";
        let entries = ChangeDetector::default().detect(text, date());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].pass, DetectionPass::Fallback);
        assert_eq!(entries[0].code, "28009999999999");
        assert_eq!(entries[0].document, Some(40));

        // With a compound hit present, the same code-window text is ignored.
        let both = format!("{ACME} {text}");
        let entries = ChangeDetector::default().detect(&both, date());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].pass, DetectionPass::Primary);
    }

    #[test]
    fn knowledge_key_fallbacks() {
        let mut e = ChangeDetector::default().detect(ACME, date()).remove(0);
        assert_eq!(e.knowledge_key(date()), "ACME");
        e.entity = None;
        assert_eq!(e.knowledge_key(date()), "BOCM-20250101-12.PDF");
        e.document = None;
        assert_eq!(e.knowledge_key(date()), "codigo:28001234567890");
    }

    #[test]
    fn normalizes_whitespace() {
        assert_eq!(normalize("  a\n\n b\t\r\nc  "), "a b c");
    }

    #[test]
    fn char_offsets_respect_utf8() {
        let s = "ññññabc";
        let end = s.len();
        let back = chars_back(s, end, 4);
        assert_eq!(&s[back..], "ñabc");
        assert_eq!(chars_back(s, end, 100), 0);
        assert_eq!(&s[..chars_forward(s, 0, 2)], "ññ");
        assert_eq!(chars_forward(s, 0, 100), s.len());
    }
}
