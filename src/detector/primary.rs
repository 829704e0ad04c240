//! Compound pass: "convenio colectivo … (código número <14d>) … BOCM-<date>-<n>"
//! in one match. Few false positives; misses entries laid out differently.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::entity::extract_entity;
use super::vocab::{first_match, Vocabularies};
use super::{chars_back, parse_ref_date, ChangeReason, DetectedEntry, DetectionPass, DOC_REF_RE};

/// How far back before "convenio colectivo" an entry's heading may start.
const LEAD_IN_CHARS: usize = 300;

static COMPOUND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)convenio\s+colectivo[^(]+\(\s*c[óo]digo\s+n[úu]mero\s+(\d{14})\s*\)[^()]*?BOCM-(\d{8})-(\d+)",
    )
    .unwrap()
});

static AGREEMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)convenio\s+colectivo").unwrap());

/// Scan normalized summary text. Source URLs are left for the caller.
pub fn scan(text: &str, vocab: &Vocabularies) -> Vec<DetectedEntry> {
    // End offsets of every document reference; an entry starts after the previous one.
    let ref_ends: Vec<usize> = DOC_REF_RE.find_iter(text).map(|m| m.end()).collect();

    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for caps in COMPOUND_RE.captures_iter(text) {
        let (Some(whole), Some(code)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let code_at = code.start();

        // `[^(]+` can run across earlier entries that had no code; clip to
        // the entry this code belongs to.
        let entry_start = ref_ends
            .iter()
            .take_while(|end| **end <= code_at)
            .last()
            .copied()
            .unwrap_or(0);
        let start = entry_start.max(chars_back(text, whole.start(), LEAD_IN_CHARS));
        let description = text[start..whole.end()].trim();

        if !AGREEMENT_RE.is_match(description) {
            continue;
        }

        let lowered = description.to_lowercase();
        if let Some(term) = first_match(&lowered, vocab.excluding) {
            debug!(term, "entry excluded");
            continue;
        }

        let code = code.as_str().to_string();
        let document = caps[3].parse::<u32>().ok();
        if !seen.insert((code.clone(), document)) {
            continue;
        }

        entries.push(DetectedEntry {
            document,
            published: parse_ref_date(&caps[2]),
            description: description.to_string(),
            entity: extract_entity(description),
            reason: ChangeReason::classify(description),
            code,
            source_url: None,
            pass: DetectionPass::Primary,
        });
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::normalize;

    fn scan_text(text: &str) -> Vec<DetectedEntry> {
        scan(&normalize(text), &Vocabularies::standard())
    }

    #[test]
    fn several_entries_in_one_summary() {
        let text = "\
            RESOLUCIÓN de 2 de mayo de 2025, sobre registro, depósito y publicación del convenio colectivo \
            de la empresa Boortmalt Spain, S. L. (código número 28104212012023). BOCM-20250524-3 \
            RESOLUCIÓN de 5 de mayo de 2025, sobre modificación del convenio colectivo de la empresa \
            Coordinadora Integral Óptica de Servicios Agrupados, S. L. (código número 28101122012019). BOCM-20250524-4";
        let entries = scan_text(text);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].document, Some(3));
        assert_eq!(entries[0].entity.as_deref(), Some("Boortmalt Spain"));
        assert_eq!(entries[0].reason, ChangeReason::NewRegistration);
        assert_eq!(entries[1].document, Some(4));
        assert_eq!(entries[1].code, "28101122012019");
        assert_eq!(entries[1].reason, ChangeReason::CodeModification);
        assert!(!entries[1].description.contains("Boortmalt"));
    }

    #[test]
    fn entry_without_code_does_not_swallow_the_next() {
        let text = "\
            ORDEN relativa al convenio colectivo del sector sin código. BOCM-20250524-7 \
            RESOLUCIÓN sobre el convenio colectivo de la empresa Gamma, S. A. (código número 28000000000001). BOCM-20250524-8";
        let entries = scan_text(text);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].document, Some(8));
        assert_eq!(entries[0].entity.as_deref(), Some("Gamma"));
        assert!(!entries[0].description.contains("sin código"));
    }

    #[test]
    fn collaboration_agreements_are_excluded() {
        let text = "Convenio de colaboración y convenio colectivo marco (código número 28000000000002) BOCM-20250524-9";
        assert!(scan_text(text).is_empty());
    }

    #[test]
    fn uppercase_headings_match() {
        let text = "CONVENIO COLECTIVO DE LA EMPRESA DELTA, S. L. (CÓDIGO NÚMERO 28000000000003) BOCM-20250524-10";
        let entries = scan_text(text);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entity.as_deref(), Some("DELTA"));
    }

    #[test]
    fn repeated_reference_is_reported_once() {
        let one = "convenio colectivo de la empresa Eta, S. L. (código número 28000000000004) BOCM-20250524-11";
        let entries = scan_text(&format!("{one} {one}"));
        assert_eq!(entries.len(), 1);
    }
}
