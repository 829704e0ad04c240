//! Code-window pass. Runs only when the compound pass found nothing: every
//! bare registration code is kept if the text around it reads like a labor
//! agreement and not like an administrative notice.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::entity::extract_entity;
use super::vocab::{contains_any, first_match, Vocabularies};
use super::{chars_back, chars_forward, parse_ref_date, ChangeReason, DetectedEntry, DetectionPass, DOC_REF_RE};

const WINDOW_BEFORE: usize = 200;
const WINDOW_AFTER: usize = 100;

static CODE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)registro,\s*dep[óo]sito\s*y\s*publicaci[óo]n.*?c[óo]digo\s*n[úu]mero\s*(\d{14})\b",
        r"(?i)sobre\s*registro,\s*dep[óo]sito\s*y\s*publicaci[óo]n.*?\(c[óo]digo\s*n[úu]mero\s*(\d{14})\)",
        r"(?i)convenio\s*colectivo.*?\(c[óo]digo\s*n[úu]mero\s*(\d{14})\)",
        r"(?i)convenio\s*colectivo.*?c[óo]digo\s*n[úu]mero\s*(\d{14})\b",
        r"(?i)empresa\s+[^,]+,\s*[^,]+\s*\(c[óo]digo\s*n[úu]mero\s*(\d{14})\)",
        r"(?i)c[óo]digo\s*n[úu]mero\s*(\d{14})\b",
        r"(?i)\(c[óo]digo\s*n[úu]mero\s*(\d{14})\)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

pub fn scan(text: &str, vocab: &Vocabularies) -> Vec<DetectedEntry> {
    let ref_ends: Vec<usize> = DOC_REF_RE.find_iter(text).map(|m| m.end()).collect();

    let mut seen: HashSet<String> = HashSet::new();
    let mut entries = Vec::new();

    for re in CODE_PATTERNS.iter() {
        for caps in re.captures_iter(text) {
            let Some(code_match) = caps.get(1) else {
                continue;
            };
            let code = code_match.as_str();
            if seen.contains(code) {
                continue;
            }

            // Window around the code, not reaching back into the previous entry.
            let pos = code_match.start();
            let entry_start = ref_ends
                .iter()
                .take_while(|end| **end <= pos)
                .last()
                .copied()
                .unwrap_or(0);
            let from = entry_start.max(chars_back(text, pos, WINDOW_BEFORE));
            let to = chars_forward(text, pos, WINDOW_AFTER);
            let window = text[from..to].trim();
            let lowered = window.to_lowercase();

            if !contains_any(&lowered, vocab.confirming) {
                continue;
            }
            if let Some(term) = first_match(&lowered, vocab.excluding) {
                debug!(code, term, "code window excluded");
                continue;
            }

            // Reference printed after the code, within the window.
            let doc_ref = DOC_REF_RE
                .captures(&text[code_match.end()..to])
                .map(|c| (parse_ref_date(&c[1]), c[2].parse::<u32>().ok()));
            let (published, document) = doc_ref.unwrap_or((None, None));

            seen.insert(code.to_string());
            entries.push(DetectedEntry {
                document,
                published,
                description: window.to_string(),
                code: code.to_string(),
                entity: extract_entity(window),
                reason: ChangeReason::classify(window),
                source_url: None,
                pass: DetectionPass::Fallback,
            });
        }
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
    fn needs_confirming_vocabulary() {
        let text = "Anuncio de obras, expediente con código número 28000000000010. BOCM-20250524-20";
        assert!(scan_text(text).is_empty());

        let text = "Acuerdo de empresa para la plantilla, código número 28000000000010. BOCM-20250524-20";
        let entries = scan_text(text);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].document, Some(20));
        assert_eq!(entries[0].pass, DetectionPass::Fallback);
    }

    #[test]
    fn deduplicates_by_code_across_patterns() {
        // Matches the registro pattern, the convenio pattern and the bare pattern.
        let text = "sobre registro, depósito y publicación del convenio colectivo de Zeta \
                    (código número 28000000000011) sin referencia";
        let entries = scan_text(text);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].code, "28000000000011");
        assert_eq!(entries[0].document, None);
        assert_eq!(entries[0].reason, ChangeReason::NewRegistration);
    }

    #[test]
    fn window_does_not_borrow_confirmation_from_previous_entry() {
        let text = "Convenio colectivo de Omega. BOCM-20250524-30 \
                    Licitación de suministros, código número 28000000000012. BOCM-20250524-31";
        assert!(scan_text(text).is_empty());
    }

    #[test]
    fn longer_digit_runs_are_not_codes() {
        let text = "Convenio colectivo de la empresa Zeta, código número 280000000000141516. BOCM-20250524-21";
        assert!(scan_text(text).is_empty());
    }

    #[test]
    fn excluded_windows_are_dropped() {
        let text = "Convocatoria de subvenciones del convenio colectivo, código número 28000000000013";
        assert!(scan_text(text).is_empty());
    }
}
