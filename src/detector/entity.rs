//! Best-effort company/sector name extraction from free gazette text.
//!
//! Names are for human review and knowledge-base keys; they can come out
//! truncated or include stray words, and two notices for the same company
//! may yield slightly different names.

use std::sync::LazyLock;

use regex::Regex;

const MAX_NAME_CHARS: usize = 150;
const WINDOW_TOKENS: usize = 3;
const LEADING_NOISE: &[&str] = &["la", "el", "los", "las", "empresa", "compañía"];

/// Tried in order; group 1 is the name.
static ENTITY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // "empresa Boortmalt Spain, S. L."
        r"(?i)empresa\s+([^(),.;]{2,120}?),?\s+S\.\s?[AL]\.",
        // "empresa Municipal de Transportes de Fuenlabrada y ..."
        r"(?i)empresa\s+(?:municipal\s+de\s+transportes\s+de\s+)?([^(),.;]+?)(?:\s+(?:y|de|del)\s|[(),.;]|$)",
        // "convenio colectivo del sector de hostelería (código ..."
        r"(?i)convenio\s+colectivo\s+(?:de|del|para)\s+(?:la\s+empresa\s+)?([^(),.;]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

pub fn extract_entity(text: &str) -> Option<String> {
    ENTITY_PATTERNS
        .iter()
        .filter_map(|re| re.captures(text))
        .find_map(|caps| clean(&caps[1]))
        .or_else(|| token_window(text))
}

/// Words right after "empresa" or "convenio".
fn token_window(text: &str) -> Option<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= 3 {
        return None;
    }
    let i = words.iter().position(|w| {
        let w = w.to_lowercase();
        w == "empresa" || w == "convenio"
    })?;
    let tail = words.get(i + 1..(i + 1 + WINDOW_TOKENS).min(words.len()))?;
    clean(&tail.join(" "))
}

fn clean(raw: &str) -> Option<String> {
    let mut words: Vec<&str> = raw.split_whitespace().collect();
    while let Some(first) = words.first() {
        if LEADING_NOISE.contains(&first.to_lowercase().as_str()) {
            words.remove(0);
        } else {
            break;
        }
    }
    let joined = words.join(" ");
    let trimmed = joined.trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace());
    if trimmed.chars().count() < 2 {
        return None;
    }
    Some(trimmed.chars().take(MAX_NAME_CHARS).collect::<String>().trim_end().to_string())
}
