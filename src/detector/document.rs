use std::sync::LazyLock;

use regex::Regex;

const MAX_TITLE_CHARS: usize = 200;

/// Registration code inside a full agreement document, most specific first.
static CODE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)c[óo]digo\s+n[úu]mero\s+(\d{14})\b",
        r"(?i)c[óo]digo\s+(?:de\s+convenio\s+)?n[úu]mero\s+(?:\w+\.)?\s*(\d{5,14})\b",
        r"(?i)\(c[óo]digo\s+(?:n[úu]mero\s+)?(\d{5,14})\)",
        r"(?is)BOCM-\d{8}-\d+.*?c[óo]digo\s+(\d{5,14})\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)convenio\s+colectivo\s+de(?:\s+la)?\s+empresa\s+([^(,\n]+)").unwrap()
});

/// Registration code of an agreement document.
pub fn extract_code(text: &str) -> Option<String> {
    CODE_PATTERNS
        .iter()
        .find_map(|re| re.captures(text).map(|c| c[1].to_string()))
}

/// Agreement name as printed in the document heading.
pub fn extract_title(text: &str) -> Option<String> {
    let caps = TITLE_RE.captures(text)?;
    let name: String = caps[1]
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_TITLE_CHARS)
        .collect();
    let name = name.trim().to_string();
    (!name.is_empty()).then_some(name)
}
