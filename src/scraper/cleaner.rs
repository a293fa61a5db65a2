use crate::models::NOT_AVAILABLE;
use regex::Regex;
use std::sync::LazyLock;

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static COUNT_SUFFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(\d+\)$").unwrap());

// ── Text normalization ────────────────────────────────────────────────────────

/// Strip markup and collapse whitespace. Empty input collapses to "".
/// "  Fee:\n <b>Rs 500</b> " → "Fee: Rs 500"
pub fn collapse(text: &str) -> String {
    let stripped = TAG.replace_all(text, "");
    WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}

/// [`collapse`], with empty or absent input mapped to `N/A`.
pub fn normalize_text(text: Option<&str>) -> String {
    match text.map(collapse) {
        Some(s) if !s.is_empty() => s,
        _ => NOT_AVAILABLE.to_string(),
    }
}

// ── Filter labels ─────────────────────────────────────────────────────────────

/// Drop the trailing occurrence count from a sidebar label.
/// "Ministry of Finance (42)" → "Ministry of Finance"
pub fn canonical_filter_label(label: &str) -> String {
    let label = collapse(label);
    COUNT_SUFFIX.replace(&label, "").trim().to_string()
}

// ── Labeled values ────────────────────────────────────────────────────────────

/// Remove every occurrence of `label` (plus a colon right after it) from a
/// container's text.
/// "Application Fee : Rs 1,000" with "Fee" → "Application Rs 1,000"
pub fn strip_label(text: &str, label: &str) -> String {
    let pattern = format!(r"{}\s*:?", regex::escape(label));
    match Regex::new(&pattern) {
        Ok(re) => collapse(&re.replace_all(text, " ")),
        Err(_) => collapse(&text.replace(label, " ")),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
