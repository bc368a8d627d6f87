use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const FORBIDDEN: &[char] = &['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

pub const UNTITLED: &str = "Untitled video";

/// Strips characters that are invalid in file names on common platforms and
/// collapses whitespace runs to a single space.
pub fn clean_title(name: &str) -> String {
    let name: String = name.nfc().filter(|c| !FORBIDDEN.contains(c)).collect();
    WS_RE.replace_all(&name, " ").trim().to_string()
}

/// `clean_title`, falling back to a placeholder when nothing printable is left.
pub fn display_title(raw: Option<&str>) -> String {
    let cleaned = raw.map(clean_title).unwrap_or_default();
    if cleaned.is_empty() {
        UNTITLED.to_string()
    } else {
        cleaned
    }
}
