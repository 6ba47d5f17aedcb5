//! Normalization of extracted plain text before chunking

use once_cell::sync::Lazy;
use regex::Regex;

/// C0 control characters other than tab and newline, plus DEL
static CONTROL_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").expect("valid regex"));

/// Three or more consecutive newlines
static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Unify line endings, drop control characters, collapse blank-line runs, trim
///
/// Paragraph structure (`\n\n`) and all interior spacing are preserved.
pub fn normalize(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let cleaned = CONTROL_CHARS.replace_all(&unified, "");
    let collapsed = BLANK_RUNS.replace_all(&cleaned, "\n\n");
    collapsed.trim().to_string()
}
