//! Heuristic check that a provider reply is a whole translation

use crate::core::models::FAILURE_MARKER;

/// Minimum translated/source character ratio
const MIN_LENGTH_RATIO: f64 = 0.1;

/// Minimum translated/source paragraph ratio
const MIN_PARAGRAPH_RATIO: f64 = 0.3;

/// Markers that never belong in a finished translation
const ERROR_MARKERS: &[&str] = &[FAILURE_MARKER, "[ERROR]"];

/// Returns `Err(reason)` when `translated` looks truncated or broken
pub fn check(source: &str, translated: &str) -> Result<(), String> {
    if translated.trim().is_empty() {
        return Err("empty translation".to_string());
    }

    let source_chars = source.chars().count();
    let translated_chars = translated.chars().count();
    if (translated_chars as f64) < source_chars as f64 * MIN_LENGTH_RATIO {
        return Err(format!(
            "translation too short ({} chars for {} source chars)",
            translated_chars, source_chars
        ));
    }

    let trimmed = translated.trim_end();
    let source_trimmed = source.trim_end();
    let ellipsis = |s: &str| s.ends_with("...") || s.ends_with('…');
    if ellipsis(trimmed) && !ellipsis(source_trimmed) {
        return Err("translation ends with an ellipsis".to_string());
    }

    let source_paragraphs = source.split("\n\n").count();
    let translated_paragraphs = translated.split("\n\n").count();
    if (translated_paragraphs as f64) < source_paragraphs as f64 * MIN_PARAGRAPH_RATIO {
        return Err(format!(
            "paragraphs dropped ({} of {})",
            translated_paragraphs, source_paragraphs
        ));
    }

    if let Some(marker) = ERROR_MARKERS.iter().find(|m| translated.contains(*m)) {
        return Err(format!("translation contains {}", marker));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_translation_passes() {
        assert!(check("Hello world.\n\nGoodbye.", "你好，世界。\n\n再见。").is_ok());
    }

    #[test]
    fn test_empty_and_short_replies_fail() {
        assert!(check("Hello", "   ").is_err());
        let source = "word ".repeat(100);
        assert!(check(&source, "词").is_err());
    }

    #[test]
    fn test_trailing_ellipsis() {
        assert!(check("The story continues.", "故事还在继续...").is_err());
        assert!(check("The story continues…", "故事还在继续…").is_ok());
    }

    #[test]
    fn test_dropped_paragraphs() {
        let source = vec!["Paragraph."; 10].join("\n\n");
        assert!(check(&source, "只有一段，其余的都丢失了，这里写得长一点。").is_err());
    }

    #[test]
    fn test_error_markers() {
        assert!(check("Hello there", "[ERROR] upstream").is_err());
        assert!(check("Hello there", "[TRANSLATION FAILED] Hello").is_err());
    }
}
