//! Token-bounded chunking of extracted text
//!
//! The token budget is approximated from characters:
//! `max_chars = max_tokens * chars_per_token`. No tokenizer is involved.
//!
//! Each chunk is cut at the last natural boundary that fits the budget,
//! trying in order:
//!
//! ```text
//! 1. paragraph break   "\n\n"
//! 2. sentence end      ". " "? " "! " "。" "！" "？"
//! 3. line break        "\n"
//! 4. whitespace        " "
//! 5. forced cut at max_chars (unbroken runs)
//! ```
//!
//! Chunk bodies are the cut slices with whitespace trimmed at both ends; that
//! trimming is the only normalization. `Chunk::span` keeps the exact byte
//! range, so `text[span].trim() == body` and the spans tile the input.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use tracing::debug;

use crate::core::errors::{PipelineError, PipelineResult};
use crate::core::models::Chunk;

/// Characters per token for alphabetic scripts
pub const DEFAULT_CHARS_PER_TOKEN: usize = 4;

/// Characters per token for Chinese, Japanese and Korean
pub const CJK_CHARS_PER_TOKEN: usize = 1;

/// Chunk size budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBudget {
    pub max_tokens: usize,
    pub chars_per_token: usize,
}

impl TokenBudget {
    pub fn new(max_tokens: usize, chars_per_token: usize) -> Self {
        Self {
            max_tokens,
            chars_per_token,
        }
    }

    /// Budget with the ratio chosen from the source language name or code
    pub fn for_language(max_tokens: usize, source_lang: &str) -> Self {
        let chars_per_token = if is_cjk_language(source_lang) {
            CJK_CHARS_PER_TOKEN
        } else {
            DEFAULT_CHARS_PER_TOKEN
        };
        Self::new(max_tokens, chars_per_token)
    }

    /// Upper bound on characters per chunk body
    pub fn max_chars(&self) -> usize {
        self.max_tokens.saturating_mul(self.chars_per_token)
    }
}

impl fmt::Display for TokenBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tokens x {} chars/token",
            self.max_tokens, self.chars_per_token
        )
    }
}

fn is_cjk_language(lang: &str) -> bool {
    let lang = lang.trim().to_lowercase();
    let code = lang.split(['-', '_']).next().unwrap_or("");
    matches!(code, "zh" | "ja" | "ko")
        || ["chinese", "japanese", "korean", "中文", "汉语", "日语", "日文", "韩语", "韩文"]
            .iter()
            .any(|name| lang.contains(name))
}

/// Boundary patterns, coarsest first
static BOUNDARIES: Lazy<Vec<(BoundaryKind, Regex)>> = Lazy::new(|| {
    vec![
        (BoundaryKind::Paragraph, r"\n[ \t]*\n"),
        (
            BoundaryKind::Sentence,
            r#"(?:[.!?…]["'”’)\]]*\s+|[。！？]["'”’」』）]*)"#,
        ),
        (BoundaryKind::Line, r"\n"),
        (BoundaryKind::Word, r"\s+"),
    ]
    .into_iter()
    .map(|(kind, pattern)| (kind, Regex::new(pattern).expect("valid boundary regex")))
    .collect()
});

/// Kind of boundary a chunk was cut at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryKind {
    Paragraph,
    Sentence,
    Line,
    Word,
    Forced,
    End,
}

/// Splits text into chunks that fit a [`TokenBudget`]
#[derive(Debug, Clone)]
pub struct TextChunker {
    budget: TokenBudget,
}

impl TextChunker {
    /// Create a chunker, rejecting empty budgets
    pub fn new(budget: TokenBudget) -> PipelineResult<Self> {
        if budget.max_chars() == 0 {
            return Err(PipelineError::InvalidRequest {
                message: format!("chunk budget must be positive ({})", budget),
            });
        }
        Ok(Self { budget })
    }

    pub fn budget(&self) -> TokenBudget {
        self.budget
    }

    /// Split `text` into ordered chunks; empty input yields no chunks
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut span_start = 0;

        for (piece, kind) in self.cut_points(text) {
            let body = text[piece.clone()].trim();

            if body.is_empty() {
                // Whitespace-only piece joins the previous span, or the next one
                if let Some(last) = chunks.last_mut() {
                    last.span.end = piece.end;
                    span_start = piece.end;
                }
                continue;
            }

            let context = chunks.last().map(|c| c.body.clone()).unwrap_or_default();
            debug!(
                "chunk {} cut at {:?} boundary ({} chars)",
                chunks.len(),
                kind,
                body.chars().count()
            );
            chunks.push(Chunk {
                index: chunks.len(),
                context,
                body: body.to_string(),
                span: span_start..piece.end,
            });
            span_start = piece.end;
        }

        chunks
    }

    /// Contiguous byte ranges covering `text`, each at most `max_chars` chars
    fn cut_points(&self, text: &str) -> Vec<(Range<usize>, BoundaryKind)> {
        let max_chars = self.budget.max_chars();
        let mut pieces = Vec::new();
        let mut start = 0;

        while start < text.len() {
            let rest = &text[start..];
            let window_end = match rest.char_indices().nth(max_chars) {
                Some((idx, _)) => idx,
                None => {
                    pieces.push((start..text.len(), BoundaryKind::End));
                    break;
                }
            };

            let window = &rest[..window_end];
            let (cut, kind) =
                find_boundary(window).unwrap_or((window_end, BoundaryKind::Forced));

            pieces.push((start..start + cut, kind));
            start += cut;
        }

        pieces
    }
}

/// Last boundary in `window` that leaves non-whitespace text before it
fn find_boundary(window: &str) -> Option<(usize, BoundaryKind)> {
    BOUNDARIES.iter().find_map(|(kind, regex)| {
        regex
            .find_iter(window)
            .map(|m| m.end())
            .filter(|&end| !window[..end].trim().is_empty())
            .last()
            .map(|end| (end, *kind))
    })
}

/// Chunk `text` with a fixed token budget
pub fn chunk_text(text: &str, budget: TokenBudget) -> PipelineResult<Vec<Chunk>> {
    Ok(TextChunker::new(budget)?.chunk(text))
}
