//! Core data models for translation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Extracted plain text plus the languages it is translated between
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Original file name, used to derive the output identifier
    pub name: String,
    pub text: String,
    pub source_lang: String,
    pub target_lang: String,
}

impl Document {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            source_lang: DEFAULT_SOURCE_LANG.to_string(),
            target_lang: DEFAULT_TARGET_LANG.to_string(),
        }
    }

    pub fn with_languages(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.source_lang = source.into();
        self.target_lang = target.into();
        self
    }
}

/// Default source language when the caller gives none
pub const DEFAULT_SOURCE_LANG: &str = "English";

/// Default target language when the caller gives none
pub const DEFAULT_TARGET_LANG: &str = "Chinese";

/// A token-bounded slice of the document
///
/// `span` is the byte range in the (normalized) source text that this chunk
/// was cut from; `body` is that slice with the boundary whitespace trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    /// Body of the previous chunk, empty for the first one
    pub context: String,
    pub body: String,
    pub span: Range<usize>,
}

impl Chunk {
    /// Character count of the body
    pub fn len(&self) -> usize {
        self.body.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// First `max_chars` characters of the body
    pub fn preview(&self, max_chars: usize) -> &str {
        match self.body.char_indices().nth(max_chars) {
            Some((idx, _)) => &self.body[..idx],
            None => &self.body,
        }
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Chunk {{ index: {}, span: {}..{}, chars: {} }}",
            self.index,
            self.span.start,
            self.span.end,
            self.len()
        )
    }
}

/// Translation request handed to a backend for one chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationRequest {
    pub text: String,
    /// Previous chunk text, an optional continuity hint
    pub context: Option<String>,
    pub source_lang: String,
    pub target_lang: String,
    pub model: String,
    pub system_prompt: Option<String>,
    pub user_prompt: Option<String>,
    pub temperature: f32,
}

impl TranslationRequest {
    pub fn new(text: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            context: None,
            source_lang: DEFAULT_SOURCE_LANG.to_string(),
            target_lang: DEFAULT_TARGET_LANG.to_string(),
            model: model.into(),
            system_prompt: None,
            user_prompt: None,
            temperature: 1.0,
        }
    }

    /// Build the request for a chunk of `document`
    pub fn for_chunk(chunk: &Chunk, document: &Document, params: &RunParams) -> Self {
        let context = if chunk.context.is_empty() {
            None
        } else {
            Some(chunk.context.clone())
        };

        Self {
            text: chunk.body.clone(),
            context,
            source_lang: document.source_lang.clone(),
            target_lang: document.target_lang.clone(),
            model: params.model.clone(),
            system_prompt: params.system_prompt.clone(),
            user_prompt: params.user_prompt.clone(),
            temperature: params.temperature,
        }
    }

    pub fn with_languages(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.source_lang = source.into();
        self.target_lang = target.into();
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_prompts(mut self, system: Option<String>, user: Option<String>) -> Self {
        self.system_prompt = system;
        self.user_prompt = user;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Successful backend reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendReply {
    pub translation: String,
    /// Provider-reported token usage, 0 when the provider omits it
    pub tokens_used: usize,
}

impl BackendReply {
    pub fn new(translation: impl Into<String>) -> Self {
        Self {
            translation: translation.into(),
            tokens_used: 0,
        }
    }
}

/// Parameters of one pipeline run, as received from the hosting layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunParams {
    pub api_type: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub system_prompt: Option<String>,
    pub user_prompt: Option<String>,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            api_type: "deepseek".to_string(),
            api_key: String::new(),
            model: String::new(),
            temperature: 1.0,
            system_prompt: None,
            user_prompt: None,
        }
    }
}

/// Per-chunk status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeStatus {
    Success,
    Failed,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeStatus::Success => write!(f, "success"),
            OutcomeStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Recorded result of translating one chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationOutcome {
    pub index: usize,
    pub status: OutcomeStatus,
    /// Translation, or the untranslated placeholder on failure
    pub text: String,
    pub tokens_used: usize,
}

/// Marker that opens every untranslated placeholder
pub const FAILURE_MARKER: &str = "[TRANSLATION FAILED]";

/// Number of source characters embedded in a placeholder
pub const PLACEHOLDER_PREFIX_CHARS: usize = 100;

impl TranslationOutcome {
    pub fn success(index: usize, reply: BackendReply) -> Self {
        Self {
            index,
            status: OutcomeStatus::Success,
            text: reply.translation,
            tokens_used: reply.tokens_used,
        }
    }

    /// Deterministic placeholder for a chunk that could not be translated
    pub fn failed(chunk: &Chunk) -> Self {
        Self {
            index: chunk.index,
            status: OutcomeStatus::Failed,
            text: format!("{} {}...", FAILURE_MARKER, chunk.preview(PLACEHOLDER_PREFIX_CHARS)),
            tokens_used: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// Summary of a completed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembledResult {
    pub success: bool,
    pub message: String,
    pub output_text: String,
    pub output_identifier: String,
    pub total_chunks: usize,
    pub failed_chunks: usize,
    pub tokens_used: usize,
}

/// What the hosting layer receives for a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunResponse {
    Completed {
        success: bool,
        message: String,
        output_file: String,
        failed_chunks: usize,
    },
    Error {
        error: String,
    },
}

impl<E: fmt::Display> From<Result<AssembledResult, E>> for RunResponse {
    fn from(result: Result<AssembledResult, E>) -> Self {
        match result {
            Ok(assembled) => RunResponse::Completed {
                success: assembled.success,
                message: assembled.message,
                output_file: assembled.output_identifier,
                failed_chunks: assembled.failed_chunks,
            },
            Err(e) => RunResponse::Error {
                error: e.to_string(),
            },
        }
    }
}

/// Run lifecycle, reported to progress observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Pending,
    Chunking,
    Translating { index: usize, total: usize },
    Assembling,
    Done { failed_chunks: usize },
    Failed { reason: String },
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Pending => write!(f, "pending"),
            RunState::Chunking => write!(f, "chunking"),
            RunState::Translating { index, total } => {
                write!(f, "translating {}/{}", index + 1, total)
            }
            RunState::Assembling => write!(f, "assembling"),
            RunState::Done { failed_chunks } => write!(f, "done ({} failed)", failed_chunks),
            RunState::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}
