//! Custom error types for translation operations

use thiserror::Error;

/// Failures surfaced by a translator backend for a single chunk
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranslationError {
    /// Provider kept answering 429 after the internal backoff
    #[error("Rate limit exceeded (HTTP 429) after backoff retry")]
    RateLimited,

    /// Non-2xx response other than 429
    #[error("Provider error: {status} - {body}")]
    ProviderError {
        status: u16,
        body: String,
    },

    /// Transport-level failure (connect, TLS, timeout)
    #[error("Network error: {message}")]
    NetworkError {
        message: String,
    },

    /// 2xx response that failed the completeness check twice
    #[error("Incomplete translation: {reason}")]
    IncompleteTranslation {
        reason: String,
    },

    /// 2xx response whose body could not be parsed
    #[error("Invalid response: {message}")]
    InvalidResponse {
        message: String,
    },

    /// Prompt template could not be rendered
    #[error("Invalid prompt template: {reason}")]
    InvalidPrompt {
        reason: String,
    },

    /// Backend selector names no known provider
    #[error("Unsupported API type: {api_type}")]
    UnsupportedApiType {
        api_type: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError {
        message: String,
    },
}

impl From<reqwest::Error> for TranslationError {
    fn from(err: reqwest::Error) -> Self {
        TranslationError::NetworkError {
            message: err.to_string(),
        }
    }
}

/// Run-level errors: fatal aborts plus the per-chunk exhaustion record
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Extracted text was empty after normalization
    #[error("Extracted text is empty, nothing to translate")]
    ExtractionEmpty,

    /// Chunker returned no chunks for non-empty text
    #[error("Chunking produced no chunks for {chars} characters of input")]
    ChunkingProducedEmpty {
        chars: usize,
    },

    /// A chunk failed every backend and orchestrator retry
    #[error("Chunk {index} exhausted after {attempts} attempts: {last_error}")]
    ChunkExhausted {
        index: usize,
        attempts: u32,
        last_error: String,
    },

    /// Run parameters rejected at the boundary
    #[error("Invalid request: {message}")]
    InvalidRequest {
        message: String,
    },

    /// Run was cancelled externally
    #[error("Translation cancelled before chunk {next_index}")]
    Cancelled {
        next_index: usize,
    },

    /// Backend could not be constructed
    #[error("Backend error: {0}")]
    Backend(#[from] TranslationError),

    /// Output store failure
    #[error("Storage error: {path} - {message}")]
    StorageError {
        path: String,
        message: String,
    },

    /// An output with this identifier is already stored
    #[error("Output already exists: {identifier}")]
    OutputExists {
        identifier: String,
    },
}

/// Result type for backend operations
pub type Result<T> = std::result::Result<T, TranslationError>;

/// Result type for pipeline runs
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
