//! Doc Translator - chunked long-document translation library
//!
//! This library splits extracted document text into token-bounded chunks,
//! translates them one by one through a pluggable LLM backend and joins the
//! results into a single output document.

#![forbid(unsafe_code)]

pub mod cli;
pub mod core;
pub mod processors;

// Re-export key types for convenience
pub use core::{
    backend::{create_backend, ApiType, BackendSettings, TranslatorBackend},
    config::AppConfig,
    errors::{PipelineError, TranslationError},
    models::{AssembledResult, Chunk, Document, RunParams, RunResponse, RunState, TranslationOutcome},
    storage::{FsOutputStore, MemoryOutputStore, OutputStore},
};

pub use processors::{
    chunker::{TextChunker, TokenBudget},
    orchestrator::{cancel_pair, CancelHandle, CancelSignal, PipelineSettings, TranslationPipeline},
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
