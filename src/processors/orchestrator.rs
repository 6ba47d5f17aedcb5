//! Sequential chunk-by-chunk translation of a document
//!
//! A run normalizes the text, chunks it, translates every chunk in order with
//! one orchestrator-level retry per chunk, pauses between chunks and hands the
//! outcomes to the [`ResultAssembler`]. A chunk that still fails after its
//! retry becomes a placeholder; only empty input, invalid parameters, storage
//! failures and cancellation abort the run.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::core::backend::{create_backend, BackendSettings, TranslatorBackend};
use crate::core::errors::{PipelineError, PipelineResult, TranslationError};
use crate::core::models::{
    AssembledResult, BackendReply, Chunk, Document, RunParams, RunState, TranslationOutcome,
    TranslationRequest,
};
use crate::core::prompts::{validate_template, PromptRole};
use crate::core::retry::RetryPolicy;
use crate::core::storage::OutputStore;
use crate::processors::assembler::ResultAssembler;
use crate::processors::chunker::{TextChunker, TokenBudget};
use crate::processors::text::normalize;

/// Pacing and chunking knobs of a run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub budget: TokenBudget,
    /// Pause between consecutive chunks
    pub spacing: Duration,
    /// Orchestrator-level retry per chunk
    pub retry: RetryPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            budget: TokenBudget::for_language(2000, "English"),
            spacing: Duration::from_secs(2),
            retry: RetryPolicy::once(Duration::from_secs(2)),
        }
    }
}

/// Observer of run state transitions
pub type ProgressFn = Arc<dyn Fn(&RunState) + Send + Sync>;

/// Requests cancellation of the runs holding the paired [`CancelSignal`]
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Cancellation flag observed by a run
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that is never raised
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // Handle dropped without cancelling
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Create a connected cancel handle and signal
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: Arc::new(tx) }, CancelSignal { rx })
}

/// Drives one document through chunking, translation and assembly
#[derive(Clone)]
pub struct TranslationPipeline {
    settings: PipelineSettings,
    assembler: ResultAssembler,
    progress: Option<ProgressFn>,
}

impl TranslationPipeline {
    pub fn new(settings: PipelineSettings, store: Arc<dyn OutputStore>) -> Self {
        Self {
            settings,
            assembler: ResultAssembler::new(store),
            progress: None,
        }
    }

    /// Report state transitions to `progress`
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Translate `document` with the backend named by `params.api_type`
    pub async fn run(
        &self,
        document: &Document,
        params: &RunParams,
        backend_settings: &BackendSettings,
        cancel: CancelSignal,
    ) -> PipelineResult<AssembledResult> {
        let backend = match build_backend(params, backend_settings) {
            Ok(backend) => backend,
            Err(e) => return self.fail(e),
        };

        self.run_with_backend(backend.as_ref(), document, params, cancel)
            .await
    }

    /// Translate `document.text` as one message with the backend named by `params.api_type`
    pub async fn translate_text(
        &self,
        document: &Document,
        params: &RunParams,
        backend_settings: &BackendSettings,
        cancel: CancelSignal,
    ) -> PipelineResult<BackendReply> {
        let backend = build_backend(params, backend_settings)?;
        self.translate_text_with_backend(backend.as_ref(), document, params, cancel)
            .await
    }

    /// One backend call for the whole of `document.text`
    ///
    /// No chunking, spacing, orchestrator retry or storage; the reply is
    /// returned to the caller as is.
    pub async fn translate_text_with_backend(
        &self,
        backend: &dyn TranslatorBackend,
        document: &Document,
        params: &RunParams,
        mut cancel: CancelSignal,
    ) -> PipelineResult<BackendReply> {
        validate_params(params)?;

        let text = normalize(&document.text);
        if text.is_empty() {
            return Err(PipelineError::ExtractionEmpty);
        }

        let request = TranslationRequest::new(text, params.model.clone())
            .with_languages(document.source_lang.clone(), document.target_lang.clone())
            .with_prompts(params.system_prompt.clone(), params.user_prompt.clone())
            .with_temperature(params.temperature);

        let reply = tokio::select! {
            reply = backend.translate(&request) => reply?,
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled { next_index: 0 }),
        };

        if reply.translation.trim().is_empty() {
            return Err(TranslationError::InvalidResponse {
                message: "empty translation".to_string(),
            }
            .into());
        }

        info!(
            "Translated message via {} ({} tokens)",
            backend.name(),
            reply.tokens_used
        );
        Ok(reply)
    }

    /// Translate `document` with an already constructed backend
    pub async fn run_with_backend(
        &self,
        backend: &dyn TranslatorBackend,
        document: &Document,
        params: &RunParams,
        cancel: CancelSignal,
    ) -> PipelineResult<AssembledResult> {
        match self.execute(backend, document, params, cancel).await {
            Ok(result) => {
                self.report(RunState::Done {
                    failed_chunks: result.failed_chunks,
                });
                Ok(result)
            }
            Err(e) => self.fail(e),
        }
    }

    async fn execute(
        &self,
        backend: &dyn TranslatorBackend,
        document: &Document,
        params: &RunParams,
        mut cancel: CancelSignal,
    ) -> PipelineResult<AssembledResult> {
        self.report(RunState::Pending);
        validate_params(params)?;

        let text = normalize(&document.text);
        if text.is_empty() {
            return Err(PipelineError::ExtractionEmpty);
        }

        self.report(RunState::Chunking);
        let chunks = TextChunker::new(self.settings.budget)?.chunk(&text);
        if chunks.is_empty() {
            return Err(PipelineError::ChunkingProducedEmpty {
                chars: text.chars().count(),
            });
        }

        let total = chunks.len();
        info!(
            "Translating {} ({} chars, {} chunks) via {} [{}]",
            document.name,
            text.chars().count(),
            total,
            backend.name(),
            self.settings.budget
        );

        let mut outcomes = Vec::with_capacity(total);
        for chunk in &chunks {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled {
                    next_index: chunk.index,
                });
            }

            self.report(RunState::Translating {
                index: chunk.index,
                total,
            });

            let outcome = self
                .translate_chunk(backend, chunk, document, params, &mut cancel)
                .await?;
            outcomes.push(outcome);

            let next_index = chunk.index + 1;
            if next_index < total && !pause(self.settings.spacing, &mut cancel).await {
                return Err(PipelineError::Cancelled { next_index });
            }
        }

        self.report(RunState::Assembling);
        self.assembler.assemble(&document.name, &outcomes).await
    }

    /// Translate one chunk, retrying per the retry policy
    ///
    /// Only cancellation is an error; exhausted chunks yield a failed outcome.
    async fn translate_chunk(
        &self,
        backend: &dyn TranslatorBackend,
        chunk: &Chunk,
        document: &Document,
        params: &RunParams,
        cancel: &mut CancelSignal,
    ) -> PipelineResult<TranslationOutcome> {
        if chunk.body.trim().is_empty() {
            return Ok(TranslationOutcome::success(
                chunk.index,
                BackendReply::new(chunk.body.clone()),
            ));
        }

        let request = TranslationRequest::for_chunk(chunk, document, params);
        let mut attempts = 0;

        let last_error = loop {
            attempts += 1;
            debug!("chunk {} attempt {}: {}", chunk.index, attempts, chunk);

            // Dropping the in-flight call also drops its internal backoff
            let attempt = tokio::select! {
                attempt = backend.translate(&request) => attempt,
                _ = cancel.cancelled() => {
                    return Err(PipelineError::Cancelled {
                        next_index: chunk.index,
                    });
                }
            };

            let failure = match attempt {
                Ok(reply) if !reply.translation.trim().is_empty() => {
                    return Ok(TranslationOutcome::success(chunk.index, reply));
                }
                Ok(_) => "empty translation".to_string(),
                Err(e) => e.to_string(),
            };

            match self.settings.retry.next_delay(attempts) {
                Some(delay) => {
                    warn!(
                        "Chunk {} failed ({}), retrying in {:?}",
                        chunk.index, failure, delay
                    );
                    if !pause(delay, cancel).await {
                        return Err(PipelineError::Cancelled {
                            next_index: chunk.index,
                        });
                    }
                }
                None => break failure,
            }
        };

        let exhausted = PipelineError::ChunkExhausted {
            index: chunk.index,
            attempts,
            last_error,
        };
        error!("{}; keeping placeholder", exhausted);

        Ok(TranslationOutcome::failed(chunk))
    }

    fn report(&self, state: RunState) {
        debug!("run state: {}", state);
        if let Some(progress) = &self.progress {
            progress(&state);
        }
    }

    fn fail(&self, e: PipelineError) -> PipelineResult<AssembledResult> {
        error!("Translation run failed: {}", e);
        self.report(RunState::Failed {
            reason: e.to_string(),
        });
        Err(e)
    }
}

/// Backend for `params`, rejecting a missing key or unknown provider
fn build_backend(
    params: &RunParams,
    backend_settings: &BackendSettings,
) -> PipelineResult<Arc<dyn TranslatorBackend>> {
    if params.api_key.trim().is_empty() {
        return Err(PipelineError::InvalidRequest {
            message: "API key is required".to_string(),
        });
    }

    create_backend(&params.api_type, &params.api_key, backend_settings).map_err(|e| {
        PipelineError::InvalidRequest {
            message: e.to_string(),
        }
    })
}

/// Sleep for `duration`; false if cancelled first
async fn pause(duration: Duration, cancel: &mut CancelSignal) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = cancel.cancelled() => false,
    }
}

/// Reject parameters no backend call could succeed with
fn validate_params(params: &RunParams) -> PipelineResult<()> {
    let invalid = |message: String| PipelineError::InvalidRequest { message };

    if params.model.trim().is_empty() {
        return Err(invalid("model is required".to_string()));
    }

    if !(0.0..=2.0).contains(&params.temperature) {
        return Err(invalid(format!(
            "temperature must be within [0, 2], got {}",
            params.temperature
        )));
    }

    if let Some(template) = &params.system_prompt {
        validate_template(template, PromptRole::System).map_err(|e| invalid(e.to_string()))?;
    }
    if let Some(template) = &params.user_prompt {
        validate_template(template, PromptRole::User).map_err(|e| invalid(e.to_string()))?;
    }

    Ok(())
}
