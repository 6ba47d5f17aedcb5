//! Joins chunk outcomes into the final document and persists it

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::errors::{PipelineError, PipelineResult};
use crate::core::models::{AssembledResult, TranslationOutcome};
use crate::core::storage::OutputStore;

/// Separator placed between consecutive chunk outcomes
pub const CHUNK_SEPARATOR: &str = "\n\n";

/// Message reported for every assembled run
pub const COMPLETE_MESSAGE: &str = "Translation complete";

/// Fresh identifiers tried before a taken name becomes a storage error
const MAX_SAVE_ATTEMPTS: usize = 8;

/// Process-wide run counter, keeps same-millisecond names apart
static RUN_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Builds and stores the output document of a run
#[derive(Clone)]
pub struct ResultAssembler {
    store: Arc<dyn OutputStore>,
}

impl ResultAssembler {
    pub fn new(store: Arc<dyn OutputStore>) -> Self {
        Self { store }
    }

    /// Join `outcomes` in order, save under a fresh identifier and summarize
    ///
    /// Failed chunks contribute their placeholder text; they do not fail the run.
    pub async fn assemble(
        &self,
        source_name: &str,
        outcomes: &[TranslationOutcome],
    ) -> PipelineResult<AssembledResult> {
        let output_text = join_outcomes(outcomes);
        let output_identifier = self.save_unique(source_name, &output_text).await?;

        let failed_chunks = outcomes.iter().filter(|o| !o.is_success()).count();
        let tokens_used = outcomes.iter().map(|o| o.tokens_used).sum();

        info!(
            "Saved {} ({} chunks, {} failed, {} tokens)",
            output_identifier,
            outcomes.len(),
            failed_chunks,
            tokens_used
        );

        Ok(AssembledResult {
            success: true,
            message: COMPLETE_MESSAGE.to_string(),
            output_text,
            output_identifier,
            total_chunks: outcomes.len(),
            failed_chunks,
            tokens_used,
        })
    }

    /// Save under the first identifier the store does not already hold
    async fn save_unique(&self, source_name: &str, text: &str) -> PipelineResult<String> {
        let mut last_taken = String::new();

        for _ in 0..MAX_SAVE_ATTEMPTS {
            let identifier = output_identifier(
                source_name,
                chrono::Utc::now().timestamp_millis(),
                RUN_SEQUENCE.fetch_add(1, Ordering::Relaxed),
            );

            match self.store.save(&identifier, text).await {
                Ok(()) => return Ok(identifier),
                Err(PipelineError::OutputExists { identifier }) => {
                    warn!("Output {} already exists, picking another name", identifier);
                    last_taken = identifier;
                }
                Err(e) => return Err(e),
            }
        }

        Err(PipelineError::StorageError {
            path: last_taken,
            message: format!("no free output name after {} attempts", MAX_SAVE_ATTEMPTS),
        })
    }
}

/// Outcome texts in order, separated by a blank line
pub fn join_outcomes(outcomes: &[TranslationOutcome]) -> String {
    outcomes
        .iter()
        .map(|o| o.text.as_str())
        .collect::<Vec<_>>()
        .join(CHUNK_SEPARATOR)
}

/// `translated_{millis}_{sequence}_{name}.txt` for the source file `source_name`
pub fn output_identifier(source_name: &str, timestamp_ms: i64, sequence: u64) -> String {
    format!(
        "translated_{}_{}_{}.txt",
        timestamp_ms,
        sequence,
        sanitize_file_name(source_name)
    )
}

/// Base name of `name` restricted to `[A-Za-z0-9._-]`
///
/// Directory components are dropped and every other character becomes `_`.
/// A name that reduces to nothing or only dots becomes `document`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.chars().all(|c| c == '.') {
        "document".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{BackendReply, Chunk};
    use crate::core::storage::MemoryOutputStore;

    fn ok(index: usize, text: &str) -> TranslationOutcome {
        TranslationOutcome::success(
            index,
            BackendReply {
                translation: text.to_string(),
                tokens_used: 10,
            },
        )
    }

    fn failed(index: usize, body: &str) -> TranslationOutcome {
        TranslationOutcome::failed(&Chunk {
            index,
            context: String::new(),
            body: body.to_string(),
            span: 0..body.len(),
        })
    }

    #[test]
    fn test_join_preserves_order() {
        let outcomes = vec![ok(0, "一"), failed(1, "two"), ok(2, "三")];
        assert_eq!(
            join_outcomes(&outcomes),
            "一\n\n[TRANSLATION FAILED] two...\n\n三"
        );
        assert_eq!(join_outcomes(&[]), "");
    }

    #[test]
    fn test_output_identifier() {
        assert_eq!(
            output_identifier("report.docx", 1_700_000_000_123, 7),
            "translated_1700000000123_7_report.docx.txt"
        );
    }

    #[test]
    fn test_sanitize_strips_paths_and_symbols() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\docs\\年报 2023.docx"), "___2023.docx");
        assert_eq!(sanitize_file_name("my file (1).txt"), "my_file__1_.txt");
        assert_eq!(sanitize_file_name(".."), "document");
        assert_eq!(sanitize_file_name("dir/"), "document");
    }

    #[tokio::test]
    async fn test_assemble_saves_and_counts() {
        let store = Arc::new(MemoryOutputStore::new());
        let assembler = ResultAssembler::new(store.clone());

        let outcomes = vec![ok(0, "你好"), failed(1, "world")];
        let result = assembler.assemble("hello.txt", &outcomes).await.unwrap();

        assert!(result.success);
        assert_eq!(result.message, "Translation complete");
        assert_eq!(result.total_chunks, 2);
        assert_eq!(result.failed_chunks, 1);
        assert_eq!(result.tokens_used, 10);
        assert!(result.output_identifier.starts_with("translated_"));
        assert!(result.output_identifier.ends_with("_hello.txt.txt"));
        assert_eq!(
            store.get(&result.output_identifier).await.as_deref(),
            Some(result.output_text.as_str())
        );
    }

    #[tokio::test]
    async fn test_same_name_outputs_are_kept_apart() {
        let store = Arc::new(MemoryOutputStore::new());
        let assembler = ResultAssembler::new(store.clone());

        let first_results = [ok(0, "第一")];
        let second_results = [ok(0, "第二")];
        let first = assembler.assemble("a/notes.txt", &first_results);
        let second = assembler.assemble("b/notes.txt", &second_results);
        let (first, second) = tokio::join!(first, second);
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_ne!(first.output_identifier, second.output_identifier);
        assert_eq!(store.len().await, 2);
        assert_eq!(store.get(&first.output_identifier).await.as_deref(), Some("第一"));
        assert_eq!(store.get(&second.output_identifier).await.as_deref(), Some("第二"));
    }

    /// Store that already holds every name in `taken`
    struct CrowdedStore {
        taken: usize,
        inner: MemoryOutputStore,
        attempts: std::sync::Mutex<usize>,
    }

    #[async_trait::async_trait]
    impl OutputStore for CrowdedStore {
        async fn save(&self, identifier: &str, text: &str) -> PipelineResult<()> {
            let attempt = {
                let mut attempts = self.attempts.lock().unwrap();
                *attempts += 1;
                *attempts
            };
            if attempt <= self.taken {
                return Err(PipelineError::OutputExists {
                    identifier: identifier.to_string(),
                });
            }
            self.inner.save(identifier, text).await
        }
    }

    #[tokio::test]
    async fn test_taken_name_is_replaced() {
        let store = Arc::new(CrowdedStore {
            taken: 2,
            inner: MemoryOutputStore::new(),
            attempts: std::sync::Mutex::new(0),
        });
        let assembler = ResultAssembler::new(store.clone());

        let result = assembler.assemble("notes.txt", &[ok(0, "好")]).await.unwrap();

        assert_eq!(*store.attempts.lock().unwrap(), 3);
        assert_eq!(store.inner.get(&result.output_identifier).await.as_deref(), Some("好"));
    }

    #[tokio::test]
    async fn test_no_free_name_is_a_storage_error() {
        let store = Arc::new(CrowdedStore {
            taken: usize::MAX,
            inner: MemoryOutputStore::new(),
            attempts: std::sync::Mutex::new(0),
        });
        let assembler = ResultAssembler::new(store.clone());

        let err = assembler.assemble("notes.txt", &[ok(0, "好")]).await.unwrap_err();

        assert!(matches!(err, PipelineError::StorageError { .. }));
        assert_eq!(*store.attempts.lock().unwrap(), MAX_SAVE_ATTEMPTS);
        assert_eq!(store.inner.len().await, 0);
    }
}
