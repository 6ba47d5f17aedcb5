//! CLI command definitions and handlers

use clap::{Args, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::core::backend::ApiType;
use crate::core::config::{provider_key_var, AppConfig};
use crate::core::models::{AssembledResult, RunResponse, RunState};
use crate::core::storage::{FsOutputStore, OutputStore};
use crate::processors::chunker::{TextChunker, TokenBudget};
use crate::processors::orchestrator::{cancel_pair, CancelSignal, ProgressFn, TranslationPipeline};
use crate::processors::text::normalize;

/// Commands for Doc Translator
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Translate extracted .txt documents, or a single message with --text
    Translate(TranslateArgs),

    /// Show how a document would be chunked, without translating
    Chunks {
        /// Input .txt file (required)
        #[arg(short, long)]
        file: PathBuf,

        /// Token budget per chunk (default from config)
        #[arg(long)]
        max_tokens: Option<usize>,

        /// Source language, selects the chars-per-token ratio
        #[arg(long)]
        source_lang: Option<String>,
    },
}

/// Options of the translate command; each overrides the loaded config
#[derive(Args, Debug, Default)]
pub struct TranslateArgs {
    /// Input file or directory
    #[arg(short, long, required_unless_present = "text", conflicts_with = "text")]
    pub file: Option<PathBuf>,

    /// Translate this message directly and print the result
    #[arg(long)]
    pub text: Option<String>,

    /// Directory receiving translated_*.txt outputs
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Provider: deepseek, openai, anthropic or gemini
    #[arg(long)]
    pub api_type: Option<String>,

    /// API key (overrides config and environment)
    #[arg(long)]
    pub api_key: Option<String>,

    #[arg(short, long)]
    pub model: Option<String>,

    #[arg(long)]
    pub source_lang: Option<String>,

    #[arg(short, long)]
    pub target_lang: Option<String>,

    /// Sampling temperature in [0, 2]
    #[arg(long)]
    pub temperature: Option<f32>,

    /// System prompt template ({source_lang}, {target_lang})
    #[arg(long)]
    pub system_prompt: Option<String>,

    /// User prompt template, must contain {text}
    #[arg(long)]
    pub user_prompt: Option<String>,

    /// Recursively translate subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Print run responses as JSON
    #[arg(long)]
    pub json: bool,
}

impl TranslateArgs {
    /// Layer the command-line overrides on top of `config`
    pub fn apply(&self, config: &mut AppConfig) {
        self.apply_with_env(config, |var| std::env::var(var).ok());
    }

    /// [`Self::apply`] with provider keys looked up through `env`
    fn apply_with_env(&self, config: &mut AppConfig, env: impl Fn(&str) -> Option<String>) {
        if let Some(api_type) = &self.api_type {
            // Follow the provider's default model unless one was chosen explicitly
            let previous_default = config.api_type.parse::<ApiType>().ok().map(|t| t.default_model());
            if self.model.is_none() && previous_default == Some(config.model.as_str()) {
                if let Ok(new_type) = api_type.parse::<ApiType>() {
                    config.model = new_type.default_model().to_string();
                }
            }
            // A switched provider takes its own key when one is set, else keeps the configured one
            let switched = !api_type.eq_ignore_ascii_case(&config.api_type);
            if let Some(key) = env(&provider_key_var(api_type)).filter(|k| !k.trim().is_empty()) {
                if switched || config.api_key.is_empty() {
                    config.api_key = key;
                }
            }
            config.api_type = api_type.clone();
        }
        if let Some(api_key) = &self.api_key {
            config.api_key = api_key.clone();
        }

        if let Some(output_dir) = &self.output_dir {
            config.output_dir = output_dir.clone();
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(source_lang) = &self.source_lang {
            config.source_lang = source_lang.clone();
        }
        if let Some(target_lang) = &self.target_lang {
            config.target_lang = target_lang.clone();
        }
        if let Some(temperature) = self.temperature {
            config.temperature = temperature;
        }
        if self.system_prompt.is_some() {
            config.system_prompt = self.system_prompt.clone();
        }
        if self.user_prompt.is_some() {
            config.user_prompt = self.user_prompt.clone();
        }
    }
}

/// Handle translate command
pub async fn handle_translate(mut config: AppConfig, args: TranslateArgs) -> anyhow::Result<()> {
    let start_time = Instant::now();

    args.apply(&mut config);
    config.validate()?;

    if let Some(text) = &args.text {
        return translate_message(&config, text, args.json).await;
    }

    let Some(input) = &args.file else {
        anyhow::bail!("either --file or --text is required");
    };
    let files = find_text_files(input, args.recursive)?;
    if files.is_empty() {
        anyhow::bail!("No .txt files found in {}", input.display());
    }

    info!("Starting translation of {} file(s)", files.len());
    info!("Provider: {} / {}", config.api_type, config.model);
    info!("Languages: {} -> {}", config.source_lang, config.target_lang);
    info!("Output: {}", config.output_dir.display());

    let store = Arc::new(FsOutputStore::new(&config.output_dir));
    let settings = config.pipeline_settings();
    let config = Arc::new(config);

    // Ctrl-C cancels every run
    let (cancel_handle, cancel) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling translation runs");
            cancel_handle.cancel();
        }
    });

    let semaphore = Arc::new(Semaphore::new(config.max_concurrent_runs));
    let multi = MultiProgress::new();
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
        .progress_chars("=>-");

    let mut tasks = JoinSet::new();
    for path in files {
        let pb = multi.add(ProgressBar::new(0));
        pb.set_style(style.clone());
        pb.set_message(format!("Queued: {}", path.display()));

        let store: Arc<dyn OutputStore> = store.clone();
        let pipeline =
            TranslationPipeline::new(settings, store).with_progress(progress_observer(pb.clone()));
        let semaphore = semaphore.clone();
        let config = config.clone();
        let cancel = cancel.clone();

        tasks.spawn(async move {
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => translate_file(&pipeline, &path, &config, cancel).await,
                Err(e) => Err(e.into()),
            };
            if let Err(e) = &result {
                pb.abandon_with_message(format!("Failed: {} - {}", path.display(), e));
            }
            (path, result)
        });
    }

    let mut responses = Vec::new();
    let mut failed = 0;
    while let Some(joined) = tasks.join_next().await {
        let (path, result) = joined?;
        match &result {
            Ok(assembled) => info!(
                "Translated: {} -> {}",
                path.display(),
                store.path_for(&assembled.output_identifier).display()
            ),
            Err(e) => {
                failed += 1;
                eprintln!("Error processing {}: {}", path.display(), e);
            }
        }
        responses.push((path, RunResponse::from(result)));
    }
    responses.sort_by(|a, b| a.0.cmp(&b.0));

    let duration = start_time.elapsed();
    info!(
        "Completed: {} processed, {} failed in {:?}",
        responses.len() - failed,
        failed,
        duration
    );

    if args.json {
        let json: Vec<_> = responses.iter().map(|(_, response)| response).collect();
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        println!("\n✅ Translation completed!");
        for (path, response) in &responses {
            match response {
                RunResponse::Completed {
                    output_file,
                    failed_chunks,
                    ..
                } => println!(
                    "   {} -> {} ({} failed chunks)",
                    path.display(),
                    store.path_for(output_file).display(),
                    failed_chunks
                ),
                RunResponse::Error { error } => println!("   {} -> error: {}", path.display(), error),
            }
        }
        println!("   Processed: {}", responses.len() - failed);
        println!("   Failed: {}", failed);
        println!("   Time: {:?}", duration);
    }

    if failed > 0 {
        anyhow::bail!("{} of {} runs failed", failed, responses.len());
    }
    Ok(())
}

/// Handle chunks command
pub async fn handle_chunks(
    config: AppConfig,
    file: PathBuf,
    max_tokens: Option<usize>,
    source_lang: Option<String>,
) -> anyhow::Result<()> {
    let content = tokio::fs::read_to_string(&file).await?;
    let text = normalize(&content);

    let max_tokens = max_tokens.unwrap_or(config.max_tokens);
    let source_lang = source_lang.unwrap_or(config.source_lang);
    let budget = match config.chars_per_token {
        Some(chars_per_token) => TokenBudget::new(max_tokens, chars_per_token),
        None => TokenBudget::for_language(max_tokens, &source_lang),
    };

    let chunks = TextChunker::new(budget)?.chunk(&text);

    println!(
        "{}: {} chars, {} chunks ({}, max {} chars)",
        file.display(),
        text.chars().count(),
        chunks.len(),
        budget,
        budget.max_chars()
    );
    for chunk in &chunks {
        println!("\n{}", chunk);
        println!("   {}", chunk.preview(80).replace('\n', " "));
    }

    Ok(())
}

/// Translate one message and print it; nothing is written to the output directory
async fn translate_message(config: &AppConfig, text: &str, json: bool) -> anyhow::Result<()> {
    let store = Arc::new(FsOutputStore::new(&config.output_dir));
    let pipeline = TranslationPipeline::new(config.pipeline_settings(), store);

    let (cancel_handle, cancel) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_handle.cancel();
        }
    });

    let document = config.document("message", text);
    let reply = pipeline
        .translate_text(&document, &config.run_params(), &config.backend_settings(), cancel)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&reply)?);
    } else {
        println!("{}", reply.translation);
    }
    Ok(())
}

/// Read, translate and store one file
async fn translate_file(
    pipeline: &TranslationPipeline,
    path: &Path,
    config: &AppConfig,
    cancel: CancelSignal,
) -> anyhow::Result<AssembledResult> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let document = config.document(name, text);
    let result = pipeline
        .run(&document, &config.run_params(), &config.backend_settings(), cancel)
        .await?;
    Ok(result)
}

/// Progress bar driven by run state transitions
fn progress_observer(pb: ProgressBar) -> ProgressFn {
    Arc::new(move |state: &RunState| match state {
        RunState::Translating { index, total } => {
            pb.set_length(*total as u64);
            pb.set_position(*index as u64);
            pb.set_message(state.to_string());
        }
        RunState::Done { .. } => {
            pb.set_position(pb.length().unwrap_or(0));
            pb.finish_with_message(state.to_string());
        }
        RunState::Failed { .. } => {}
        _ => pb.set_message(state.to_string()),
    })
}

/// `.txt` files at `path`: the file itself, or the directory's entries
fn find_text_files(path: &Path, recursive: bool) -> anyhow::Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        anyhow::bail!("{} does not exist", path.display());
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(path)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && is_text_file(p))
        .collect();
    files.sort();

    Ok(files)
}

fn is_text_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("txt"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_text_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "a").unwrap();
        std::fs::write(tmp.path().join("b.TXT"), "b").unwrap();
        std::fs::write(tmp.path().join("c.md"), "c").unwrap();
        std::fs::create_dir(tmp.path().join("nested")).unwrap();
        std::fs::write(tmp.path().join("nested").join("d.txt"), "d").unwrap();

        let flat = find_text_files(tmp.path(), false).unwrap();
        assert_eq!(flat.len(), 2);

        let deep = find_text_files(tmp.path(), true).unwrap();
        assert_eq!(deep.len(), 3);

        assert!(find_text_files(&tmp.path().join("missing"), false).is_err());
    }

    fn env_with(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name| {
            vars.iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_args_override_config() {
        let mut config = AppConfig {
            api_key: "sk-deepseek".to_string(),
            ..Default::default()
        };
        let args = TranslateArgs {
            api_type: Some("openai".to_string()),
            target_lang: Some("Japanese".to_string()),
            temperature: Some(0.3),
            ..Default::default()
        };

        args.apply_with_env(&mut config, env_with(&[("OPENAI_API_KEY", "sk-openai")]));

        assert_eq!(config.api_type, "openai");
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.target_lang, "Japanese");
        assert_eq!(config.temperature, 0.3);
        assert_eq!(config.api_key, "sk-openai");
    }

    #[test]
    fn test_switching_provider_keeps_configured_key() {
        let mut config = AppConfig {
            api_key: "sk-from-config".to_string(),
            ..Default::default()
        };
        let args = TranslateArgs {
            api_type: Some("openai".to_string()),
            ..Default::default()
        };

        args.apply_with_env(&mut config, env_with(&[]));

        assert_eq!(config.api_key, "sk-from-config");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_api_key_flag_wins() {
        let mut config = AppConfig {
            api_key: "sk-from-config".to_string(),
            ..Default::default()
        };
        let args = TranslateArgs {
            api_type: Some("anthropic".to_string()),
            api_key: Some("sk-ant-flag".to_string()),
            ..Default::default()
        };

        args.apply_with_env(&mut config, env_with(&[("ANTHROPIC_API_KEY", "sk-ant-env")]));

        assert_eq!(config.api_type, "anthropic");
        assert_eq!(config.model, "claude-3-7-sonnet-20250219");
        assert_eq!(config.api_key, "sk-ant-flag");
    }

    #[test]
    fn test_text_and_file_are_exclusive() {
        use clap::Parser;

        #[derive(Parser, Debug)]
        struct Cli {
            #[command(subcommand)]
            command: Commands,
        }

        let cli = Cli::try_parse_from(["doc-translator", "translate", "--text", "Hello"]).unwrap();
        match cli.command {
            Commands::Translate(args) => {
                assert_eq!(args.text.as_deref(), Some("Hello"));
                assert!(args.file.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }

        assert!(Cli::try_parse_from(["doc-translator", "translate"]).is_err());
        assert!(
            Cli::try_parse_from(["doc-translator", "translate", "-f", "a.txt", "--text", "Hi"]).is_err()
        );
    }

    #[test]
    fn test_explicit_model_is_kept() {
        let mut config = AppConfig::default();
        let args = TranslateArgs {
            api_type: Some("gemini".to_string()),
            model: Some("gemini-1.5-pro".to_string()),
            ..Default::default()
        };

        args.apply(&mut config);
        assert_eq!(config.model, "gemini-1.5-pro");
    }
}
