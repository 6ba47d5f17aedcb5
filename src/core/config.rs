//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::core::backend::{ApiType, BackendSettings};
use crate::core::models::{Document, RunParams, DEFAULT_SOURCE_LANG, DEFAULT_TARGET_LANG};
use crate::core::retry::RetryPolicy;
use crate::processors::chunker::TokenBudget;
use crate::processors::orchestrator::PipelineSettings;

/// Prefix of environment overrides, e.g. `DOCTRANS_API_KEY`
pub const ENV_PREFIX: &str = "DOCTRANS";

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "doc-translator";

/// Shortest allowed pause between chunks and before an orchestrator retry
pub const MIN_SPACING_MS: u64 = 2000;

/// Shortest allowed wait after a 429
pub const MIN_RATE_LIMIT_BACKOFF_MS: u64 = 5000;

/// Provider-specific key variable, e.g. `OPENAI_API_KEY`
pub fn provider_key_var(api_type: &str) -> String {
    format!("{}_API_KEY", api_type.trim().to_ascii_uppercase())
}

/// Configuration for translator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_type: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub source_lang: String,
    pub target_lang: String,
    pub system_prompt: Option<String>,
    pub user_prompt: Option<String>,
    /// Token budget per chunk
    pub max_tokens: usize,
    /// Characters per token; derived from the source language when unset
    pub chars_per_token: Option<usize>,
    pub output_dir: PathBuf,
    pub endpoint: Option<String>,
    pub timeout_ms: u64,
    pub spacing_ms: u64,
    pub cooldown_ms: u64,
    pub rate_limit_backoff_ms: u64,
    pub incomplete_backoff_ms: u64,
    pub include_context: bool,
    pub max_concurrent_runs: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_type: ApiType::DeepSeek.to_string(),
            api_key: String::new(),
            model: ApiType::DeepSeek.default_model().to_string(),
            temperature: 1.0,
            source_lang: DEFAULT_SOURCE_LANG.to_string(),
            target_lang: DEFAULT_TARGET_LANG.to_string(),
            system_prompt: None,
            user_prompt: None,
            max_tokens: 2000,
            chars_per_token: None,
            output_dir: PathBuf::from("outputs"),
            endpoint: None,
            timeout_ms: 120_000,
            spacing_ms: MIN_SPACING_MS,
            cooldown_ms: MIN_SPACING_MS,
            rate_limit_backoff_ms: MIN_RATE_LIMIT_BACKOFF_MS,
            incomplete_backoff_ms: MIN_SPACING_MS,
            include_context: false,
            max_concurrent_runs: 2,
        }
    }
}

impl AppConfig {
    /// Load defaults, then the config file, then `DOCTRANS_*` environment variables
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = config::Config::builder()
            .add_source(file)
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let mut config: Self = settings.try_deserialize()?;
        config.resolve_api_key();
        Ok(config)
    }

    /// Fall back to the provider's conventional key variable, e.g. `DEEPSEEK_API_KEY`
    pub fn resolve_api_key(&mut self) {
        if !self.api_key.is_empty() {
            return;
        }
        let var = provider_key_var(&self.api_type);
        if let Ok(key) = std::env::var(&var) {
            info!("Using API key from {}", var);
            self.api_key = key;
        }
    }

    /// Load from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to file, without the API key
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let mut redacted = self.clone();
        redacted.api_key.clear();
        let content = serde_json::to_string_pretty(&redacted)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.api_type
            .parse::<ApiType>()
            .map_err(|e| anyhow::anyhow!("{}", e))?;

        if self.api_key.trim().is_empty() {
            return Err(anyhow::anyhow!("API key is required"));
        }

        if self.model.trim().is_empty() {
            return Err(anyhow::anyhow!("model is required"));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(anyhow::anyhow!(
                "temperature must be within [0, 2], got {}",
                self.temperature
            ));
        }

        if self.max_tokens == 0 || self.chars_per_token == Some(0) {
            return Err(anyhow::anyhow!("chunk token budget must be greater than 0"));
        }

        if self.spacing_ms < MIN_SPACING_MS || self.cooldown_ms < MIN_SPACING_MS {
            return Err(anyhow::anyhow!(
                "spacing_ms and cooldown_ms must be at least {}",
                MIN_SPACING_MS
            ));
        }

        if self.rate_limit_backoff_ms < MIN_RATE_LIMIT_BACKOFF_MS {
            return Err(anyhow::anyhow!(
                "rate_limit_backoff_ms must be at least {}",
                MIN_RATE_LIMIT_BACKOFF_MS
            ));
        }

        if self.max_concurrent_runs == 0 {
            return Err(anyhow::anyhow!("max_concurrent_runs must be greater than 0"));
        }

        if self.include_context && self.max_tokens > 4000 {
            warn!("include_context doubles prompt size; consider a smaller max_tokens");
        }

        Ok(())
    }

    /// Per-run parameters handed to the orchestrator
    pub fn run_params(&self) -> RunParams {
        RunParams {
            api_type: self.api_type.clone(),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            temperature: self.temperature,
            system_prompt: self.system_prompt.clone().filter(|p| !p.trim().is_empty()),
            user_prompt: self.user_prompt.clone().filter(|p| !p.trim().is_empty()),
        }
    }

    /// Wrap extracted text in a document with the configured languages
    pub fn document(&self, name: impl Into<String>, text: impl Into<String>) -> Document {
        Document::new(name, text).with_languages(&self.source_lang, &self.target_lang)
    }

    pub fn backend_settings(&self) -> BackendSettings {
        BackendSettings {
            endpoint: self.endpoint.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
            rate_limit_backoff: Duration::from_millis(self.rate_limit_backoff_ms),
            incomplete_backoff: Duration::from_millis(self.incomplete_backoff_ms),
            include_context: self.include_context,
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        let budget = match self.chars_per_token {
            Some(chars_per_token) => TokenBudget::new(self.max_tokens, chars_per_token),
            None => TokenBudget::for_language(self.max_tokens, &self.source_lang),
        };

        PipelineSettings {
            budget,
            spacing: Duration::from_millis(self.spacing_ms),
            retry: RetryPolicy::once(Duration::from_millis(self.cooldown_ms)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> AppConfig {
        AppConfig {
            api_key: "sk-test".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_config_validation_missing_key() {
        let config = AppConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_temperature_range() {
        let mut config = valid();
        config.temperature = 2.5;
        assert!(config.validate().is_err());
        config.temperature = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_minimum_delays_enforced() {
        let mut config = valid();
        config.spacing_ms = 500;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.rate_limit_backoff_ms = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_api_type() {
        let mut config = valid();
        config.api_type = "anthropic".to_string();
        assert!(config.validate().is_ok());

        config.api_type = "mistral".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_blank_prompt_overrides_are_dropped() {
        let mut config = valid();
        config.system_prompt = Some("  ".to_string());
        config.user_prompt = Some("Translate: {text}".to_string());

        let params = config.run_params();
        assert!(params.system_prompt.is_none());
        assert_eq!(params.user_prompt.as_deref(), Some("Translate: {text}"));
    }

    #[test]
    fn test_load_from_file_with_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("doc-translator.json");
        std::fs::write(
            &path,
            r#"{ "api_key": "sk-file", "model": "deepseek-reasoner", "max_tokens": 800 }"#,
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.api_key, "sk-file");
        assert_eq!(config.model, "deepseek-reasoner");
        assert_eq!(config.max_tokens, 800);
        assert_eq!(config.api_type, "deepseek");
        assert_eq!(config.spacing_ms, MIN_SPACING_MS);
    }

    #[test]
    fn test_save_omits_key() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("saved.json");
        valid().to_file(&path).unwrap();

        let loaded = AppConfig::from_file(&path).unwrap();
        assert!(loaded.api_key.is_empty());
        assert_eq!(loaded.max_tokens, 2000);
    }
}
