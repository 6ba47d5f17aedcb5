//! Translator backend capability and provider selection

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::core::anthropic::AnthropicClient;
use crate::core::client::ChatCompletionClient;
use crate::core::completeness;
use crate::core::errors::{Result, TranslationError};
use crate::core::gemini::GeminiClient;
use crate::core::models::{BackendReply, TranslationRequest};

/// One remote translation call plus its completeness validation
///
/// Implementations perform at most one internal retry per call, either after
/// a 429 or after an incomplete reply, never both.
#[async_trait]
pub trait TranslatorBackend: Send + Sync + fmt::Debug {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Translate one chunk
    async fn translate(&self, request: &TranslationRequest) -> Result<BackendReply>;
}

/// Supported providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiType {
    DeepSeek,
    OpenAi,
    Anthropic,
    Gemini,
}

impl ApiType {
    /// Endpoint used when configuration does not override it
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            ApiType::DeepSeek => "https://api.deepseek.com/v1/chat/completions",
            ApiType::OpenAi => "https://api.openai.com/v1/chat/completions",
            ApiType::Anthropic => "https://api.anthropic.com/v1/messages",
            ApiType::Gemini => {
                "https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent"
            }
        }
    }

    /// Upper bound for the outbound `max_tokens`
    pub fn max_tokens_ceiling(&self) -> u32 {
        match self {
            ApiType::DeepSeek => 8192,
            ApiType::OpenAi => 4000,
            ApiType::Anthropic => 4096,
            ApiType::Gemini => 8192,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApiType::DeepSeek => "deepseek",
            ApiType::OpenAi => "openai",
            ApiType::Anthropic => "anthropic",
            ApiType::Gemini => "gemini",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ApiType::DeepSeek => "deepseek-chat",
            ApiType::OpenAi => "gpt-4o",
            ApiType::Anthropic => "claude-3-7-sonnet-20250219",
            ApiType::Gemini => "gemini-pro",
        }
    }
}

impl fmt::Display for ApiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiType {
    type Err = TranslationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deepseek" => Ok(ApiType::DeepSeek),
            "openai" => Ok(ApiType::OpenAi),
            "anthropic" | "claude" => Ok(ApiType::Anthropic),
            "gemini" | "google" => Ok(ApiType::Gemini),
            other => Err(TranslationError::UnsupportedApiType {
                api_type: other.to_string(),
            }),
        }
    }
}

/// Floor for the outbound `max_tokens`
pub const MIN_MAX_TOKENS: u32 = 256;

/// Output tokens requested per input character
pub const MAX_TOKENS_PER_CHAR: u32 = 2;

/// `max_tokens` for a request of `text`, clamped to `[MIN_MAX_TOKENS, ceiling]`
pub fn max_tokens_for(text: &str, ceiling: u32) -> u32 {
    let chars = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);
    chars
        .saturating_mul(MAX_TOKENS_PER_CHAR)
        .clamp(MIN_MAX_TOKENS, ceiling.max(MIN_MAX_TOKENS))
}

/// Transport settings shared by every provider client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Overrides the provider's default endpoint
    pub endpoint: Option<String>,
    pub timeout: Duration,
    /// Wait before the single retry after a 429
    pub rate_limit_backoff: Duration,
    /// Wait before the single retry after an incomplete reply
    pub incomplete_backoff: Duration,
    /// Send the previous chunk as reference-only context
    pub include_context: bool,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout: Duration::from_secs(120),
            rate_limit_backoff: Duration::from_secs(5),
            incomplete_backoff: Duration::from_secs(2),
            include_context: false,
        }
    }
}

/// Build the backend named by `api_type`
pub fn create_backend(
    api_type: &str,
    api_key: &str,
    settings: &BackendSettings,
) -> Result<Arc<dyn TranslatorBackend>> {
    if api_key.trim().is_empty() {
        return Err(TranslationError::ConfigError {
            message: "API key is required".to_string(),
        });
    }

    let api_type: ApiType = api_type.parse()?;
    let client = build_http_client(settings)?;

    let backend: Arc<dyn TranslatorBackend> = match api_type {
        ApiType::DeepSeek | ApiType::OpenAi => Arc::new(ChatCompletionClient::new(
            client,
            api_type,
            api_key.to_string(),
            settings.clone(),
        )),
        ApiType::Anthropic => Arc::new(AnthropicClient::new(
            client,
            api_key.to_string(),
            settings.clone(),
        )),
        ApiType::Gemini => Arc::new(GeminiClient::new(
            client,
            api_key.to_string(),
            settings.clone(),
        )),
    };

    debug!("Created {} backend", api_type);
    Ok(backend)
}

/// reqwest client with the configured timeout and a small idle pool
pub(crate) fn build_http_client(settings: &BackendSettings) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(settings.timeout)
        .pool_idle_timeout(Some(Duration::from_secs(30)))
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| TranslationError::ConfigError {
            message: format!("failed to build HTTP client: {}", e),
        })
}

/// Result of a single HTTP round trip
#[derive(Debug)]
pub(crate) enum Attempt {
    Reply(BackendReply),
    RateLimited,
}

/// Run `send` once, retrying once after a 429 or an incomplete reply
///
/// The backoff sleep is part of the in-flight call: callers that drop the
/// returned future, as the orchestrator does on cancellation, abort it too.
pub(crate) async fn send_with_internal_retry<F, Fut>(
    provider: &str,
    source: &str,
    settings: &BackendSettings,
    send: F,
) -> Result<BackendReply>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Attempt>>,
{
    let retry_delay = match send().await? {
        Attempt::Reply(reply) => match completeness::check(source, &reply.translation) {
            Ok(()) => return Ok(reply),
            Err(reason) => {
                warn!("{} returned an incomplete translation ({}), retrying", provider, reason);
                settings.incomplete_backoff
            }
        },
        Attempt::RateLimited => {
            warn!(
                "{} rate limited, retrying in {:?}",
                provider, settings.rate_limit_backoff
            );
            settings.rate_limit_backoff
        }
    };

    sleep(retry_delay).await;

    match send().await? {
        Attempt::Reply(reply) => match completeness::check(source, &reply.translation) {
            Ok(()) => {
                debug!("{} succeeded on internal retry", provider);
                Ok(reply)
            }
            Err(reason) => Err(TranslationError::IncompleteTranslation { reason }),
        },
        Attempt::RateLimited => Err(TranslationError::RateLimited),
    }
}
