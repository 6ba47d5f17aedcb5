//! Anthropic Messages API client

use async_trait::async_trait;
use std::fmt;
use tracing::debug;

use crate::core::backend::{
    max_tokens_for, send_with_internal_retry, ApiType, Attempt, BackendSettings, TranslatorBackend,
};
use crate::core::errors::{Result, TranslationError};
use crate::core::models::{BackendReply, TranslationRequest};
use crate::core::prompts::{render_request, DEFAULT_PROMPTS};

/// Value sent in the `anthropic-version` header
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Backend for Claude models
#[derive(Clone)]
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    settings: BackendSettings,
}

impl fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl AnthropicClient {
    pub fn new(client: reqwest::Client, api_key: String, settings: BackendSettings) -> Self {
        let endpoint = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| ApiType::Anthropic.default_endpoint().to_string());

        Self {
            client,
            api_key,
            endpoint,
            settings,
        }
    }

    /// System prompt goes top-level, the user prompt is the only message
    fn build_body(&self, request: &TranslationRequest) -> Result<serde_json::Value> {
        let (mut system_prompt, user_prompt) = render_request(request, &DEFAULT_PROMPTS)?;

        if self.settings.include_context {
            if let Some(context) = request.context.as_deref().filter(|c| !c.trim().is_empty()) {
                system_prompt.push_str(
                    "\n\nThe passage that precedes the text is given below for continuity. \
                     Use it as reference only and do not translate it.\n\n",
                );
                system_prompt.push_str(context);
            }
        }

        Ok(serde_json::json!({
            "model": request.model,
            "system": system_prompt,
            "messages": [
                { "role": "user", "content": user_prompt }
            ],
            "temperature": request.temperature,
            "max_tokens": max_tokens_for(&request.text, ApiType::Anthropic.max_tokens_ceiling())
        }))
    }

    async fn send_request(&self, body: &serde_json::Value) -> Result<Attempt> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| TranslationError::NetworkError {
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Ok(Attempt::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranslationError::ProviderError {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| TranslationError::InvalidResponse {
                    message: e.to_string(),
                })?;

        let translation = json["content"]
            .get(0)
            .and_then(|block| block["text"].as_str())
            .ok_or_else(|| TranslationError::InvalidResponse {
                message: "No content block in response".to_string(),
            })?
            .trim()
            .to_string();

        let usage = &json["usage"];
        let tokens_used = (usage["input_tokens"].as_u64().unwrap_or(0)
            + usage["output_tokens"].as_u64().unwrap_or(0)) as usize;

        Ok(Attempt::Reply(BackendReply {
            translation,
            tokens_used,
        }))
    }
}

#[async_trait]
impl TranslatorBackend for AnthropicClient {
    fn name(&self) -> &str {
        ApiType::Anthropic.as_str()
    }

    async fn translate(&self, request: &TranslationRequest) -> Result<BackendReply> {
        let body = self.build_body(request)?;
        debug!(
            "anthropic request: model={}, chars={}, max_tokens={}",
            request.model,
            request.text.chars().count(),
            body["max_tokens"]
        );

        send_with_internal_retry(self.name(), &request.text, &self.settings, || {
            self.send_request(&body)
        })
        .await
    }
}
