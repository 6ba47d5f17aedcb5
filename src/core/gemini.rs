//! Gemini `generateContent` client

use async_trait::async_trait;
use std::fmt;
use tracing::debug;

use crate::core::backend::{
    max_tokens_for, send_with_internal_retry, ApiType, Attempt, BackendSettings, TranslatorBackend,
};
use crate::core::errors::{Result, TranslationError};
use crate::core::models::{BackendReply, TranslationRequest};
use crate::core::prompts::{render_request, DEFAULT_PROMPTS};

/// Backend for Google's Gemini models
#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    /// Endpoint template; `{model}` is replaced per request
    endpoint: String,
    settings: BackendSettings,
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl GeminiClient {
    pub fn new(client: reqwest::Client, api_key: String, settings: BackendSettings) -> Self {
        let endpoint = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| ApiType::Gemini.default_endpoint().to_string());

        Self {
            client,
            api_key,
            endpoint,
            settings,
        }
    }

    fn url_for(&self, model: &str) -> String {
        self.endpoint.replace("{model}", model)
    }

    fn build_body(&self, request: &TranslationRequest) -> Result<serde_json::Value> {
        let (system_prompt, user_prompt) = render_request(request, &DEFAULT_PROMPTS)?;

        let mut prompt = system_prompt;
        if self.settings.include_context {
            if let Some(context) = request.context.as_deref().filter(|c| !c.trim().is_empty()) {
                prompt.push_str("\n\nPreceding passage, for reference only:\n\n");
                prompt.push_str(context);
            }
        }
        prompt.push_str("\n\n");
        prompt.push_str(&user_prompt);

        Ok(serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }]
            }],
            "generationConfig": {
                "temperature": request.temperature,
                "topP": 0.95,
                "topK": 40,
                "maxOutputTokens": max_tokens_for(&request.text, ApiType::Gemini.max_tokens_ceiling())
            }
        }))
    }

    async fn send_request(&self, url: &str, body: &serde_json::Value) -> Result<Attempt> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
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

        let translation = json["candidates"]
            .get(0)
            .and_then(|c| c["content"]["parts"].get(0))
            .and_then(|p| p["text"].as_str())
            .ok_or_else(|| TranslationError::InvalidResponse {
                message: "No candidate text in response".to_string(),
            })?
            .trim()
            .to_string();

        let tokens_used = json["usageMetadata"]["totalTokenCount"]
            .as_u64()
            .unwrap_or(0) as usize;

        Ok(Attempt::Reply(BackendReply {
            translation,
            tokens_used,
        }))
    }
}

#[async_trait]
impl TranslatorBackend for GeminiClient {
    fn name(&self) -> &str {
        ApiType::Gemini.as_str()
    }

    async fn translate(&self, request: &TranslationRequest) -> Result<BackendReply> {
        let body = self.build_body(request)?;
        let url = self.url_for(&request.model);
        debug!("gemini request: model={}, chars={}", request.model, request.text.len());

        send_with_internal_retry(self.name(), &request.text, &self.settings, || {
            self.send_request(&url, &body)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backend::build_http_client;
    use crate::core::test_support::{stub_settings, ProviderStub};
    use assert_json_diff::assert_json_include;
    use serde_json::json;

    fn gemini_reply(text: &str) -> serde_json::Value {
        json!({
            "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }],
            "usageMetadata": { "totalTokenCount": 42 }
        })
    }

    #[tokio::test]
    async fn test_generate_content_round_trip() {
        let stub = ProviderStub::new(vec![(200, gemini_reply("你好，世界。"))]);
        let base = stub.spawn().await;
        let settings = stub_settings(format!("{}/v1beta/models/{{model}}:generateContent", base));
        let client = GeminiClient::new(
            build_http_client(&settings).unwrap(),
            "g-key".to_string(),
            settings,
        );

        let request = TranslationRequest::new("Hello, world.", "gemini-pro");
        let reply = client.translate(&request).await.unwrap();

        assert_eq!(reply.translation, "你好，世界。");
        assert_eq!(reply.tokens_used, 42);
        assert_eq!(stub.header(0, "x-goog-api-key").as_deref(), Some("g-key"));
        assert_json_include!(
            actual: stub.bodies()[0].clone(),
            expected: json!({
                "generationConfig": { "topP": 0.95, "topK": 40, "maxOutputTokens": 256 }
            })
        );

        let prompt = stub.bodies()[0]["contents"][0]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(prompt.ends_with("Translate the following content into Chinese:\n\nHello, world."));
    }

    #[test]
    fn test_model_substitution() {
        let settings = BackendSettings::default();
        let client = GeminiClient::new(
            build_http_client(&settings).unwrap(),
            "g-key".to_string(),
            settings,
        );
        assert_eq!(
            client.url_for("gemini-1.5-pro"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-pro:generateContent"
        );
    }
}
