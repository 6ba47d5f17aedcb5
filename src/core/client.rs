//! OpenAI-compatible chat-completion client (DeepSeek, OpenAI)

use async_trait::async_trait;
use std::fmt;
use tracing::debug;

use crate::core::backend::{
    max_tokens_for, send_with_internal_retry, ApiType, Attempt, BackendSettings, TranslatorBackend,
};
use crate::core::errors::{Result, TranslationError};
use crate::core::models::{BackendReply, TranslationRequest};
use crate::core::prompts::{render_request, DEFAULT_PROMPTS};

/// Chat-completion backend for providers speaking the OpenAI wire format
#[derive(Clone)]
pub struct ChatCompletionClient {
    client: reqwest::Client,
    api_type: ApiType,
    api_key: String,
    endpoint: String,
    settings: BackendSettings,
}

impl fmt::Debug for ChatCompletionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatCompletionClient")
            .field("api_type", &self.api_type)
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl ChatCompletionClient {
    /// Create a new chat-completion client
    pub fn new(
        client: reqwest::Client,
        api_type: ApiType,
        api_key: String,
        settings: BackendSettings,
    ) -> Self {
        let endpoint = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| api_type.default_endpoint().to_string());

        Self {
            client,
            api_type,
            api_key,
            endpoint,
            settings,
        }
    }

    /// JSON body for one chat-completion call
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
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt }
            ],
            "temperature": request.temperature,
            "max_tokens": max_tokens_for(&request.text, self.api_type.max_tokens_ceiling()),
            "top_p": 0.95,
            "frequency_penalty": 0.0,
            "presence_penalty": 0.0
        }))
    }

    /// Send actual HTTP request
    async fn send_request(&self, body: &serde_json::Value) -> Result<Attempt> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
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

        let translation = json["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .ok_or_else(|| TranslationError::InvalidResponse {
                message: "No translation in response".to_string(),
            })?
            .trim()
            .to_string();

        let tokens_used = json["usage"]["total_tokens"].as_u64().unwrap_or(0) as usize;

        Ok(Attempt::Reply(BackendReply {
            translation,
            tokens_used,
        }))
    }
}

#[async_trait]
impl TranslatorBackend for ChatCompletionClient {
    fn name(&self) -> &str {
        self.api_type.as_str()
    }

    async fn translate(&self, request: &TranslationRequest) -> Result<BackendReply> {
        let body = self.build_body(request)?;
        debug!(
            "{} request: model={}, chars={}, max_tokens={}",
            self.api_type,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backend::build_http_client;
    use crate::core::test_support::{chat_reply, stub_settings, ProviderStub};
    use assert_json_diff::assert_json_include;
    use serde_json::json;

    async fn client_for(stub: &ProviderStub, api_type: ApiType) -> ChatCompletionClient {
        let base = stub.spawn().await;
        let settings = stub_settings(format!("{}/v1/chat/completions", base));
        ChatCompletionClient::new(
            build_http_client(&settings).unwrap(),
            api_type,
            "sk-test".to_string(),
            settings,
        )
    }

    fn request(text: &str) -> TranslationRequest {
        TranslationRequest::new(text, "deepseek-chat").with_temperature(0.7)
    }

    #[tokio::test]
    async fn test_request_shape_and_auth() {
        let stub = ProviderStub::new(vec![(200, chat_reply("  你好，世界。 "))]);
        let client = client_for(&stub, ApiType::DeepSeek).await;

        let reply = client.translate(&request("Hello, world.")).await.unwrap();
        assert_eq!(reply.translation, "你好，世界。");
        assert_eq!(reply.tokens_used, 30);

        assert_eq!(stub.calls(), 1);
        assert_eq!(stub.header(0, "authorization").as_deref(), Some("Bearer sk-test"));
        assert_json_include!(
            actual: stub.bodies()[0].clone(),
            expected: json!({
                "model": "deepseek-chat",
                "messages": [
                    { "role": "system" },
                    { "role": "user", "content": "Translate the following content into Chinese:\n\nHello, world." }
                ],
                "max_tokens": 256,
                "top_p": 0.95,
                "frequency_penalty": 0.0,
                "presence_penalty": 0.0
            })
        );
    }

    #[tokio::test]
    async fn test_rate_limit_then_success_makes_two_calls() {
        let stub = ProviderStub::new(vec![
            (429, json!({ "error": "slow down" })),
            (200, chat_reply("你好，世界。")),
        ]);
        let client = client_for(&stub, ApiType::OpenAi).await;

        let reply = client.translate(&request("Hello, world.")).await.unwrap();
        assert_eq!(reply.translation, "你好，世界。");
        assert_eq!(stub.calls(), 2);
    }

    #[tokio::test]
    async fn test_persistent_rate_limit() {
        let stub = ProviderStub::new(vec![(429, json!({ "error": "slow down" }))]);
        let client = client_for(&stub, ApiType::DeepSeek).await;

        let err = client.translate(&request("Hello, world.")).await.unwrap_err();
        assert_eq!(err, TranslationError::RateLimited);
        assert_eq!(stub.calls(), 2);
    }

    #[tokio::test]
    async fn test_provider_error_carries_status_and_body() {
        let stub = ProviderStub::new(vec![(401, json!({ "error": "bad key" }))]);
        let client = client_for(&stub, ApiType::DeepSeek).await;

        let err = client.translate(&request("Hello, world.")).await.unwrap_err();
        match err {
            TranslationError::ProviderError { status, body } => {
                assert_eq!(status, 401);
                assert!(body.contains("bad key"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn test_incomplete_reply_is_retried_once() {
        let stub = ProviderStub::new(vec![
            (200, chat_reply("你好...")),
            (200, chat_reply("你好，世界。")),
        ]);
        let client = client_for(&stub, ApiType::DeepSeek).await;

        let reply = client.translate(&request("Hello, world.")).await.unwrap();
        assert_eq!(reply.translation, "你好，世界。");
        assert_eq!(stub.calls(), 2);
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // Reserve a port, then close it so nothing is listening
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let settings = stub_settings(format!("http://{}/v1/chat/completions", addr));
        let client = ChatCompletionClient::new(
            build_http_client(&settings).unwrap(),
            ApiType::DeepSeek,
            "sk-test".to_string(),
            settings,
        );

        let err = client.translate(&request("Hello, world.")).await.unwrap_err();
        assert!(matches!(err, TranslationError::NetworkError { .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn test_malformed_json_is_invalid_response() {
        let stub = ProviderStub::new(vec![(200, json!({ "unexpected": true }))]);
        let client = client_for(&stub, ApiType::DeepSeek).await;

        let err = client.translate(&request("Hello, world.")).await.unwrap_err();
        assert!(matches!(err, TranslationError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn test_context_is_sent_when_enabled() {
        let stub = ProviderStub::new(vec![(200, chat_reply("第二段。"))]);
        let base = stub.spawn().await;
        let mut settings = stub_settings(format!("{}/v1/chat/completions", base));
        settings.include_context = true;
        let client = ChatCompletionClient::new(
            build_http_client(&settings).unwrap(),
            ApiType::DeepSeek,
            "sk-test".to_string(),
            settings,
        );

        let req = request("Second paragraph.").with_context("First paragraph.");
        client.translate(&req).await.unwrap();

        let system = stub.bodies()[0]["messages"][0]["content"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(system.ends_with("First paragraph."));
    }

    #[tokio::test]
    async fn test_malformed_override_never_reaches_provider() {
        let stub = ProviderStub::new(vec![(200, chat_reply("unused"))]);
        let client = client_for(&stub, ApiType::DeepSeek).await;

        let req = request("Hello").with_prompts(None, Some("Translate please".to_string()));
        let err = client.translate(&req).await.unwrap_err();
        assert!(matches!(err, TranslationError::InvalidPrompt { .. }));
        assert_eq!(stub.calls(), 0);
    }
}
