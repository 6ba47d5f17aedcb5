//! In-process stub provider for backend tests

use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::post, Json, Router};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::core::backend::BackendSettings;

/// Scripted provider: replays `(status, body)` pairs, repeating the last one
#[derive(Clone, Default)]
pub struct ProviderStub {
    script: Arc<Mutex<VecDeque<(u16, Value)>>>,
    requests: Arc<Mutex<Vec<(HeaderMap, Value)>>>,
}

impl ProviderStub {
    pub fn new(script: Vec<(u16, Value)>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            requests: Arc::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn bodies(&self) -> Vec<Value> {
        self.requests.lock().unwrap().iter().map(|(_, b)| b.clone()).collect()
    }

    pub fn header(&self, call: usize, name: &str) -> Option<String> {
        self.requests.lock().unwrap()[call]
            .0
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    /// Serve on an ephemeral port, returning the base URL
    pub async fn spawn(&self) -> String {
        let app = Router::new()
            .route("/*path", post(handle))
            .with_state(self.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{}", addr)
    }
}

async fn handle(
    State(stub): State<ProviderStub>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    stub.requests.lock().unwrap().push((headers, body));

    let mut script = stub.script.lock().unwrap();
    let (status, reply) = if script.len() > 1 {
        script.pop_front().unwrap()
    } else {
        script.front().cloned().unwrap()
    };

    (StatusCode::from_u16(status).unwrap(), Json(reply))
}

/// Chat-completion reply carrying `content`
pub fn chat_reply(content: &str) -> Value {
    serde_json::json!({
        "id": "chatcmpl-test",
        "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }],
        "usage": { "prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30 }
    })
}

/// Settings pointing at a stub, with millisecond backoffs
pub fn stub_settings(endpoint: String) -> BackendSettings {
    BackendSettings {
        endpoint: Some(endpoint),
        timeout: Duration::from_secs(5),
        rate_limit_backoff: Duration::from_millis(10),
        incomplete_backoff: Duration::from_millis(10),
        include_context: false,
    }
}
