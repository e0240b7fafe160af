//! Thin HTTP client for the Ollama REST API.
//!
//! Stateless per call: the base URL and model are passed in each time so that
//! a settings change takes effect on the next request.

use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use shared::agent_api::ChatMessage;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{extract_nested_error, OllamaError};

/// Raw response body of a streaming call.
pub type ByteStream = BoxStream<'static, Result<Bytes, OllamaError>>;

// No overall timeout: pulls and long generations may legitimately run for a
// long time.
static SHARED_HTTP: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(2)
        .build()
        .expect("failed to build HTTP client")
});

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Serialize)]
struct PullRequest<'a> {
    name: &'a str,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    name: &'a str,
}

/// Body of a non-streaming `/api/generate` call.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    pub response: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub eval_count: Option<u64>,
    #[serde(default)]
    pub total_duration: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified_at: Option<String>,
    #[serde(default)]
    pub digest: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelList {
    #[serde(default)]
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: Client,
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

impl OllamaClient {
    pub fn new() -> Self {
        Self {
            http: SHARED_HTTP.clone(),
        }
    }

    /// Single-shot completion (`stream: false`).
    pub async fn generate(
        &self,
        url: &str,
        model: &str,
        prompt: &str,
    ) -> Result<GenerateResponse, OllamaError> {
        let endpoint = endpoint(url, "generate");
        debug!(%endpoint, model, prompt_len = prompt.len(), "generate");
        let req = GenerateRequest {
            model,
            prompt,
            stream: false,
        };
        let resp = self.send(&endpoint, self.http.post(&endpoint).json(&req)).await?;
        if !resp.status().is_success() {
            warn!(status = %resp.status(), "generate failed");
            return Err(OllamaError::from_status(resp.status()));
        }
        read_json(resp).await
    }

    /// Streaming chat. Returns the raw NDJSON body.
    pub async fn chat(
        &self,
        url: &str,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<ByteStream, OllamaError> {
        let endpoint = endpoint(url, "chat");
        debug!(%endpoint, model, messages = messages.len(), "chat");
        let req = ChatRequest {
            model,
            messages,
            stream: true,
        };
        let resp = self.send(&endpoint, self.http.post(&endpoint).json(&req)).await?;
        if !resp.status().is_success() {
            let err = error_from_body(resp).await;
            warn!(error = %err, "chat failed");
            return Err(err);
        }
        Ok(into_byte_stream(resp))
    }

    /// Streaming model download. Returns the raw NDJSON progress body.
    pub async fn pull(&self, url: &str, model_name: &str) -> Result<ByteStream, OllamaError> {
        let endpoint = endpoint(url, "pull");
        debug!(%endpoint, model_name, "pull");
        if model_name.contains('/') && !model_name.starts_with("hf.co/") {
            debug!(model_name, "model name has '/' but no hf.co/ prefix");
        }
        let req = PullRequest {
            name: model_name,
            stream: true,
        };
        let resp = self.send(&endpoint, self.http.post(&endpoint).json(&req)).await?;
        if !resp.status().is_success() {
            let err = match error_from_body(resp).await {
                OllamaError::HttpStatus { code, message } => OllamaError::HttpStatus {
                    code,
                    message: extract_nested_error(&message),
                },
                other => other,
            };
            warn!(error = %err, "pull failed");
            return Err(err);
        }
        Ok(into_byte_stream(resp))
    }

    /// Remove a local model. An empty response body is returned as `{}`.
    pub async fn delete_model(
        &self,
        url: &str,
        model_name: &str,
    ) -> Result<serde_json::Value, OllamaError> {
        let endpoint = endpoint(url, "delete");
        debug!(%endpoint, model_name, "delete");
        let req = DeleteRequest { name: model_name };
        let resp = self
            .send(&endpoint, self.http.delete(&endpoint).json(&req))
            .await?;
        if !resp.status().is_success() {
            warn!(status = %resp.status(), "delete failed");
            return Err(OllamaError::from_status(resp.status()));
        }

        let body = resp.text().await.map_err(OllamaError::Stream)?;
        if body.trim().is_empty() {
            return Ok(serde_json::json!({}));
        }
        match serde_json::from_str(&body) {
            Ok(value) => Ok(value),
            Err(e) => {
                debug!(error = %e, "non-JSON delete response treated as empty");
                Ok(serde_json::json!({}))
            }
        }
    }

    /// Locally available models (`/api/tags`).
    pub async fn list_models(&self, url: &str) -> Result<ModelList, OllamaError> {
        let endpoint = endpoint(url, "tags");
        let resp = self.send(&endpoint, self.http.get(&endpoint)).await?;
        if !resp.status().is_success() {
            warn!(status = %resp.status(), "listing models failed");
            return Err(OllamaError::from_status(resp.status()));
        }
        read_json(resp).await
    }

    /// Check if the server answers at all.
    pub async fn is_available(&self, url: &str) -> bool {
        let endpoint = endpoint(url, "tags");
        matches!(self.http.get(&endpoint).send().await, Ok(r) if r.status().is_success())
    }

    async fn send(&self, endpoint: &str, req: RequestBuilder) -> Result<Response, OllamaError> {
        req.send().await.map_err(|source| OllamaError::Connection {
            url: endpoint.to_string(),
            source,
        })
    }
}

fn endpoint(base: &str, name: &str) -> String {
    format!("{}/api/{}", base.trim_end_matches('/'), name)
}

async fn read_json<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T, OllamaError> {
    let body = resp.text().await.map_err(OllamaError::Stream)?;
    Ok(serde_json::from_str(&body)?)
}

async fn error_from_body(resp: Response) -> OllamaError {
    let status = resp.status();
    match resp.text().await {
        Ok(body) => OllamaError::from_error_body(status, &body),
        Err(_) => OllamaError::from_status(status),
    }
}

fn into_byte_stream(resp: Response) -> ByteStream {
    resp.bytes_stream()
        .map(|chunk| chunk.map_err(OllamaError::Stream))
        .boxed()
}
