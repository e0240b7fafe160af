//! Error taxonomy for calls against the Ollama API.

use regex::Regex;
use reqwest::StatusCode;
use shared::settings::SettingsError;
use std::sync::LazyLock;

pub const CONNECT_HINT: &str =
    "Cannot connect to Ollama. Please ensure Ollama is running and the URL is correct.";

/// Known shapes of an error message nested inside another error string,
/// tried in order. The first capture wins.
static NESTED_ERROR_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r#"\{"error":"([^"]+)"\}"#).expect("valid regex"),
        Regex::new(r#"400:\s*\{"error":"([^"]+)"\}"#).expect("valid regex"),
        Regex::new(r#"pull model manifest:\s*\d+:\s*\{"error":"([^"]+)"\}"#)
            .expect("valid regex"),
    ]
});

#[derive(Debug, thiserror::Error)]
pub enum OllamaError {
    #[error("cannot connect to {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{message}")]
    HttpStatus { code: u16, message: String },

    #[error("stream read error: {0}")]
    Stream(#[source] reqwest::Error),

    #[error("invalid JSON in response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Pull(String),

    #[error("No model selected. Set one with `xandai config set-model <name>` or pass --model.")]
    ModelNotSelected,

    #[error("{0}")]
    Settings(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("request queue closed before the request finished")]
    QueueClosed,

    #[error("request execution aborted: {0}")]
    Aborted(String),
}

impl From<SettingsError> for OllamaError {
    fn from(e: SettingsError) -> Self {
        match e {
            SettingsError::ModelNotSelected => OllamaError::ModelNotSelected,
            other => OllamaError::Settings(other.to_string()),
        }
    }
}

impl OllamaError {
    /// Non-2xx response whose body we don't inspect.
    pub fn from_status(status: StatusCode) -> Self {
        OllamaError::HttpStatus {
            code: status.as_u16(),
            message: status_line(status),
        }
    }

    /// Non-2xx response where the body may carry `{"error": "..."}`.
    pub fn from_error_body(status: StatusCode, body: &str) -> Self {
        OllamaError::HttpStatus {
            code: status.as_u16(),
            message: error_body_message(status, body),
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            OllamaError::HttpStatus { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, OllamaError::Connection { .. })
    }

    /// Short text suitable for a transient notification.
    pub fn user_message(&self) -> String {
        match self {
            OllamaError::Connection { .. } => CONNECT_HINT.to_string(),
            OllamaError::Pull(message) => friendly_message(message),
            OllamaError::Stream(e) => format!("Connection to Ollama was interrupted: {}", e),
            OllamaError::Decode(e) => format!("Ollama returned an invalid response: {}", e),
            OllamaError::Cancelled => "Request cancelled.".to_string(),
            other => other.to_string(),
        }
    }
}

/// Message for a failed request, preferring the JSON `error` field of the body.
pub fn error_body_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(json) => match json.get("error").and_then(|e| e.as_str()) {
            Some(error) => error.to_string(),
            None => format!("HTTP Error: {}", status.as_u16()),
        },
        Err(_) if !body.trim().is_empty() => body.to_string(),
        Err(_) => status_line(status),
    }
}

/// `HTTP Error: 404 - Not Found`
fn status_line(status: StatusCode) -> String {
    format!(
        "HTTP Error: {} - {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown")
    )
}

/// Dig the innermost human-readable message out of a nested error string,
/// e.g. `pull model manifest: 400: {"error":"invalid model name"}`.
pub fn extract_nested_error(raw: &str) -> String {
    for pattern in NESTED_ERROR_PATTERNS.iter() {
        if let Some(m) = pattern.captures(raw).and_then(|c| c.get(1)) {
            return m.as_str().to_string();
        }
    }
    raw.to_string()
}

/// Map well-known pull failures to friendlier wording.
pub fn friendly_message(message: &str) -> String {
    if message.contains("404") {
        "Model not found. Please check the model name.".to_string()
    } else if message.contains("invalid model name") {
        "Invalid model name. Please check the format and try again.".to_string()
    } else if message.contains("not GGUF") || message.contains("not compatible") {
        "This model is not in GGUF format or not compatible with Ollama. \
         Try searching for a GGUF version of the model (e.g., add \"-GGUF\" to your search)."
            .to_string()
    } else {
        message.to_string()
    }
}
