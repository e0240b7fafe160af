//! Requests the user fires at the model and what comes back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of content was captured from the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// A plain text selection
    Text,
    /// The HTML of a selected element
    Html,
    /// The full page
    Page,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Html => "html",
            ContentType::Page => "page",
        }
    }

    /// Label placed in front of the content when an instruction is used.
    pub fn label(&self) -> &'static str {
        match self {
            ContentType::Text => "Text",
            ContentType::Html => "HTML",
            ContentType::Page => "Page",
        }
    }
}

impl std::str::FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(ContentType::Text),
            "html" => Ok(ContentType::Html),
            "page" => Ok(ContentType::Page),
            other => Err(format!("unknown content type: {}", other)),
        }
    }
}

/// A single "send this to the model" action. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Correlation id tying the request to its outcome
    pub id: Uuid,
    pub content_text: String,
    /// May be empty; the stored prompt template is used then.
    pub custom_prompt: String,
    pub content_type: ContentType,
    pub enqueued_at: DateTime<Utc>,
}

impl GenerationRequest {
    pub fn new(content_text: impl Into<String>, content_type: ContentType) -> Self {
        Self {
            id: Uuid::new_v4(),
            content_text: content_text.into(),
            custom_prompt: String::new(),
            content_type,
            enqueued_at: Utc::now(),
        }
    }

    pub fn text(content_text: impl Into<String>) -> Self {
        Self::new(content_text, ContentType::Text)
    }

    pub fn with_prompt(mut self, custom_prompt: impl Into<String>) -> Self {
        self.custom_prompt = custom_prompt.into();
        self
    }
}

/// Successful outcome of a [`GenerationRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub request_id: Uuid,
    pub model: String,
    /// The instruction that was actually applied, if any
    pub prompt_used: Option<String>,
    pub text: String,
}
