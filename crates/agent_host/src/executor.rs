//! The execution routine run for each queued request.

use async_trait::async_trait;
use providers::{OllamaClient, OllamaError};
use services::prompt::compose_prompt;
use services::settings_store::SettingsProvider;
use shared::request::{GenerationRequest, GenerationResponse};
use std::sync::Arc;
use tracing::debug;

/// Turns one request into a response. The queue calls this for one entry at
/// a time.
#[async_trait]
pub trait RequestExecutor: Send + Sync + 'static {
    async fn execute(&self, request: &GenerationRequest) -> Result<GenerationResponse, OllamaError>;
}

/// Production executor: current settings, composed prompt, one `generate` call.
pub struct OllamaExecutor {
    client: OllamaClient,
    settings: Arc<dyn SettingsProvider>,
}

impl OllamaExecutor {
    pub fn new(client: OllamaClient, settings: Arc<dyn SettingsProvider>) -> Self {
        Self { client, settings }
    }
}

#[async_trait]
impl RequestExecutor for OllamaExecutor {
    async fn execute(&self, request: &GenerationRequest) -> Result<GenerationResponse, OllamaError> {
        // Settings are read per request so a change applies to the next entry.
        let settings = self
            .settings
            .settings()
            .map_err(|e| OllamaError::Settings(format!("{:#}", e)))?;
        let target = settings.resolve()?;

        let composed = compose_prompt(request, &settings.prompt_template);
        debug!(
            request_id = %request.id,
            model = %target.model,
            content_type = request.content_type.as_str(),
            instruction = composed.instruction.is_some(),
            "executing request"
        );

        let reply = self
            .client
            .generate(&target.url, &target.model, &composed.prompt)
            .await?;

        Ok(GenerationResponse {
            request_id: request.id,
            model: if reply.model.is_empty() {
                target.model
            } else {
                reply.model
            },
            prompt_used: composed.instruction,
            text: reply.response,
        })
    }
}
