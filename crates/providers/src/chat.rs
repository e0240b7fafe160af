//! Token-by-token chat streaming.

use futures::StreamExt;
use serde_json::Value;
use shared::agent_api::{ChatMessage, StreamChunk};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::error::OllamaError;
use crate::ndjson::read_ndjson;
use crate::ollama::OllamaClient;

/// The assistant message being assembled from a chat stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatAccumulator {
    pub message_id: Uuid,
    pub content: String,
    /// The server sent `done: true`.
    pub done: bool,
}

#[derive(Debug)]
pub struct ChatAggregator {
    acc: ChatAccumulator,
}

impl Default for ChatAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatAggregator {
    pub fn new() -> Self {
        Self {
            acc: ChatAccumulator {
                message_id: Uuid::new_v4(),
                content: String::new(),
                done: false,
            },
        }
    }

    /// Fold one stream line in. Returns the newly received text, if any.
    ///
    /// Once a `done: true` line has been seen every further line is ignored.
    pub fn observe(&mut self, line: &Value) -> Option<String> {
        if self.acc.done {
            return None;
        }

        let delta = line
            .pointer("/message/content")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        if let Some(text) = &delta {
            self.acc.content.push_str(text);
        }

        if line.get("done").and_then(Value::as_bool) == Some(true) {
            self.acc.done = true;
        }
        delta
    }

    pub fn is_done(&self) -> bool {
        self.acc.done
    }

    pub fn content(&self) -> &str {
        &self.acc.content
    }

    pub fn into_accumulator(self) -> ChatAccumulator {
        self.acc
    }
}

/// Run a streaming chat, sending each delta to `tx` as it arrives.
///
/// Cancelling `cancel` drops the response body and returns
/// [`OllamaError::Cancelled`]. A non-2xx status is reported before any
/// streaming starts.
pub async fn stream_chat(
    client: &OllamaClient,
    url: &str,
    model: &str,
    messages: &[ChatMessage],
    tx: UnboundedSender<StreamChunk>,
    cancel: CancellationToken,
) -> Result<ChatAccumulator, OllamaError> {
    let bytes = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(OllamaError::Cancelled),
        resp = client.chat(url, model, messages) => resp?,
    };

    let mut lines = read_ndjson(bytes);
    let mut aggregator = ChatAggregator::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(chars = aggregator.content().len(), "chat stream cancelled");
                return Err(OllamaError::Cancelled);
            }
            next = lines.next() => next,
        };
        let Some(line) = next else {
            break;
        };
        if let Some(delta) = aggregator.observe(&line?) {
            let _ = tx.send(StreamChunk::Text(delta));
        }
        if aggregator.is_done() {
            break;
        }
    }

    let _ = tx.send(StreamChunk::Done);
    Ok(aggregator.into_accumulator())
}
