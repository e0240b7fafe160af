//! Model download progress.
//!
//! Ollama reports pull progress as free-form status strings plus optional
//! byte counters. [`PullTracker`] folds those lines into a
//! [`PullProgressState`] whose percentage never goes backwards.

use futures::StreamExt;
use serde_json::Value;
use shared::progress::{PullPhase, PullProgressState, PullTerminal};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::error::{extract_nested_error, OllamaError};
use crate::ndjson::read_ndjson;
use crate::ollama::OllamaClient;

const PULLING_PERCENT: u8 = 5;
const RESOLVING_PERCENT: u8 = 10;
const DOWNLOADING_PERCENT: u8 = 15;
const VERIFYING_PERCENT: u8 = 90;

/// How a pull that did not error ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    Success,
    /// The stream closed without a success marker. Not a failure: the model
    /// may well be there, we just never heard so.
    Incomplete { last_status: String },
}

#[derive(Debug)]
pub struct PullTracker {
    state: PullProgressState,
    phase: PullPhase,
    error: Option<String>,
}

impl Default for PullTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PullTracker {
    pub fn new() -> Self {
        Self {
            state: PullProgressState {
                status_text: "Initializing...".to_string(),
                ..PullProgressState::default()
            },
            phase: PullPhase::Initializing,
            error: None,
        }
    }

    pub fn state(&self) -> &PullProgressState {
        &self.state
    }

    pub fn phase(&self) -> PullPhase {
        self.phase
    }

    /// Innermost error message, once errored.
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Fold one stream line into the state. Returns `true` if anything changed.
    ///
    /// Lines arriving after a terminal state are ignored.
    pub fn observe(&mut self, line: &Value) -> bool {
        if self.phase.is_terminal() {
            return false;
        }

        if let Some(error) = line.get("error") {
            let raw = error
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            let message = extract_nested_error(&raw);
            warn!(%raw, %message, "pull reported an error");
            self.phase = PullPhase::Errored;
            self.state.terminal = PullTerminal::Error;
            self.state.status_text = message.clone();
            self.error = Some(message);
            return true;
        }

        let Some(status) = line.get("status").and_then(Value::as_str) else {
            return false;
        };
        self.state.last_raw_status = status.to_string();

        if is_success_status(status, line) {
            self.phase = PullPhase::Completed;
            self.state.terminal = PullTerminal::Success;
            self.state.percentage = 100;
            self.state.status_text = status.to_string();
        } else if status.contains("pulling") {
            self.advance(PullPhase::Pulling, PULLING_PERCENT);
            self.state.status_text = status.to_string();
        } else if status.contains("resolving") {
            self.advance(PullPhase::Resolving, RESOLVING_PERCENT);
            self.state.status_text = status.to_string();
        } else if status.contains("downloading") {
            match byte_counters(line) {
                Some((completed, total)) => {
                    let percent = percent_of(completed, total);
                    self.advance(PullPhase::Downloading, percent);
                    self.state.status_text = format!(
                        "{}: {} / {} ({}%)",
                        status,
                        format_bytes(completed),
                        format_bytes(total),
                        percent
                    );
                }
                None => {
                    self.advance(PullPhase::Downloading, DOWNLOADING_PERCENT);
                    self.state.status_text = status.to_string();
                }
            }
        } else if status.contains("verifying") {
            self.advance(PullPhase::Verifying, VERIFYING_PERCENT);
            self.state.status_text = status.to_string();
        } else {
            // "writing manifest", "removing any unused layers", ...
            self.state.status_text = status.to_string();
        }

        debug!(
            phase = ?self.phase,
            percentage = self.state.percentage,
            status,
            "pull progress"
        );
        true
    }

    /// The stream ended. Anything not already terminal becomes `Incomplete`,
    /// keeping the last status text. Returns `true` if that transition happened.
    pub fn finish(&mut self) -> bool {
        if self.phase.is_terminal() {
            return false;
        }
        self.phase = PullPhase::Incomplete;
        self.state.terminal = PullTerminal::Incomplete;
        true
    }

    fn advance(&mut self, phase: PullPhase, percent: u8) {
        self.phase = phase;
        self.state.percentage = self.state.percentage.max(percent);
    }
}

fn is_success_status(status: &str, line: &Value) -> bool {
    status == "success"
        || status.contains("verifying sha256 digest")
        || (status.contains("success") && line.get("completed").is_some())
}

fn byte_counters(line: &Value) -> Option<(u64, u64)> {
    let completed = line.get("completed").and_then(Value::as_u64)?;
    let total = line.get("total").and_then(Value::as_u64)?;
    (total > 0).then_some((completed, total))
}

fn percent_of(completed: u64, total: u64) -> u8 {
    let percent = (completed as f64 / total as f64 * 100.0).round();
    percent.clamp(0.0, 100.0) as u8
}

/// Human-readable byte count, e.g. `1.9 GB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Pull `model_name`, reporting every state change to `progress`.
///
/// A non-2xx answer to the pull request itself is reported as
/// [`OllamaError::Pull`] like an error line inside the stream. A dropped
/// progress receiver is ignored. Pulls are not cancellable; the
/// call runs until the server closes the stream or reports an error.
pub async fn pull_model(
    client: &OllamaClient,
    url: &str,
    model_name: &str,
    progress: UnboundedSender<PullProgressState>,
) -> Result<PullOutcome, OllamaError> {
    info!(model_name, "starting pull");
    let bytes = client.pull(url, model_name).await.map_err(|e| match e {
        OllamaError::HttpStatus { message, .. } => OllamaError::Pull(message),
        other => other,
    })?;
    let mut lines = read_ndjson(bytes);
    let mut tracker = PullTracker::new();

    while let Some(line) = lines.next().await {
        let line = line?;
        if tracker.observe(&line) {
            let _ = progress.send(tracker.state().clone());
        }
        if let Some(message) = tracker.error_message() {
            return Err(OllamaError::Pull(message.to_string()));
        }
    }

    if tracker.finish() {
        let _ = progress.send(tracker.state().clone());
    }

    match tracker.phase() {
        PullPhase::Completed => {
            info!(model_name, "model pulled successfully");
            Ok(PullOutcome::Success)
        }
        _ => {
            let last_status = tracker.state().last_raw_status.clone();
            warn!(model_name, %last_status, "pull ended without completion status");
            Ok(PullOutcome::Incomplete { last_status })
        }
    }
}
