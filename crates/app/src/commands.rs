//! Subcommand implementations. Model output goes to stdout, status to stderr.

use agent_host::{OllamaExecutor, QueueTicket, RequestExecutor, RequestQueue};
use anyhow::{anyhow, bail, Context, Result};
use providers::error::CONNECT_HINT;
use providers::{format_bytes, pull_model, stream_chat, OllamaClient, OllamaError, PullOutcome};
use services::prompt::ChatSession;
use services::settings_store::{FileSettingsStore, SettingsProvider};
use shared::agent_api::StreamChunk;
use shared::events::QueueEvent;
use shared::request::{ContentType, GenerationRequest};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cli::ConfigAction;

/// Turn a library error into the short message the user should see.
fn user_facing(e: OllamaError) -> anyhow::Error {
    debug!(error = ?e, "request failed");
    anyhow!(e.user_message())
}

/// Input text with a label for messages. Stdin is used when no files are given.
async fn read_inputs(inputs: &[PathBuf]) -> Result<Vec<(String, String)>> {
    if inputs.is_empty() {
        let mut text = String::new();
        tokio::io::stdin()
            .read_to_string(&mut text)
            .await
            .context("failed to read stdin")?;
        return Ok(vec![("stdin".to_string(), text)]);
    }

    let mut out = Vec::with_capacity(inputs.len());
    for path in inputs {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        out.push((path.display().to_string(), text));
    }
    Ok(out)
}

pub async fn send(
    settings: Arc<dyn SettingsProvider>,
    client: OllamaClient,
    content_type: ContentType,
    prompt: Option<String>,
    inputs: &[PathBuf],
) -> Result<ExitCode> {
    let inputs: Vec<(String, String)> = read_inputs(inputs)
        .await?
        .into_iter()
        .filter(|(label, text)| {
            let keep = !text.trim().is_empty();
            if !keep {
                warn!(input = %label, "skipping empty input");
            }
            keep
        })
        .collect();
    if inputs.is_empty() {
        bail!("nothing to send: all inputs are empty");
    }

    let executor: Arc<dyn RequestExecutor> = Arc::new(OllamaExecutor::new(client, settings));
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let queue = RequestQueue::with_events(executor, events_tx);

    let show_headers = inputs.len() > 1;
    let tickets: Vec<(String, QueueTicket)> = inputs
        .into_iter()
        .map(|(label, text)| {
            let mut request = GenerationRequest::new(text, content_type);
            if let Some(prompt) = &prompt {
                request = request.with_prompt(prompt.clone());
            }
            (label, queue.enqueue(request))
        })
        .collect();

    let labels: HashMap<Uuid, String> = tickets
        .iter()
        .map(|(label, ticket)| (ticket.id(), label.clone()))
        .collect();
    let reporter = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            if let QueueEvent::Started { request_id } = event {
                if let Some(label) = labels.get(&request_id) {
                    eprintln!("Processing {}...", label);
                }
            }
        }
    });

    let mut failed = 0usize;
    for (label, ticket) in tickets {
        match ticket.outcome().await {
            Ok(response) => {
                if show_headers {
                    println!("==> {} <==", label);
                }
                println!("{}", response.text.trim_end());
                if show_headers {
                    println!();
                }
            }
            Err(e) => {
                failed += 1;
                debug!(error = ?e, input = %label, "request failed");
                eprintln!("{}: {}", label, e.user_message());
            }
        }
    }
    reporter.abort();

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

pub async fn chat(
    settings: &dyn SettingsProvider,
    client: &OllamaClient,
    page: Option<PathBuf>,
) -> Result<()> {
    let target = settings
        .settings()?
        .resolve()
        .map_err(|e| user_facing(e.into()))?;
    if !client.is_available(&target.url).await {
        bail!(CONNECT_HINT);
    }

    let mut session = ChatSession::new();
    if let Some(path) = page {
        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        session = session.with_page_context(text);
    }

    eprintln!(
        "Chatting with {} (/clear resets the conversation, /exit or Ctrl-D quits)",
        target.model
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/exit" | "/quit" => break,
            "/clear" => {
                session.clear();
                eprintln!("Conversation cleared.");
                continue;
            }
            _ => {}
        }

        let messages = session.user_turn(line);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let printer = tokio::spawn(async move {
            let mut stdout = std::io::stdout();
            while let Some(chunk) = rx.recv().await {
                match chunk {
                    StreamChunk::Text(text) => {
                        let _ = write!(stdout, "{}", text);
                        let _ = stdout.flush();
                    }
                    StreamChunk::Done => {
                        let _ = writeln!(stdout);
                    }
                }
            }
        });

        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        let result = stream_chat(client, &target.url, &target.model, &messages, tx, cancel).await;
        watcher.abort();
        let _ = printer.await;

        match result {
            Ok(reply) => session.assistant_reply(reply.content),
            Err(OllamaError::Cancelled) => eprintln!("\n[cancelled]"),
            Err(e) => {
                debug!(error = ?e, "chat failed");
                eprintln!("{}", e.user_message());
            }
        }
    }
    Ok(())
}

pub async fn pull(settings: &dyn SettingsProvider, client: &OllamaClient, name: &str) -> Result<ExitCode> {
    let url = settings.settings()?.base_url();
    let (tx, mut rx) = mpsc::unbounded_channel::<shared::progress::PullProgressState>();
    let printer = tokio::spawn(async move {
        while let Some(state) = rx.recv().await {
            eprintln!("[{:>3}%] {}", state.percentage, state.status_text);
        }
    });

    let outcome = pull_model(client, &url, name, tx).await;
    let _ = printer.await;

    match outcome {
        Ok(PullOutcome::Success) => {
            println!("Model {} pulled successfully.", name);
            Ok(ExitCode::SUCCESS)
        }
        Ok(PullOutcome::Incomplete { last_status }) => {
            println!("Pull ended without confirmation (last status: {}).", last_status);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            debug!(error = ?e, "pull failed");
            eprintln!("Pull failed: {}", e.user_message());
            Ok(ExitCode::FAILURE)
        }
    }
}

pub async fn delete(settings: &dyn SettingsProvider, client: &OllamaClient, name: &str) -> Result<()> {
    let url = settings.settings()?.base_url();
    client.delete_model(&url, name).await.map_err(user_facing)?;
    println!("Deleted {}.", name);
    Ok(())
}

pub async fn models(settings: &dyn SettingsProvider, client: &OllamaClient) -> Result<()> {
    let url = settings.settings()?.base_url();
    let list = client.list_models(&url).await.map_err(user_facing)?;
    if list.models.is_empty() {
        println!("No models installed. Try `xandai pull llama3.2`.");
        return Ok(());
    }

    let width = list.models.iter().map(|m| m.name.len()).max().unwrap_or(0);
    for model in &list.models {
        println!("{:<width$}  {}", model.name, format_bytes(model.size), width = width);
    }
    Ok(())
}

pub fn config(store: &FileSettingsStore, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let settings = store.load()?;
            println!("# {}", store.path().display());
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        ConfigAction::SetUrl { url } => {
            let saved = store.update(|s| s.url = url.trim().to_string())?;
            println!("Server URL set to {}", saved.base_url());
        }
        ConfigAction::SetModel { model } => {
            let saved = store.update(|s| s.model = model.trim().to_string())?;
            println!("Model set to {}", saved.model);
        }
        ConfigAction::SetPrompt { prompt } => {
            let saved = store.update(|s| s.prompt_template = prompt)?;
            if saved.prompt_template.trim().is_empty() {
                println!("Prompt template cleared.");
            } else {
                println!("Prompt template saved.");
            }
        }
    }
    Ok(())
}
