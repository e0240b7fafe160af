//! Wire-format tests: a one-shot HTTP/1.1 mock server on loopback stands in
//! for Ollama. Each test checks the request the client sent and how the
//! response (single JSON body or NDJSON stream) was interpreted.

use providers::{pull_model, stream_chat, OllamaClient, OllamaError, PullOutcome};
use serde_json::Value;
use shared::agent_api::{ChatMessage, StreamChunk};
use shared::progress::{PullProgressState, PullTerminal};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// ── Minimal HTTP/1.1 mock server ──────────────────────────────────────────────

#[derive(Debug)]
struct CapturedRequest {
    method: String,
    path: String,
    body: Value,
}

/// Accept exactly one request, capture it, and answer with `status` and the
/// concatenation of `chunks`, flushing each chunk separately with `gap`
/// between them.
async fn mock_server_once(
    status: u16,
    chunks: Vec<String>,
    gap: Duration,
) -> (String, tokio::sync::oneshot::Receiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = tokio::sync::oneshot::channel::<CapturedRequest>();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let mut request_line = String::new();
        reader.read_line(&mut request_line).await.unwrap();
        let mut parts = request_line.trim().splitn(3, ' ');
        let method = parts.next().unwrap_or("").to_string();
        let path = parts.next().unwrap_or("").to_string();

        let mut content_length: usize = 0;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            let trimmed = line.trim();
            if trimmed.is_empty() {
                break;
            }
            if let Some((k, v)) = trimmed.split_once(": ") {
                if k.eq_ignore_ascii_case("content-length") {
                    content_length = v.parse().unwrap_or(0);
                }
            }
        }

        let mut body_bytes = vec![0u8; content_length];
        reader.read_exact(&mut body_bytes).await.unwrap();
        let body: Value = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);
        let _ = tx.send(CapturedRequest { method, path, body });

        let total: usize = chunks.iter().map(|c| c.len()).sum();
        let head = format!(
            "HTTP/1.1 {status} Mock\r\nContent-Type: application/x-ndjson\r\nContent-Length: {total}\r\nConnection: close\r\n\r\n"
        );
        let _ = write_half.write_all(head.as_bytes()).await;
        for chunk in chunks {
            let _ = write_half.write_all(chunk.as_bytes()).await;
            let _ = write_half.flush().await;
            tokio::time::sleep(gap).await;
        }
    });

    (format!("http://127.0.0.1:{port}"), rx)
}

async fn respond(status: u16, body: &str) -> (String, tokio::sync::oneshot::Receiver<CapturedRequest>) {
    mock_server_once(status, vec![body.to_string()], Duration::ZERO).await
}

fn ndjson(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|l| format!("{l}\n")).collect()
}

// ── generate ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn generate_sends_non_streaming_request() {
    let (url, req_rx) = respond(200, r#"{"model":"llama3.2","response":"Short summary.","done":true}"#).await;

    let resp = OllamaClient::new()
        .generate(&url, "llama3.2", "Summarize\n\nText:\nhello")
        .await
        .unwrap();
    assert_eq!(resp.response, "Short summary.");
    assert!(resp.done);

    let req = req_rx.await.unwrap();
    assert_eq!(req.method, "POST");
    assert_eq!(req.path, "/api/generate");
    assert_eq!(req.body["model"], "llama3.2");
    assert_eq!(req.body["prompt"], "Summarize\n\nText:\nhello");
    assert_eq!(req.body["stream"], false);
}

#[tokio::test]
async fn generate_non_2xx_is_http_status_error() {
    let (url, _req) = respond(500, "boom").await;

    let err = OllamaClient::new()
        .generate(&url, "llama3.2", "hi")
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), Some(500));
    assert_eq!(err.to_string(), "HTTP Error: 500 - Internal Server Error");
}

#[tokio::test]
async fn generate_malformed_body_is_decode_error() {
    let (url, _req) = respond(200, "{not json").await;

    let err = OllamaClient::new()
        .generate(&url, "llama3.2", "hi")
        .await
        .unwrap_err();
    assert!(matches!(err, OllamaError::Decode(_)), "got {err:?}");
}

#[tokio::test]
async fn unreachable_server_is_connection_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = OllamaClient::new()
        .generate(&format!("http://127.0.0.1:{port}"), "llama3.2", "hi")
        .await
        .unwrap_err();
    assert!(err.is_connection(), "got {err:?}");
    assert!(err.user_message().contains("Cannot connect to Ollama"));
}

// ── chat ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn chat_streams_deltas_in_order() {
    let (url, req_rx) = mock_server_once(
        200,
        ndjson(&[
            r#"{"message":{"role":"assistant","content":"Hel"},"done":false}"#,
            r#"{"message":{"role":"assistant","content":"lo"},"done":false}"#,
            r#"{"done":true}"#,
        ]),
        Duration::from_millis(5),
    )
    .await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let messages = vec![ChatMessage::system("be brief"), ChatMessage::user("greet me")];
    let acc = stream_chat(
        &OllamaClient::new(),
        &url,
        "llama3.2",
        &messages,
        tx,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(acc.content, "Hello");
    assert!(acc.done);

    let mut chunks = Vec::new();
    while let Some(chunk) = rx.recv().await {
        chunks.push(chunk);
    }
    assert_eq!(
        chunks,
        vec![
            StreamChunk::Text("Hel".into()),
            StreamChunk::Text("lo".into()),
            StreamChunk::Done
        ]
    );

    let req = req_rx.await.unwrap();
    assert_eq!(req.path, "/api/chat");
    assert_eq!(req.body["stream"], true);
    assert_eq!(req.body["messages"].as_array().map(|m| m.len()), Some(2));
}

#[tokio::test]
async fn chat_error_body_surfaces_server_message() {
    let (url, _req) = respond(404, r#"{"error":"model 'nope' not found, try pulling it first"}"#).await;

    let (tx, _rx) = mpsc::unbounded_channel();
    let err = stream_chat(
        &OllamaClient::new(),
        &url,
        "nope",
        &[ChatMessage::user("hi")],
        tx,
        CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status_code(), Some(404));
    assert_eq!(err.to_string(), "model 'nope' not found, try pulling it first");
}

#[tokio::test]
async fn chat_template_error_keeps_server_wording() {
    let (url, _req) = respond(400, r#"{"error":"prompt is not compatible with template"}"#).await;

    let (tx, _rx) = mpsc::unbounded_channel();
    let err = stream_chat(
        &OllamaClient::new(),
        &url,
        "llama3.2",
        &[ChatMessage::user("hi")],
        tx,
        CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.user_message(), "prompt is not compatible with template");
}

#[tokio::test]
async fn chat_completes_when_chunk_receiver_is_gone() {
    let (url, _req) = mock_server_once(
        200,
        ndjson(&[
            r#"{"message":{"content":"Hel"}}"#,
            r#"{"message":{"content":"lo"}}"#,
            r#"{"done":true}"#,
        ]),
        Duration::from_millis(2),
    )
    .await;

    let (tx, rx) = mpsc::unbounded_channel();
    drop(rx);
    let reply = stream_chat(
        &OllamaClient::new(),
        &url,
        "llama3.2",
        &[ChatMessage::user("hi")],
        tx,
        CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(reply.content, "Hello");
    assert!(reply.done);
}

#[tokio::test]
async fn chat_cancellation_stops_the_stream() {
    let (url, _req) = mock_server_once(
        200,
        ndjson(&[
            r#"{"message":{"content":"first"}}"#,
            r#"{"message":{"content":"never seen"}}"#,
            r#"{"done":true}"#,
        ]),
        Duration::from_secs(30),
    )
    .await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let client = OllamaClient::new();
    let messages = vec![ChatMessage::user("hi")];
    let call = stream_chat(&client, &url, "llama3.2", &messages, tx, cancel.clone());

    let watcher = async {
        assert_eq!(rx.recv().await, Some(StreamChunk::Text("first".into())));
        cancel.cancel();
    };

    let (result, ()) = tokio::time::timeout(Duration::from_secs(10), async {
        tokio::join!(call, watcher)
    })
    .await
    .expect("cancellation should end the call promptly");
    assert!(matches!(result, Err(OllamaError::Cancelled)));
}

// ── pull ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn pull_reports_progress_until_success() {
    let (url, req_rx) = mock_server_once(
        200,
        ndjson(&[
            r#"{"status":"pulling manifest"}"#,
            r#"{"status":"downloading","digest":"sha256:aa","completed":50,"total":100}"#,
            r#"{"status":"downloading","digest":"sha256:aa","completed":100,"total":100}"#,
            r#"{"status":"writing manifest"}"#,
            r#"{"status":"success"}"#,
        ]),
        Duration::from_millis(2),
    )
    .await;

    let (tx, mut rx) = mpsc::unbounded_channel::<PullProgressState>();
    let outcome = pull_model(&OllamaClient::new(), &url, "llama3.2:1b", tx)
        .await
        .unwrap();
    assert_eq!(outcome, PullOutcome::Success);

    let mut updates = Vec::new();
    while let Some(update) = rx.recv().await {
        updates.push(update);
    }
    let percentages: Vec<u8> = updates.iter().map(|u| u.percentage).collect();
    assert_eq!(percentages, vec![5, 50, 100, 100, 100]);
    assert_eq!(updates.last().map(|u| u.terminal), Some(PullTerminal::Success));

    let req = req_rx.await.unwrap();
    assert_eq!(req.path, "/api/pull");
    assert_eq!(req.body["name"], "llama3.2:1b");
    assert_eq!(req.body["stream"], true);
}

#[tokio::test]
async fn pull_succeeds_when_progress_receiver_is_gone() {
    let (url, _req) = mock_server_once(
        200,
        ndjson(&[
            r#"{"status":"pulling manifest"}"#,
            r#"{"status":"downloading","completed":100,"total":100}"#,
            r#"{"status":"success"}"#,
        ]),
        Duration::from_millis(2),
    )
    .await;

    let (tx, rx) = mpsc::unbounded_channel::<PullProgressState>();
    drop(rx);
    let outcome = pull_model(&OllamaClient::new(), &url, "llama3.2:1b", tx).await;
    assert!(matches!(outcome, Ok(PullOutcome::Success)), "got {outcome:?}");
}

#[tokio::test]
async fn pull_http_404_gets_friendly_wording() {
    let (url, _req) = respond(404, "").await;

    let (tx, _rx) = mpsc::unbounded_channel();
    let err = pull_model(&OllamaClient::new(), &url, "ghost", tx)
        .await
        .unwrap_err();
    assert!(matches!(&err, OllamaError::Pull(_)), "got {err:?}");
    assert_eq!(err.user_message(), "Model not found. Please check the model name.");
}

#[tokio::test]
async fn pull_without_terminal_line_is_incomplete() {
    let (url, _req) = mock_server_once(
        200,
        ndjson(&[
            r#"{"status":"pulling manifest"}"#,
            r#"{"status":"downloading","completed":10,"total":100}"#,
        ]),
        Duration::ZERO,
    )
    .await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let outcome = pull_model(&OllamaClient::new(), &url, "llama3.2", tx)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        PullOutcome::Incomplete {
            last_status: "downloading".into()
        }
    );

    let mut last = None;
    while let Some(update) = rx.recv().await {
        last = Some(update);
    }
    assert_eq!(last.map(|u| u.terminal), Some(PullTerminal::Incomplete));
}

#[tokio::test]
async fn pull_error_line_fails_with_innermost_message() {
    let (url, _req) = mock_server_once(
        200,
        ndjson(&[
            r#"{"status":"pulling manifest"}"#,
            r#"{"error":"pull model manifest: 400: {\"error\":\"invalid model name\"}"}"#,
        ]),
        Duration::ZERO,
    )
    .await;

    let (tx, _rx) = mpsc::unbounded_channel();
    let err = pull_model(&OllamaClient::new(), &url, "Bad Name", tx)
        .await
        .unwrap_err();
    assert!(matches!(&err, OllamaError::Pull(m) if m == "invalid model name"), "got {err:?}");
    assert_eq!(
        err.user_message(),
        "Invalid model name. Please check the format and try again."
    );
}

#[tokio::test]
async fn pull_http_failure_extracts_nested_error() {
    let (url, _req) = respond(
        500,
        r#"{"error":"pull model manifest: 400: {\"error\":\"invalid model name\"}"}"#,
    )
    .await;

    let err = OllamaClient::new().pull(&url, "x y").await.err().unwrap();
    assert_eq!(err.status_code(), Some(500));
    assert_eq!(err.to_string(), "invalid model name");
}

// ── delete / tags ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_accepts_empty_body() {
    let (url, req_rx) = respond(200, "").await;

    let value = OllamaClient::new()
        .delete_model(&url, "llama3.2")
        .await
        .unwrap();
    assert_eq!(value, serde_json::json!({}));

    let req = req_rx.await.unwrap();
    assert_eq!(req.method, "DELETE");
    assert_eq!(req.path, "/api/delete");
    assert_eq!(req.body["name"], "llama3.2");
}

#[tokio::test]
async fn delete_missing_model_is_http_error() {
    let (url, _req) = respond(404, r#"{"error":"model not found"}"#).await;

    let err = OllamaClient::new()
        .delete_model(&url, "ghost")
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), Some(404));
}

#[tokio::test]
async fn list_models_404_keeps_status_wording() {
    let (url, _req) = respond(404, "").await;

    let err = OllamaClient::new().list_models(&url).await.unwrap_err();
    assert_eq!(err.to_string(), "HTTP Error: 404 - Not Found");
    assert_eq!(err.user_message(), "HTTP Error: 404 - Not Found");
}

#[tokio::test]
async fn availability_check() {
    let (url, _req) = respond(200, r#"{"models":[]}"#).await;
    assert!(OllamaClient::new().is_available(&url).await);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    assert!(!OllamaClient::new().is_available(&format!("http://127.0.0.1:{port}")).await);
}

#[tokio::test]
async fn list_models_parses_tags() {
    let (url, req_rx) = respond(
        200,
        r#"{"models":[{"name":"llama3.2:3b","size":2019393189},{"name":"qwen2.5:7b","size":4683087332}]}"#,
    )
    .await;

    let list = OllamaClient::new().list_models(&url).await.unwrap();
    let names: Vec<&str> = list.models.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["llama3.2:3b", "qwen2.5:7b"]);

    let req = req_rx.await.unwrap();
    assert_eq!(req.method, "GET");
    assert_eq!(req.path, "/api/tags");
}
