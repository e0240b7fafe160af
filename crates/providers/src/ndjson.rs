//! Newline-delimited JSON reader for Ollama's streaming endpoints.
//!
//! Each complete `\n`-terminated line is one JSON value. Bytes may arrive split
//! anywhere, including in the middle of a multi-byte UTF-8 character, so the
//! decoder keeps both undecoded bytes and an incomplete trailing line across
//! chunks. A line that fails to parse is logged and skipped.

use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use tracing::warn;

use crate::error::OllamaError;

/// Incremental decoder that buffers partial lines across chunk boundaries.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    /// Trailing bytes of a character split across chunks.
    pending_bytes: Vec<u8>,
    /// Decoded text not yet terminated by `\n`.
    buffer: String,
    lines_seen: usize,
    skipped: usize,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes from the HTTP response. Returns any complete values found.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Value> {
        self.decode(chunk);

        let mut values = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            if let Some(value) = self.parse_line(&line) {
                values.push(value);
            }
        }
        values
    }

    /// Flush at end of stream: an unterminated last line is parsed as well.
    pub fn finish(&mut self) -> Option<Value> {
        if !self.pending_bytes.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending_bytes).into_owned();
            self.buffer.push_str(&tail);
            self.pending_bytes.clear();
        }
        let rest = std::mem::take(&mut self.buffer);
        self.parse_line(&rest)
    }

    /// Number of non-blank lines that failed to parse so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn decode(&mut self, chunk: &[u8]) {
        self.pending_bytes.extend_from_slice(chunk);

        loop {
            match std::str::from_utf8(&self.pending_bytes) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    self.pending_bytes.clear();
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    self.buffer
                        .push_str(&String::from_utf8_lossy(&self.pending_bytes[..valid]));
                    match e.error_len() {
                        // Incomplete sequence at the end: wait for the next chunk.
                        None => {
                            self.pending_bytes.drain(..valid);
                            return;
                        }
                        Some(bad) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            self.pending_bytes.drain(..valid + bad);
                        }
                    }
                }
            }
        }
    }

    fn parse_line(&mut self, line: &str) -> Option<Value> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        self.lines_seen += 1;

        match serde_json::from_str::<Value>(line) {
            Ok(value) => Some(value),
            Err(e) => {
                self.skipped += 1;
                warn!(line_no = self.lines_seen, error = %e, "skipping malformed NDJSON line");
                None
            }
        }
    }
}

struct ReadState<S> {
    /// Dropped as soon as the body is exhausted or fails.
    bytes: Option<S>,
    decoder: NdjsonDecoder,
    ready: VecDeque<Value>,
}

/// Lazily turn a byte stream into parsed JSON values, one per line.
///
/// Single pass: once the underlying stream ends or errors it is released, and
/// the returned stream yields the remaining buffered values and then ends.
pub fn read_ndjson<S>(bytes: S) -> BoxStream<'static, Result<Value, OllamaError>>
where
    S: Stream<Item = Result<Bytes, OllamaError>> + Send + Unpin + 'static,
{
    let state = ReadState {
        bytes: Some(bytes),
        decoder: NdjsonDecoder::new(),
        ready: VecDeque::new(),
    };

    futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(value) = st.ready.pop_front() {
                return Some((Ok(value), st));
            }
            let source = st.bytes.as_mut()?;
            match source.next().await {
                Some(Ok(chunk)) => {
                    let values = st.decoder.feed(&chunk);
                    st.ready.extend(values);
                }
                Some(Err(e)) => {
                    st.bytes = None;
                    return Some((Err(e), st));
                }
                None => {
                    st.bytes = None;
                    if let Some(last) = st.decoder.finish() {
                        st.ready.push_back(last);
                    }
                }
            }
        }
    })
    .boxed()
}
