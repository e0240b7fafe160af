//! Ollama API access: HTTP client, NDJSON stream reading, and the two
//! stream consumers (pull progress and chat aggregation).

pub mod chat;
pub mod error;
pub mod ndjson;
pub mod ollama;
pub mod pull;

pub use chat::{stream_chat, ChatAccumulator, ChatAggregator};
pub use error::OllamaError;
pub use ndjson::{read_ndjson, NdjsonDecoder};
pub use ollama::{ByteStream, GenerateResponse, ModelInfo, ModelList, OllamaClient};
pub use pull::{format_bytes, pull_model, PullOutcome, PullTracker};
