//! Agent Host - serialized execution of generation requests
//!
//! This crate provides:
//! - A FIFO request queue that runs at most one request at a time
//! - The execution routine that turns a captured selection into a model reply

pub mod executor;
pub mod queue;

pub use executor::{OllamaExecutor, RequestExecutor};
pub use queue::{QueueTicket, RequestQueue};
