//! Lifecycle events emitted by the request queue.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::request::ContentType;

/// Queue entry status updates, one stream per queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueEvent {
    /// Entry appended to the tail
    Enqueued {
        request_id: Uuid,
        content_type: ContentType,
        /// Entries waiting ahead of this one (the active one included)
        position: usize,
    },
    /// Entry became the active one
    Started { request_id: Uuid },
    /// Entry finished successfully
    Completed { request_id: Uuid, duration_ms: u64 },
    /// Entry failed; the queue moves on
    Failed {
        request_id: Uuid,
        error: String,
        duration_ms: u64,
    },
}

impl QueueEvent {
    pub fn request_id(&self) -> Uuid {
        match self {
            QueueEvent::Enqueued { request_id, .. } => *request_id,
            QueueEvent::Started { request_id } => *request_id,
            QueueEvent::Completed { request_id, .. } => *request_id,
            QueueEvent::Failed { request_id, .. } => *request_id,
        }
    }
}
