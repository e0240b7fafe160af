//! FIFO request queue with at most one execution in flight.
//!
//! The local model server serializes heavy work anyway, so requests are run
//! strictly one after another in submission order. A failing (or panicking)
//! request is reported to its own caller and the queue moves on.

use parking_lot::Mutex;
use providers::OllamaError;
use shared::events::QueueEvent;
use shared::request::{GenerationRequest, GenerationResponse};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::executor::RequestExecutor;

type Outcome = Result<GenerationResponse, OllamaError>;

struct QueueEntry {
    request: GenerationRequest,
    reply: oneshot::Sender<Outcome>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<QueueEntry>,
    /// An entry has been popped and its execution has not finished yet.
    processing: bool,
}

struct QueueInner {
    executor: Arc<dyn RequestExecutor>,
    state: Mutex<QueueState>,
    events: Option<mpsc::UnboundedSender<QueueEvent>>,
}

/// Handle to a request queue. Clones share the same queue.
#[derive(Clone)]
pub struct RequestQueue {
    inner: Arc<QueueInner>,
}

/// Returned by [`RequestQueue::enqueue`]; resolves to that entry's outcome.
#[derive(Debug)]
pub struct QueueTicket {
    id: Uuid,
    reply: oneshot::Receiver<Outcome>,
}

impl QueueTicket {
    /// Correlation id of the queued request.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn outcome(self) -> Outcome {
        self.reply.await.unwrap_or(Err(OllamaError::QueueClosed))
    }
}

impl RequestQueue {
    pub fn new(executor: Arc<dyn RequestExecutor>) -> Self {
        Self::build(executor, None)
    }

    /// Create a queue that reports entry lifecycle events on `events`.
    pub fn with_events(
        executor: Arc<dyn RequestExecutor>,
        events: mpsc::UnboundedSender<QueueEvent>,
    ) -> Self {
        Self::build(executor, Some(events))
    }

    fn build(
        executor: Arc<dyn RequestExecutor>,
        events: Option<mpsc::UnboundedSender<QueueEvent>>,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                executor,
                state: Mutex::new(QueueState::default()),
                events,
            }),
        }
    }

    /// Append a request to the tail and start processing if the queue is idle.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn enqueue(&self, request: GenerationRequest) -> QueueTicket {
        let (reply, rx) = oneshot::channel();
        let id = request.id;
        let content_type = request.content_type;

        {
            let mut state = self.inner.state.lock();
            let position = state.pending.len() + usize::from(state.processing);
            state.pending.push_back(QueueEntry { request, reply });
            // Emitted under the lock so it always precedes this entry's Started.
            self.inner.emit(QueueEvent::Enqueued {
                request_id: id,
                content_type,
                position,
            });
            debug!(request_id = %id, position, "request enqueued");
        }

        self.process_next();
        QueueTicket { id, reply: rx }
    }

    /// Start on the head entry unless something is already running or there
    /// is nothing to run. Calling it again while busy is a no-op.
    pub fn process_next(&self) {
        let first = {
            let mut state = self.inner.state.lock();
            if state.processing {
                return;
            }
            let Some(entry) = state.pending.pop_front() else {
                return;
            };
            state.processing = true;
            entry
        };

        let inner = Arc::clone(&self.inner);
        tokio::spawn(inner.drain(first));
    }

    /// Entries waiting to start, excluding the active one.
    pub fn len(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_processing(&self) -> bool {
        self.inner.state.lock().processing
    }
}

impl QueueInner {
    fn emit(&self, event: QueueEvent) {
        if let Some(sender) = &self.events {
            let _ = sender.send(event);
        }
    }

    /// Run `first`, then keep popping until the queue is empty.
    async fn drain(self: Arc<Self>, first: QueueEntry) {
        let mut next = Some(first);
        while let Some(entry) = next {
            self.run(entry).await;
            next = {
                let mut state = self.state.lock();
                let entry = state.pending.pop_front();
                if entry.is_none() {
                    state.processing = false;
                }
                entry
            };
        }
    }

    async fn run(&self, entry: QueueEntry) {
        let QueueEntry { request, reply } = entry;
        let id = request.id;
        info!(request_id = %id, content_type = request.content_type.as_str(), "request started");
        self.emit(QueueEvent::Started { request_id: id });

        let started = Instant::now();
        // Own task so a panicking executor fails only this entry.
        let executor = Arc::clone(&self.executor);
        let outcome = match tokio::spawn(async move { executor.execute(&request).await }).await {
            Ok(outcome) => outcome,
            Err(e) => Err(OllamaError::Aborted(e.to_string())),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match &outcome {
            Ok(_) => {
                info!(request_id = %id, duration_ms, "request completed");
                self.emit(QueueEvent::Completed {
                    request_id: id,
                    duration_ms,
                });
            }
            Err(e) => {
                warn!(request_id = %id, duration_ms, error = %e, "request failed");
                self.emit(QueueEvent::Failed {
                    request_id: id,
                    error: e.user_message(),
                    duration_ms,
                });
            }
        }

        if reply.send(outcome).is_err() {
            debug!(request_id = %id, "ticket dropped before the outcome arrived");
        }
    }
}
