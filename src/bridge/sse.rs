//! SSE framing and client bookkeeping for the Protocol Bridge (§3, §4.4).

use std::time::SystemTime;

use tokio::sync::mpsc;
use uuid::Uuid;

/// One SSE-framed event, either `endpoint` (session setup) or `message`
/// (a forwarded JSON-RPC payload).
#[derive(Debug, Clone)]
pub struct SseMessage {
    pub event_type: String,
    pub data: String,
}

impl SseMessage {
    pub fn new(event_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self { event_type: event_type.into(), data: data.into() }
    }

    pub fn endpoint(url: impl Into<String>) -> Self {
        Self::new("endpoint", url)
    }

    pub fn message(json: impl Into<String>) -> Self {
        Self::new("message", json)
    }

    /// Exact wire format per §6: `event: {type}\ndata: {data}\n\n`.
    pub fn to_sse_string(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.event_type, self.data)
    }
}

/// A connected SSE client: an opaque id and a bounded outbound queue.
/// Created on `GET /sse`, torn down on disconnect or queue overflow.
pub struct SseClient {
    pub id: Uuid,
    pub tx: mpsc::Sender<SseMessage>,
    pub created_at: SystemTime,
}

impl SseClient {
    pub fn new(tx: mpsc::Sender<SseMessage>) -> Self {
        Self { id: Uuid::new_v4(), tx, created_at: SystemTime::now() }
    }

    /// Non-blocking send; full queue means the caller should evict this
    /// client rather than block or retry (§4.4 slow-client policy).
    pub fn try_send(&self, message: SseMessage) -> Result<(), ()> {
        self.tx.try_send(message).map_err(|_| ())
    }
}

/// A message that arrived from the container while no SSE client was
/// connected, buffered until the next connection drains it.
#[derive(Debug, Clone)]
pub struct PendingMessage {
    pub sequence: u64,
    pub message: SseMessage,
}

/// Bounded, FIFO, drop-oldest buffer (§4.4's resolved open question: cap
/// 100, drop-oldest, warn-logged).
pub struct PendingBuffer {
    capacity: usize,
    next_sequence: u64,
    items: std::collections::VecDeque<PendingMessage>,
}

impl PendingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, next_sequence: 0, items: std::collections::VecDeque::new() }
    }

    pub fn push(&mut self, message: SseMessage) {
        if self.items.len() >= self.capacity {
            if let Some(dropped) = self.items.pop_front() {
                tracing::warn!(sequence = dropped.sequence, "dropping oldest pending SSE message, buffer full");
            }
        }
        self.items.push_back(PendingMessage { sequence: self.next_sequence, message });
        self.next_sequence += 1;
    }

    /// Drain everything in FIFO order; the buffer is empty afterwards.
    pub fn drain(&mut self) -> Vec<PendingMessage> {
        self.items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
