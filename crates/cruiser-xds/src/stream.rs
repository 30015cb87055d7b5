//! Stream identification and per-stream accounting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Unique identifier for a discovery stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(u64);

impl StreamId {
    /// Generate a new unique stream ID.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

/// Context for one active discovery stream.
#[derive(Debug)]
pub struct StreamContext {
    id: StreamId,
    node_id: Option<String>,
    created_at: Instant,
    requests: u64,
    responses: u64,
}

impl StreamContext {
    /// Create a context with a fresh stream ID.
    pub fn new() -> Self {
        Self {
            id: StreamId::next(),
            node_id: None,
            created_at: Instant::now(),
            requests: 0,
            responses: 0,
        }
    }

    /// The stream ID.
    #[inline]
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Node ID, once the client has identified itself.
    #[inline]
    pub fn node_id(&self) -> Option<&str> {
        self.node_id.as_deref()
    }

    /// Record the node identity from the first request.
    pub fn set_node(&mut self, node_id: impl Into<String>) {
        self.node_id = Some(node_id.into());
    }

    /// Record a received request.
    pub fn record_request(&mut self) {
        self.requests += 1;
    }

    /// Record a sent response.
    pub fn record_response(&mut self) {
        self.responses += 1;
    }

    /// Total requests received.
    #[inline]
    pub fn request_count(&self) -> u64 {
        self.requests
    }

    /// Total responses sent.
    #[inline]
    pub fn response_count(&self) -> u64 {
        self.responses
    }

    /// How long the stream has been alive.
    pub fn duration(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }
}

impl Default for StreamContext {
    fn default() -> Self {
        Self::new()
    }
}
