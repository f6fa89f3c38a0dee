//! Per-connection session handles.
//!
//! A [`ConnectionSession`] is the server's live link to one authenticated
//! client: its identity, display name, and a bounded outbound queue drained by
//! the connection's writer task. Sends never block; a full or closed queue
//! drops the message with a warning so one stalled peer cannot stall a room.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::messages::{PlayerId, ServerMessage};

/// Unique identifier for a TCP connection within a server run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

/// Atomic generator for monotonically increasing [`ConnectionId`]s.
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    /// Create a new generator starting at 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a non-blocking send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Queued,
    /// The outbound queue was full; the message was dropped.
    Full,
    /// The connection's writer has gone away.
    Closed,
}

/// Cloneable handle to one authenticated connection.
#[derive(Clone)]
pub struct ConnectionSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: ConnectionId,
    identity: PlayerId,
    display_name: String,
    outbound: mpsc::Sender<ServerMessage>,
}

impl ConnectionSession {
    /// Create a session and the receiving end of its outbound queue.
    pub fn new(
        id: ConnectionId,
        identity: PlayerId,
        display_name: String,
        queue_len: usize,
    ) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (outbound, rx) = mpsc::channel(queue_len.max(1));
        let session = Self {
            inner: Arc::new(SessionInner {
                id,
                identity,
                display_name,
                outbound,
            }),
        };
        (session, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    pub fn identity(&self) -> &PlayerId {
        &self.inner.identity
    }

    pub fn display_name(&self) -> &str {
        &self.inner.display_name
    }

    /// Whether the writer side is still draining the queue.
    pub fn is_open(&self) -> bool {
        !self.inner.outbound.is_closed()
    }

    /// Queue `msg` without waiting.
    pub fn send(&self, msg: ServerMessage) -> SendOutcome {
        match self.inner.outbound.try_send(msg) {
            Ok(()) => SendOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                tracing::warn!(
                    "Outbound queue full for {} ({:?}), dropping {}",
                    self.inner.identity,
                    self.inner.id,
                    msg.kind()
                );
                SendOutcome::Full
            }
            Err(mpsc::error::TrySendError::Closed(msg)) => {
                tracing::debug!(
                    "Connection {:?} closed, dropping {}",
                    self.inner.id,
                    msg.kind()
                );
                SendOutcome::Closed
            }
        }
    }
}

impl std::fmt::Debug for ConnectionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("id", &self.inner.id)
            .field("identity", &self.inner.identity)
            .field("open", &self.is_open())
            .finish()
    }
}
