//! Sequence-numbered command transmission and reply correlation.
//!
//! Every outbound command gets a fresh sequence number. Commands sent with
//! [`SequencedRequestTracker::send_with_reply`] also park a continuation that
//! runs exactly once, on the task that delivers the matching reply.
//!
//! There is no reply timeout. A continuation whose reply never arrives stays
//! parked until [`SequencedRequestTracker::abandon_all`] runs on disconnect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use bytes::Bytes;
use flexmirror_core::{Error, Result};
use tokio::sync::mpsc;

use crate::codec;

/// Callback run with `(response_code, payload)` when a reply arrives.
///
/// Runs synchronously on the reply path; it must not block.
pub type ReplyContinuation = Box<dyn FnOnce(u32, &str) + Send + 'static>;

/// Assigns sequence numbers and matches replies to parked continuations.
pub struct SequencedRequestTracker {
    /// Next sequence number (starts at 1).
    next_seq: AtomicU32,
    /// Parked continuations keyed by sequence number.
    pending: Mutex<HashMap<u32, ReplyContinuation>>,
    /// Encoded command lines, drained by the TCP writer task.
    sink: mpsc::UnboundedSender<Bytes>,
}

impl SequencedRequestTracker {
    pub fn new(sink: mpsc::UnboundedSender<Bytes>) -> Self {
        Self {
            next_seq: AtomicU32::new(1),
            pending: Mutex::new(HashMap::new()),
            sink,
        }
    }

    /// Transmit `command` without waiting for its reply.
    pub fn send(&self, command: &str) -> Result<u32> {
        let seq = self.allocate();
        self.transmit(seq, command)?;
        Ok(seq)
    }

    /// Transmit `command` and run `continuation` when its reply arrives.
    ///
    /// The continuation is parked before the line is handed to the writer,
    /// so even an instant reply finds it.
    pub fn send_with_reply(&self, command: &str, continuation: ReplyContinuation) -> Result<u32> {
        let seq = self.allocate();
        self.lock_pending().insert(seq, continuation);

        if let Err(e) = self.transmit(seq, command) {
            self.lock_pending().remove(&seq);
            return Err(e);
        }
        Ok(seq)
    }

    /// Deliver a reply. Returns `true` if a continuation ran.
    pub fn on_reply_arrived(&self, seq: u32, code: u32, payload: &str) -> bool {
        // Take the continuation out before running it so it may send
        // further commands without deadlocking on the pending map.
        let continuation = self.lock_pending().remove(&seq);

        match continuation {
            Some(continuation) => {
                tracing::trace!(seq, code = format!("0x{:08X}", code), payload = %payload, "Reply received");
                continuation(code, payload);
                true
            }
            None => {
                tracing::trace!(seq, code = format!("0x{:08X}", code), "Reply for unknown sequence discarded");
                false
            }
        }
    }

    /// Number of continuations still waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    /// Drop every parked continuation without running it.
    pub fn abandon_all(&self) -> usize {
        let mut pending = self.lock_pending();
        let count = pending.len();
        pending.clear();
        if count > 0 {
            tracing::debug!(count, "Abandoned pending replies");
        }
        count
    }

    fn allocate(&self) -> u32 {
        // Wraps after 2^32 commands, far beyond any session's lifetime.
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    fn transmit(&self, seq: u32, command: &str) -> Result<()> {
        tracing::trace!(seq, command = %command, "Sending command");
        self.sink
            .send(codec::encode_command(seq, command))
            .map_err(|_| Error::NotConnected)
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<u32, ReplyContinuation>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SequencedRequestTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequencedRequestTracker")
            .field("next_seq", &self.next_seq.load(Ordering::Relaxed))
            .field("pending", &self.pending_count())
            .finish()
    }
}
