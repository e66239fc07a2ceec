//! Per-call counters.
//!
//! The call task is the only writer; handles read snapshots.

use std::sync::Arc;

use parking_lot::Mutex;

/// Byte and event counts collected over one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallStats {
    /// Request body bytes handed to the transport.
    pub bytes_sent: u64,
    /// Number of `write` calls made on the connection.
    pub writes: u64,
    /// Response body bytes received.
    pub bytes_received: u64,
    /// Response body chunks received.
    pub chunks_received: u64,
    /// Tokenizer events applied by the response parser.
    pub parse_events: u64,
}

impl CallStats {
    /// Record one request write.
    pub fn add_write(&mut self, len: usize) {
        self.writes += 1;
        self.bytes_sent += len as u64;
    }

    /// Record one response chunk.
    pub fn add_chunk(&mut self, len: usize) {
        self.chunks_received += 1;
        self.bytes_received += len as u64;
    }
}

/// Shared view of a call's counters.
#[derive(Debug, Clone, Default)]
pub struct StatsHandle(Arc<Mutex<CallStats>>);

impl StatsHandle {
    pub fn snapshot(&self) -> CallStats {
        self.0.lock().clone()
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut CallStats)) {
        f(&mut self.0.lock());
    }
}
