//! Bounded outbound message queue.

use heapless::{Deque, Vec};
use log::warn;

/// Maximum payload bytes in one queued message.
pub const MAX_TX_PAYLOAD: usize = 64;

/// Maximum queued messages before new ones are dropped.
pub const QUEUE_CAPACITY: usize = 20;

/// An unframed outbound payload.
pub type TxPayload = Vec<u8, MAX_TX_PAYLOAD>;

/// FIFO of payloads awaiting a transmit window.
///
/// Overflow drops the newest entry with a warning. Producers are not
/// told; a periodic producer simply tries again next interval.
#[derive(Debug)]
pub struct SendQueue {
    entries: Deque<TxPayload, QUEUE_CAPACITY>,
}

impl Default for SendQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SendQueue {
    pub const fn new() -> Self {
        Self {
            entries: Deque::new(),
        }
    }

    /// Append a payload, dropping it if the queue is full.
    pub fn enqueue(&mut self, payload: TxPayload) {
        if self.entries.is_full() {
            warn!(
                "dropping queued message, queue is full (tried to queue type {:02X})",
                payload.first().copied().unwrap_or(0)
            );
            return;
        }
        // Cannot fail after the is_full check
        let _ = self.entries.push_back(payload);
    }

    /// Pop the oldest payload.
    pub fn pop(&mut self) -> Option<TxPayload> {
        self.entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
