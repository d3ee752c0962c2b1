//! Bounded per-task event buffer.
//!
//! A drop-oldest queue sitting between the capture scheduler and consumers
//! that poll rather than register handlers. It is a diagnostic/forwarding
//! aid, not the durability mechanism: once full, the oldest event is
//! discarded to admit a new one, so a consumer that only reads the buffer
//! and falls behind can miss events.

use std::collections::VecDeque;

use rowstream_core::CapturedEvent;

/// Default buffer capacity per task.
pub const DEFAULT_BUFFER_CAPACITY: usize = 10_000;

/// Bounded FIFO of captured events with drop-oldest eviction.
#[derive(Debug)]
pub struct EventBuffer {
    events: VecDeque<CapturedEvent>,
    capacity: usize,
    dropped: u64,
}

impl EventBuffer {
    /// Create a buffer with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }

    /// Create a buffer holding at most `capacity` events (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            dropped: 0,
        }
    }

    /// Append an event, evicting the oldest entry if the buffer is full.
    pub fn append(&mut self, event: CapturedEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
            self.dropped += 1;
        }
        self.events.push_back(event);
    }

    /// Return up to `limit` events from the front of the buffer, oldest
    /// first. With `clear` set the returned events are removed; otherwise
    /// the call is read-only and repeatable.
    pub fn drain(&mut self, limit: usize, clear: bool) -> Vec<CapturedEvent> {
        let count = limit.min(self.events.len());
        if clear {
            self.events.drain(..count).collect()
        } else {
            self.events.iter().take(count).cloned().collect()
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total events evicted since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::new()
    }
}
