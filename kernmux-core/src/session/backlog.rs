//! Kernel output held for a detached session

use std::collections::VecDeque;

use crate::config::DEFAULT_BACKLOG_CAPACITY;
use crate::message::Message;

/// Ring buffer of kernel messages with a fixed message capacity.
///
/// Filled while no live connection is attached and replayed, oldest first,
/// to the next connection.
#[derive(Debug)]
pub struct Backlog {
    buffer: VecDeque<Message>,
    capacity: usize,
    dropped: u64,
}

impl Backlog {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::new(),
            capacity,
            dropped: 0,
        }
    }

    /// Append a message, dropping the oldest if over capacity
    pub fn push(&mut self, message: Message) {
        if self.capacity == 0 {
            self.dropped += 1;
            return;
        }
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
            self.dropped += 1;
        }
        self.buffer.push_back(message);
    }

    /// Remove and return all buffered messages in arrival order
    pub fn drain(&mut self) -> Vec<Message> {
        self.buffer.drain(..).collect()
    }

    /// Put messages back at the front, e.g. after a failed replay
    pub fn restore(&mut self, messages: impl IntoIterator<Item = Message>) {
        let mut restored: VecDeque<Message> = messages.into_iter().collect();
        restored.append(&mut self.buffer);
        while restored.len() > self.capacity {
            restored.pop_front();
            self.dropped += 1;
        }
        self.buffer = restored;
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Messages discarded because the backlog was full
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for Backlog {
    fn default() -> Self {
        Self::new(DEFAULT_BACKLOG_CAPACITY)
    }
}
