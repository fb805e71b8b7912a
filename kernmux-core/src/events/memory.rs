//! In-memory EventBus implementation
//!
//! MemoryEventBus keeps a bounded history for replay and uses a broadcast
//! channel for live subscribers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};

use super::MuxEvent;
use super::bus::{EventBus, EventSeq};
use crate::session::SessionKey;

/// Default number of events retained for replay
pub const DEFAULT_HISTORY: usize = 10_000;

pub struct MemoryEventBus {
    /// Retained events for replay
    events: RwLock<VecDeque<(EventSeq, MuxEvent)>>,
    history_limit: usize,
    /// Next sequence number to assign
    next_seq: AtomicU64,
    tx: broadcast::Sender<(EventSeq, MuxEvent)>,
}

impl MemoryEventBus {
    /// Create a bus with the given broadcast capacity and default history
    pub fn new(capacity: usize) -> Self {
        Self::with_history(capacity, DEFAULT_HISTORY)
    }

    /// Create a bus retaining at most `history_limit` events for replay
    pub fn with_history(capacity: usize, history_limit: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            events: RwLock::new(VecDeque::new()),
            history_limit,
            next_seq: AtomicU64::new(0),
            tx,
        }
    }
}

impl Default for MemoryEventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn publish(&self, event: MuxEvent) -> EventSeq {
        // Sequence assignment and broadcast happen under the same lock so
        // live subscribers observe events in sequence order.
        let mut events = self.events.write().await;
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);

        if self.history_limit > 0 {
            if events.len() >= self.history_limit {
                events.pop_front();
            }
            events.push_back((seq, event.clone()));
        }

        // Ignore if no receivers
        let _ = self.tx.send((seq, event));
        seq
    }

    fn subscribe(&self) -> broadcast::Receiver<(EventSeq, MuxEvent)> {
        self.tx.subscribe()
    }

    async fn events_from(&self, seq: EventSeq) -> Vec<(EventSeq, MuxEvent)> {
        self.events
            .read()
            .await
            .iter()
            .filter(|(s, _)| *s >= seq)
            .cloned()
            .collect()
    }

    async fn session_events(&self, session_key: &SessionKey) -> Vec<(EventSeq, MuxEvent)> {
        self.events
            .read()
            .await
            .iter()
            .filter(|(_, event)| event.session_key() == session_key)
            .cloned()
            .collect()
    }

    fn current_seq(&self) -> EventSeq {
        self.next_seq.load(Ordering::SeqCst)
    }
}
