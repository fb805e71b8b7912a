//! EventBus trait definition

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::MuxEvent;
use crate::session::SessionKey;

/// Sequence number for events (monotonically increasing)
pub type EventSeq = u64;

/// Event bus for publishing and subscribing to MuxEvents
///
/// Implementations must support:
/// - Publishing events with sequence numbers
/// - Live subscriptions via broadcast channel
/// - Replay of retained history for late subscribers
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an event, returns its sequence number
    async fn publish(&self, event: MuxEvent) -> EventSeq;

    /// Subscribe to all events from now (live stream)
    fn subscribe(&self) -> broadcast::Receiver<(EventSeq, MuxEvent)>;

    /// Retained events starting from a sequence number
    async fn events_from(&self, seq: EventSeq) -> Vec<(EventSeq, MuxEvent)>;

    /// Retained events for one session
    async fn session_events(&self, session_key: &SessionKey) -> Vec<(EventSeq, MuxEvent)>;

    /// Next sequence number to be assigned (high water mark)
    fn current_seq(&self) -> EventSeq;
}
