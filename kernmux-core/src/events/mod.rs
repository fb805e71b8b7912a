//! Lifecycle and relay events
//!
//! The registry and sessions publish [`MuxEvent`]s so embedding services can
//! observe attachments, teardowns and relay failures without polling.

pub mod bus;
pub mod memory;
pub mod types;

pub use bus::{EventBus, EventSeq};
pub use memory::MemoryEventBus;
pub use types::{CloseReason, MuxEvent};
