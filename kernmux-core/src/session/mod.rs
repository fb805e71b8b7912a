//! Session management
//!
//! A session binds a user's connection to one kernel and one document. The
//! [`SessionRegistry`] keeps at most one session per [`SessionKey`] and
//! reuses it across reconnects.

mod backlog;
mod key;
mod lifecycle;
mod registry;
mod state;

pub use backlog::Backlog;
pub use key::SessionKey;
pub use lifecycle::{DisconnectOutcome, RetentionPolicy};
pub use registry::{Attachment, SessionRegistry};
pub use state::{AttachState, Delivery, Session, SessionContext, SessionParts, SessionSummary};

#[cfg(test)]
pub(crate) mod testing {
    use super::{AttachState, SessionContext, SessionKey};
    use crate::kernel::KernelPorts;

    /// Context for an attached session without a live kernel behind it
    pub fn context(key: &str) -> SessionContext {
        SessionContext {
            session_key: SessionKey::from(key),
            kernel_id: "test-kernel".to_string(),
            kernel_ports: KernelPorts {
                control: 50000,
                broadcast: 50001,
            },
            document_id: uuid::Uuid::new_v4(),
            state: AttachState::Attached,
            connection_id: None,
        }
    }
}
