//! Event type definitions

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionId;
use crate::document::DocumentId;
use crate::message::Origin;
use crate::session::SessionKey;

/// Why a session was torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Explicit teardown request
    Requested,
    /// Grace period elapsed while detached
    Expired,
    /// Registry shutdown
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MuxEvent {
    /// A new session was registered
    SessionCreated {
        session_key: SessionKey,
        kernel_id: String,
        document_id: DocumentId,
    },

    /// A connection became the session's current connection
    SessionAttached {
        session_key: SessionKey,
        connection_id: ConnectionId,
        replayed: usize,
    },

    /// The current connection went away; kernel and document are kept
    SessionDetached {
        session_key: SessionKey,
        connection_id: ConnectionId,
    },

    /// The session was removed and its kernel released
    SessionClosed {
        session_key: SessionKey,
        reason: CloseReason,
    },

    /// Kernel or document construction failed; nothing was registered
    BindingFailed {
        session_key: SessionKey,
        message: String,
    },

    /// A processor vetoed a message
    MessageFiltered {
        session_key: SessionKey,
        origin: Origin,
    },

    /// A processor or delivery failed; the message was dropped
    ProcessingFailed {
        session_key: SessionKey,
        origin: Origin,
        message: String,
    },
}

impl MuxEvent {
    pub fn session_key(&self) -> &SessionKey {
        match self {
            Self::SessionCreated { session_key, .. }
            | Self::SessionAttached { session_key, .. }
            | Self::SessionDetached { session_key, .. }
            | Self::SessionClosed { session_key, .. }
            | Self::BindingFailed { session_key, .. }
            | Self::MessageFiltered { session_key, .. }
            | Self::ProcessingFailed { session_key, .. } => session_key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_snake_case_tag() {
        let event = MuxEvent::SessionClosed {
            session_key: SessionKey::from("abc"),
            reason: CloseReason::Expired,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "session_closed");
        assert_eq!(json["session_key"], "abc");
        assert_eq!(json["reason"], "expired");
    }

    #[test]
    fn session_key_is_available_for_every_variant() {
        let event = MuxEvent::MessageFiltered {
            session_key: SessionKey::from("k"),
            origin: Origin::Kernel,
        };
        assert_eq!(event.session_key().as_str(), "k");
    }
}
