//! Connection trait and connect/disconnect events

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::document::DocumentSource;
use crate::error::ConnectionError;
use crate::message::Message;
use crate::session::SessionKey;

/// Identity of one physical connection (changes on every reconnect)
pub type ConnectionId = Uuid;

/// One end-user connection as exposed by the transport layer
#[async_trait]
pub trait Connection: Send + Sync {
    /// Unique per physical connection
    fn id(&self) -> ConnectionId;

    /// The logical session this connection belongs to
    fn session_key(&self) -> &SessionKey;

    /// Document the client asked for when the session is first created.
    ///
    /// `None` defers to the registry's configured default.
    fn document_source(&self) -> Option<DocumentSource> {
        None
    }

    /// Deliver a message to the client
    async fn send(&self, message: Message) -> Result<(), ConnectionError>;

    /// Whether the transport has closed this connection
    fn is_closed(&self) -> bool;
}

pub type ConnectionRef = Arc<dyn Connection>;

/// Events emitted by the connection manager
#[derive(Clone)]
pub enum ConnectionEvent {
    Connected(ConnectionRef),
    Disconnected(ConnectionRef),
}

impl ConnectionEvent {
    pub fn connection(&self) -> &ConnectionRef {
        match self {
            Self::Connected(conn) | Self::Disconnected(conn) => conn,
        }
    }

    pub fn session_key(&self) -> &SessionKey {
        self.connection().session_key()
    }
}

impl fmt::Debug for ConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Connected(_) => "Connected",
            Self::Disconnected(_) => "Disconnected",
        };
        f.debug_struct(kind)
            .field("connection_id", &self.connection().id())
            .field("session_key", self.session_key())
            .finish()
    }
}
