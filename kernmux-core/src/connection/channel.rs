//! In-process connection backed by an mpsc channel
//!
//! A transport writer task drains the receiver half and frames messages onto
//! the wire. Tests read the receiver directly.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::traits::{Connection, ConnectionId};
use crate::document::DocumentSource;
use crate::error::ConnectionError;
use crate::message::Message;
use crate::session::SessionKey;

pub struct ChannelConnection {
    id: ConnectionId,
    session_key: SessionKey,
    document_source: Option<DocumentSource>,
    tx: mpsc::UnboundedSender<Message>,
    closed: AtomicBool,
}

impl ChannelConnection {
    /// Create a connection and the receiver its outbound messages land in
    pub fn open(
        session_key: impl Into<SessionKey>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Message>) {
        Self::open_with_source(session_key, None)
    }

    /// Like [`open`](Self::open), requesting a specific document for a new session
    pub fn open_with_source(
        session_key: impl Into<SessionKey>,
        document_source: Option<DocumentSource>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Arc::new(Self {
            id: Uuid::new_v4(),
            session_key: session_key.into(),
            document_source,
            tx,
            closed: AtomicBool::new(false),
        });
        (conn, rx)
    }

    /// Mark the connection closed; later sends fail
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connection for ChannelConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn session_key(&self) -> &SessionKey {
        &self.session_key
    }

    fn document_source(&self) -> Option<DocumentSource> {
        self.document_source.clone()
    }

    async fn send(&self, message: Message) -> Result<(), ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }
        self.tx.send(message).map_err(|_| ConnectionError::Closed)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.tx.is_closed()
    }
}
