//! Session struct and message relay
//!
//! A Session joins one connection, one kernel and one document. Kernel and
//! document are fixed at creation; only the connection is swapped on
//! reconnect. Each session runs two relay tasks, one per message source, so
//! messages from a source are processed in arrival order and one session's
//! chain never blocks another's.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{RwLock, broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use super::backlog::Backlog;
use super::key::SessionKey;
use crate::config::RelayConfig;
use crate::connection::{ConnectionId, ConnectionRef};
use crate::document::{DocumentHandle, DocumentId};
use crate::error::{MuxError, SessionError};
use crate::events::{EventBus, MuxEvent};
use crate::kernel::{KernelHandle, KernelPorts};
use crate::message::{Message, Origin};
use crate::pipeline::{Outcome, Pipeline};

/// Whether a session currently has a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachState {
    Attached,
    Detached,
}

/// Read-only view of a session handed to processors
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionContext {
    pub session_key: SessionKey,
    pub kernel_id: String,
    pub kernel_ports: KernelPorts,
    pub document_id: DocumentId,
    pub state: AttachState,
    pub connection_id: Option<ConnectionId>,
}

/// What happened to a relayed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Sent to the kernel or the current connection
    Delivered,
    /// Kernel output kept for the next connection
    Buffered,
    /// Vetoed by a processor
    Filtered,
}

/// Listing entry for a registered session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_key: SessionKey,
    pub state: AttachState,
    pub kernel_id: String,
    pub document_id: DocumentId,
    pub connection_id: Option<ConnectionId>,
    pub created_at: DateTime<Utc>,
    pub detached_at: Option<DateTime<Utc>>,
    pub backlog: usize,
}

/// Everything a session is built from besides its first connection
pub struct SessionParts {
    pub key: SessionKey,
    pub kernel: KernelHandle,
    pub document: DocumentHandle,
    pub pipeline: Arc<Pipeline>,
    pub events: Arc<dyn EventBus>,
    pub relay: RelayConfig,
}

struct Link {
    connection: Option<ConnectionRef>,
    /// Bumped on every attach and detach
    generation: u64,
    detached_at: Option<DateTime<Utc>>,
}

pub struct Session {
    key: SessionKey,
    kernel: KernelHandle,
    document: DocumentHandle,
    pipeline: Arc<Pipeline>,
    events: Arc<dyn EventBus>,
    link: RwLock<Link>,
    backlog: Mutex<Backlog>,
    inbound: mpsc::Sender<Message>,
    cancel: CancellationToken,
    created_at: DateTime<Utc>,
}

impl Session {
    /// Create a session attached to `connection` and start its relay tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(parts: SessionParts, connection: ConnectionRef) -> Arc<Self> {
        let (inbound, inbound_rx) = mpsc::channel(parts.relay.inbound_capacity.max(1));
        // Subscribe before anything can be sent so no kernel output is missed
        let kernel_rx = parts.kernel.subscribe();

        let session = Arc::new(Self {
            key: parts.key,
            kernel: parts.kernel,
            document: parts.document,
            pipeline: parts.pipeline,
            events: parts.events,
            link: RwLock::new(Link {
                connection: Some(connection),
                generation: 1,
                detached_at: None,
            }),
            backlog: Mutex::new(Backlog::new(parts.relay.backlog_capacity)),
            inbound,
            cancel: CancellationToken::new(),
            created_at: Utc::now(),
        });

        tokio::spawn(run_client_relay(
            Arc::downgrade(&session),
            inbound_rx,
            session.cancel.clone(),
        ));
        tokio::spawn(run_kernel_relay(
            Arc::downgrade(&session),
            kernel_rx,
            session.cancel.clone(),
        ));

        session
    }

    /// The key this session is registered under
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Kernel bound at creation
    pub fn kernel(&self) -> &KernelHandle {
        &self.kernel
    }

    /// Document bound at creation
    pub fn document(&self) -> &DocumentHandle {
        &self.document
    }

    /// When the session was created
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether the session has been torn down
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Attached while there is a current connection
    pub async fn state(&self) -> AttachState {
        attach_state(&*self.link.read().await)
    }

    /// The current connection, if attached
    pub async fn connection(&self) -> Option<ConnectionRef> {
        self.link.read().await.connection.clone()
    }

    /// Attachment generation; changes on every attach and detach
    pub async fn generation(&self) -> u64 {
        self.link.read().await.generation
    }

    /// Snapshot handed to processors
    pub async fn context(&self) -> SessionContext {
        let link = self.link.read().await;
        SessionContext {
            session_key: self.key.clone(),
            kernel_id: self.kernel.id().to_string(),
            kernel_ports: self.kernel.ports(),
            document_id: self.document.id(),
            state: attach_state(&link),
            connection_id: link.connection.as_ref().map(|c| c.id()),
        }
    }

    /// Listing entry for this session
    pub async fn summary(&self) -> SessionSummary {
        let link = self.link.read().await;
        SessionSummary {
            session_key: self.key.clone(),
            state: attach_state(&link),
            kernel_id: self.kernel.id().to_string(),
            document_id: self.document.id(),
            connection_id: link.connection.as_ref().map(|c| c.id()),
            created_at: self.created_at,
            detached_at: link.detached_at,
            backlog: self.lock_backlog().len(),
        }
    }

    /// Make `connection` the session's current connection.
    ///
    /// Kernel output buffered while detached is replayed to it first, under
    /// the same write lock that kernel deliveries take for reading, so live
    /// output can't overtake the replay. Returns the number replayed.
    pub async fn update_connection(
        &self,
        connection: ConnectionRef,
    ) -> Result<usize, SessionError> {
        let mut link = self.link.write().await;
        if self.is_closed() {
            return Err(SessionError::Closed(self.key.clone()));
        }

        let pending = self.lock_backlog().drain();
        let mut pending = pending.into_iter();
        let mut replayed = 0;
        while let Some(message) = pending.next() {
            if let Err(e) = connection.send(message.clone()).await {
                tracing::warn!(
                    session_key = %self.key,
                    connection_id = %connection.id(),
                    error = %e,
                    "Backlog replay interrupted"
                );
                self.lock_backlog().restore(std::iter::once(message).chain(pending));
                break;
            }
            replayed += 1;
        }

        let connection_id = connection.id();
        link.connection = Some(connection);
        link.generation += 1;
        link.detached_at = None;
        drop(link);

        tracing::info!(
            session_key = %self.key,
            connection_id = %connection_id,
            replayed,
            "Connection attached"
        );
        self.events
            .publish(MuxEvent::SessionAttached {
                session_key: self.key.clone(),
                connection_id,
                replayed,
            })
            .await;
        Ok(replayed)
    }

    /// Clear the connection if `connection_id` is still the current one.
    ///
    /// Returns the new generation, or `None` for a stale disconnect.
    pub async fn detach(&self, connection_id: ConnectionId) -> Option<u64> {
        let mut link = self.link.write().await;
        match &link.connection {
            Some(current) if current.id() == connection_id => {}
            _ => return None,
        }
        link.connection = None;
        link.generation += 1;
        link.detached_at = Some(Utc::now());
        let generation = link.generation;
        drop(link);

        tracing::info!(
            session_key = %self.key,
            connection_id = %connection_id,
            "Connection detached"
        );
        self.events
            .publish(MuxEvent::SessionDetached {
                session_key: self.key.clone(),
                connection_id,
            })
            .await;
        Some(generation)
    }

    /// Queue a message from the connection for the kernel.
    ///
    /// Messages are processed in the order they are submitted.
    pub async fn submit(&self, mut message: Message) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed(self.key.clone()));
        }
        message.origin = Origin::Client;
        self.inbound
            .send(message)
            .await
            .map_err(|_| SessionError::Closed(self.key.clone()))
    }

    /// Run `message` through the pipeline and deliver it to the opposite side
    pub async fn relay(&self, message: Message) -> Result<Delivery, MuxError> {
        let origin = message.origin;
        let context = self.context().await;

        let message = match self.pipeline.run(message, &context).await? {
            Outcome::Forward(message) => message,
            Outcome::Filtered => return Ok(Delivery::Filtered),
        };

        match origin.opposite() {
            Origin::Kernel => {
                self.kernel.send(message).await?;
                Ok(Delivery::Delivered)
            }
            Origin::Client => Ok(self.deliver_to_client(message).await),
        }
    }

    /// Stop the relay tasks. Returns false if already closed.
    ///
    /// The kernel itself is released by the registry.
    pub async fn close(&self) -> bool {
        let mut link = self.link.write().await;
        if self.is_closed() {
            return false;
        }
        self.cancel.cancel();
        link.connection = None;
        true
    }

    /// Close only if still detached at `generation`
    pub async fn close_if_idle(&self, generation: u64) -> bool {
        let mut link = self.link.write().await;
        if self.is_closed() || link.connection.is_some() || link.generation != generation {
            return false;
        }
        self.cancel.cancel();
        link.connection = None;
        true
    }

    /// Deliver kernel output to whichever connection is current when the
    /// pipeline finishes.
    ///
    /// The read guard is held across the send so a concurrent
    /// [`update_connection`](Self::update_connection) either completes first
    /// (and we send to the new connection) or waits for this delivery.
    async fn deliver_to_client(&self, message: Message) -> Delivery {
        let link = self.link.read().await;

        if let Some(connection) = link.connection.as_ref().filter(|c| !c.is_closed()) {
            match connection.send(message.clone()).await {
                Ok(()) => return Delivery::Delivered,
                Err(e) => {
                    tracing::debug!(
                        session_key = %self.key,
                        connection_id = %connection.id(),
                        error = %e,
                        "Connection rejected message, buffering"
                    );
                }
            }
        }

        self.lock_backlog().push(message);
        Delivery::Buffered
    }

    /// Relay and report the outcome; used by the relay tasks
    async fn relay_and_report(&self, message: Message) {
        let origin = message.origin;
        match self.relay(message).await {
            Ok(Delivery::Filtered) => {
                self.events
                    .publish(MuxEvent::MessageFiltered {
                        session_key: self.key.clone(),
                        origin,
                    })
                    .await;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    session_key = %self.key,
                    origin = origin.as_str(),
                    error = %e,
                    "Message dropped"
                );
                self.events
                    .publish(MuxEvent::ProcessingFailed {
                        session_key: self.key.clone(),
                        origin,
                        message: e.to_string(),
                    })
                    .await;
            }
        }
    }

    fn lock_backlog(&self) -> MutexGuard<'_, Backlog> {
        self.backlog.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn attach_state(link: &Link) -> AttachState {
    if link.connection.is_some() {
        AttachState::Attached
    } else {
        AttachState::Detached
    }
}

async fn run_client_relay(
    session: Weak<Session>,
    mut rx: mpsc::Receiver<Message>,
    cancel: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = rx.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };
        let Some(session) = session.upgrade() else {
            break;
        };
        session.relay_and_report(message).await;
    }
}

async fn run_kernel_relay(
    session: Weak<Session>,
    mut rx: broadcast::Receiver<Message>,
    cancel: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            received = rx.recv() => received,
        };
        let Some(session) = session.upgrade() else {
            break;
        };
        match received {
            Ok(mut message) => {
                message.origin = Origin::Kernel;
                session.relay_and_report(message).await;
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(session_key = %session.key, skipped, "Kernel output lagged");
            }
            Err(RecvError::Closed) => {
                tracing::debug!(session_key = %session.key, "Kernel output closed");
                break;
            }
        }
    }
}
