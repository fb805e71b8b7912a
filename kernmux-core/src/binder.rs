//! Connection event binder
//!
//! Drives the [`SessionRegistry`] from the connection manager's event stream.
//! Events for one session key are handled in arrival order; different keys
//! are handled concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::connection::ConnectionEvent;
use crate::error::{MuxError, SessionError};
use crate::session::{DisconnectOutcome, SessionKey, SessionRegistry};

pub struct ConnectionBinder;

impl ConnectionBinder {
    /// Start consuming `events`.
    ///
    /// The returned task finishes once the channel is closed and every
    /// in-flight event has been handled.
    pub fn spawn(
        registry: Arc<SessionRegistry>,
        events: mpsc::Receiver<ConnectionEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(run(registry, events))
    }
}

async fn run(registry: Arc<SessionRegistry>, mut events: mpsc::Receiver<ConnectionEvent>) {
    // Last handler spawned per key; the next one for that key waits on it
    let mut tails: HashMap<SessionKey, JoinHandle<()>> = HashMap::new();

    while let Some(event) = events.recv().await {
        tails.retain(|_, handle| !handle.is_finished());

        let key = event.session_key().clone();
        let previous = tails.remove(&key);
        let registry = registry.clone();
        let handle = tokio::spawn(async move {
            if let Some(previous) = previous {
                if let Err(e) = previous.await {
                    tracing::warn!(
                        session_key = %event.session_key(),
                        error = %e,
                        "Previous connection event handler failed"
                    );
                }
            }
            handle_event(&registry, event).await;
        });
        tails.insert(key, handle);
    }

    for (key, handle) in tails.drain() {
        if let Err(e) = handle.await {
            tracing::warn!(session_key = %key, error = %e, "Connection event handler failed");
        }
    }
    tracing::debug!("Connection event stream closed");
}

async fn handle_event(registry: &Arc<SessionRegistry>, event: ConnectionEvent) {
    match event {
        ConnectionEvent::Connected(connection) => {
            let connection_id = connection.id();
            match registry.on_connect(connection).await {
                Ok(attachment) => {
                    tracing::debug!(
                        session_key = %attachment.session.key(),
                        connection_id = %connection_id,
                        created = attachment.created,
                        "Connect handled"
                    );
                }
                // Already logged by the registry
                Err(MuxError::Binding(_)) => {}
                Err(e) => {
                    tracing::warn!(connection_id = %connection_id, error = %e, "Connect failed");
                }
            }
        }
        ConnectionEvent::Disconnected(connection) => {
            let key = connection.session_key().clone();
            match registry.on_disconnect(connection).await {
                Ok(DisconnectOutcome::Detached { expires_in }) => {
                    tracing::debug!(session_key = %key, ?expires_in, "Disconnect handled");
                }
                Ok(DisconnectOutcome::Stale) => {}
                Err(MuxError::Session(SessionError::UnknownSession(_))) => {
                    tracing::debug!(session_key = %key, "Disconnect for unknown session");
                }
                Err(e) => {
                    tracing::warn!(session_key = %key, error = %e, "Disconnect failed");
                }
            }
        }
    }
}
