//! SessionRegistry: the one place sessions are created, found and removed
//!
//! Each key maps to at most one session. Concurrent connects for a new key
//! are collapsed onto a single creation: the first caller installs a pending
//! slot and builds the kernel and document, later callers wait on that slot
//! and then attach to the finished session. A session only becomes visible
//! once both bindings succeeded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use super::key::SessionKey;
use super::lifecycle::{DisconnectOutcome, RetentionPolicy, schedule_expiry};
use super::state::{Session, SessionParts, SessionSummary};
use crate::config::{MuxConfig, RelayConfig};
use crate::connection::ConnectionRef;
use crate::document::{DocumentBinding, DocumentSource, DocumentStore};
use crate::error::{BindingError, MuxError, SessionError};
use crate::events::{CloseReason, EventBus, MuxEvent};
use crate::kernel::{KernelBinding, KernelManager, PortPool};
use crate::pipeline::Pipeline;

type Slots = Mutex<HashMap<SessionKey, Slot>>;

enum Slot {
    /// Creation in flight; the receiver errors once the creator is done
    Pending(watch::Receiver<()>),
    Ready(Arc<Session>),
}

/// Result of a successful connect
pub struct Attachment {
    pub session: Arc<Session>,
    /// True if this connect created the session
    pub created: bool,
}

enum Claim<'a> {
    Existing(Arc<Session>),
    Wait(watch::Receiver<()>),
    Create(PendingSlot<'a>),
}

pub struct SessionRegistry {
    slots: Slots,
    kernels: KernelBinding,
    documents: DocumentBinding,
    default_source: DocumentSource,
    pipeline: Arc<Pipeline>,
    events: Arc<dyn EventBus>,
    relay: RelayConfig,
    retention: RetentionPolicy,
}

impl SessionRegistry {
    /// Create a registry with no retention, default relay limits and blank
    /// default documents
    pub fn new(
        kernels: KernelBinding,
        documents: DocumentBinding,
        pipeline: Pipeline,
        events: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            kernels,
            documents,
            default_source: DocumentSource::Blank,
            pipeline: Arc::new(pipeline),
            events,
            relay: RelayConfig::default(),
            retention: RetentionPolicy::keep_forever(),
        }
    }

    /// Build a registry using the port range, relay, retention and document
    /// settings from `config`.
    ///
    /// `pipeline` is usually started from
    /// [`Pipeline::from_config`](crate::pipeline::Pipeline::from_config).
    pub fn from_config(
        config: &MuxConfig,
        manager: Arc<dyn KernelManager>,
        store: Arc<dyn DocumentStore>,
        pipeline: Pipeline,
        events: Arc<dyn EventBus>,
    ) -> Self {
        let ports = Arc::new(PortPool::from_config(&config.ports));
        let default_source = match &config.documents.default_path {
            Some(path) => DocumentSource::Path(path.clone()),
            None => DocumentSource::Blank,
        };
        Self::new(
            KernelBinding::new(manager, ports),
            DocumentBinding::new(store),
            pipeline,
            events,
        )
        .with_relay(config.relay)
        .with_retention(RetentionPolicy::from_config(&config.retention))
        .with_default_source(default_source)
    }

    /// Set queue and backlog limits for new sessions
    pub fn with_relay(mut self, relay: RelayConfig) -> Self {
        self.relay = relay;
        self
    }

    /// Set what happens to detached sessions
    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    /// Document used when a connection doesn't ask for one
    pub fn with_default_source(mut self, source: DocumentSource) -> Self {
        self.default_source = source;
        self
    }

    /// Bus that session lifecycle events are published on
    pub fn events(&self) -> &Arc<dyn EventBus> {
        &self.events
    }

    /// Attach `connection` to the session for its key, creating the session
    /// if there is none.
    ///
    /// On binding failure nothing is registered and a later connect for the
    /// same key starts from scratch.
    pub async fn on_connect(&self, connection: ConnectionRef) -> Result<Attachment, MuxError> {
        let key = connection.session_key().clone();

        loop {
            let claim = self.claim(&key);
            match claim {
                Claim::Existing(session) => {
                    match session.update_connection(connection.clone()).await {
                        Ok(_) => {
                            return Ok(Attachment {
                                session,
                                created: false,
                            });
                        }
                        // Closed between lookup and attach; clear it and retry
                        Err(SessionError::Closed(_)) => self.remove_slot(&session),
                        Err(e) => return Err(e.into()),
                    }
                }
                Claim::Wait(mut ready) => {
                    // Never sent on; resolves when the creator drops its sender
                    let _ = ready.changed().await;
                }
                Claim::Create(pending) => {
                    return match self.build_session(&key, connection.clone()).await {
                        Ok(session) => {
                            pending.commit(session.clone());
                            self.announce(&session, &connection).await;
                            Ok(Attachment {
                                session,
                                created: true,
                            })
                        }
                        Err(e) => {
                            drop(pending);
                            tracing::error!(
                                session_key = %key,
                                error = %e,
                                "Session binding failed"
                            );
                            self.events
                                .publish(MuxEvent::BindingFailed {
                                    session_key: key.clone(),
                                    message: e.to_string(),
                                })
                                .await;
                            Err(e.into())
                        }
                    };
                }
            }
        }
    }

    /// Detach `connection` from its session if it is still the current one.
    ///
    /// The session, kernel and document stay registered. With a retention
    /// grace period the session is closed later unless someone reattaches.
    pub async fn on_disconnect(
        self: &Arc<Self>,
        connection: ConnectionRef,
    ) -> Result<DisconnectOutcome, MuxError> {
        let key = connection.session_key().clone();
        let session = self.resolve(&key).await?;

        let Some(generation) = session.detach(connection.id()).await else {
            tracing::debug!(
                session_key = %key,
                connection_id = %connection.id(),
                "Ignoring disconnect from replaced connection"
            );
            return Ok(DisconnectOutcome::Stale);
        };

        let expires_in = self.retention.grace_period();
        if let Some(grace_period) = expires_in {
            schedule_expiry(Arc::downgrade(self), key, generation, grace_period);
        }
        Ok(DisconnectOutcome::Detached { expires_in })
    }

    /// Look up a registered session without waiting for one being created
    pub fn get(&self, key: &SessionKey) -> Result<Arc<Session>, SessionError> {
        match lock_slots(&self.slots).get(key) {
            Some(Slot::Ready(session)) => Ok(session.clone()),
            _ => Err(SessionError::UnknownSession(key.clone())),
        }
    }

    /// Keys of all registered sessions, sorted
    pub fn keys(&self) -> Vec<SessionKey> {
        let mut keys: Vec<SessionKey> = lock_slots(&self.slots)
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Ready(_)))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Number of registered sessions
    pub fn len(&self) -> usize {
        lock_slots(&self.slots)
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    /// Whether no sessions are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Summaries of all registered sessions, sorted by key
    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        let mut summaries = Vec::new();
        for session in self.ready_sessions() {
            summaries.push(session.summary().await);
        }
        summaries.sort_by(|a, b| a.session_key.cmp(&b.session_key));
        summaries
    }

    /// Close the session for `key` and release its kernel
    pub async fn teardown(&self, key: &SessionKey) -> Result<(), SessionError> {
        let session = self.get(key)?;
        if session.close().await {
            self.finish_teardown(&session, CloseReason::Requested).await;
        } else {
            self.remove_slot(&session);
        }
        Ok(())
    }

    /// Close every registered session
    pub async fn shutdown(&self) {
        let sessions = self.ready_sessions();
        tracing::info!(count = sessions.len(), "Shutting down sessions");
        for session in sessions {
            if session.close().await {
                self.finish_teardown(&session, CloseReason::Shutdown).await;
            }
        }
    }

    /// Close the session for `key` if it is still detached at `generation`
    pub(super) async fn expire(&self, key: &SessionKey, generation: u64) -> bool {
        let Ok(session) = self.get(key) else {
            return false;
        };
        if !session.close_if_idle(generation).await {
            return false;
        }
        self.finish_teardown(&session, CloseReason::Expired).await;
        true
    }

    fn claim(&self, key: &SessionKey) -> Claim<'_> {
        let mut slots = lock_slots(&self.slots);
        match slots.get(key) {
            Some(Slot::Ready(session)) => Claim::Existing(session.clone()),
            Some(Slot::Pending(ready)) => Claim::Wait(ready.clone()),
            None => {
                let (tx, rx) = watch::channel(());
                slots.insert(key.clone(), Slot::Pending(rx));
                Claim::Create(PendingSlot {
                    slots: &self.slots,
                    key: key.clone(),
                    committed: false,
                    _ready: tx,
                })
            }
        }
    }

    /// Like [`get`](Self::get), but waits for an in-flight creation
    async fn resolve(&self, key: &SessionKey) -> Result<Arc<Session>, SessionError> {
        loop {
            let pending = match lock_slots(&self.slots).get(key) {
                Some(Slot::Ready(session)) => return Ok(session.clone()),
                Some(Slot::Pending(ready)) => ready.clone(),
                None => return Err(SessionError::UnknownSession(key.clone())),
            };
            let mut pending = pending;
            let _ = pending.changed().await;
        }
    }

    async fn build_session(
        &self,
        key: &SessionKey,
        connection: ConnectionRef,
    ) -> Result<Arc<Session>, BindingError> {
        let source = connection
            .document_source()
            .unwrap_or_else(|| self.default_source.clone());
        let document = self.documents.bind(&source).await?;
        let kernel = self.kernels.create(key).await?;

        Ok(Session::spawn(
            SessionParts {
                key: key.clone(),
                kernel,
                document,
                pipeline: self.pipeline.clone(),
                events: self.events.clone(),
                relay: self.relay,
            },
            connection,
        ))
    }

    async fn announce(&self, session: &Arc<Session>, connection: &ConnectionRef) {
        tracing::info!(
            session_key = %session.key(),
            kernel_id = %session.kernel().id(),
            document_id = %session.document().id(),
            "Session created"
        );
        self.events
            .publish(MuxEvent::SessionCreated {
                session_key: session.key().clone(),
                kernel_id: session.kernel().id().to_string(),
                document_id: session.document().id(),
            })
            .await;
        self.events
            .publish(MuxEvent::SessionAttached {
                session_key: session.key().clone(),
                connection_id: connection.id(),
                replayed: 0,
            })
            .await;
    }

    async fn finish_teardown(&self, session: &Arc<Session>, reason: CloseReason) {
        self.remove_slot(session);
        if let Err(e) = self.kernels.release(session.kernel()).await {
            tracing::warn!(session_key = %session.key(), error = %e, "Kernel shutdown failed");
        }
        tracing::info!(session_key = %session.key(), reason = ?reason, "Session closed");
        self.events
            .publish(MuxEvent::SessionClosed {
                session_key: session.key().clone(),
                reason,
            })
            .await;
    }

    /// Remove the slot for `session`'s key if it still holds that session
    fn remove_slot(&self, session: &Arc<Session>) {
        let mut slots = lock_slots(&self.slots);
        let is_current = matches!(
            slots.get(session.key()),
            Some(Slot::Ready(current)) if Arc::ptr_eq(current, session)
        );
        if is_current {
            slots.remove(session.key());
        }
    }

    fn ready_sessions(&self) -> Vec<Arc<Session>> {
        lock_slots(&self.slots)
            .values()
            .filter_map(|slot| match slot {
                Slot::Ready(session) => Some(session.clone()),
                Slot::Pending(_) => None,
            })
            .collect()
    }
}

/// Pending slot owned by the creating task.
///
/// Dropping it without committing removes the slot, so a failed or
/// cancelled creation leaves nothing registered. Waiters wake when the
/// sender goes away either way.
struct PendingSlot<'a> {
    slots: &'a Slots,
    key: SessionKey,
    committed: bool,
    _ready: watch::Sender<()>,
}

impl PendingSlot<'_> {
    fn commit(mut self, session: Arc<Session>) {
        lock_slots(self.slots).insert(self.key.clone(), Slot::Ready(session));
        self.committed = true;
    }
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        if !self.committed {
            lock_slots(self.slots).remove(&self.key);
        }
    }
}

fn lock_slots(slots: &Slots) -> MutexGuard<'_, HashMap<SessionKey, Slot>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ChannelConnection, Connection};
    use crate::document::MemoryDocumentStore;
    use crate::events::MemoryEventBus;
    use crate::error::KernelError;
    use crate::kernel::{KernelHandle, KernelPorts, LoopbackKernelManager};
    use crate::session::AttachState;
    use async_trait::async_trait;
    use std::path::PathBuf;

    struct FailingManager;

    #[async_trait]
    impl KernelManager for FailingManager {
        async fn create(&self, _ports: KernelPorts) -> Result<KernelHandle, KernelError> {
            Err(KernelError::StartFailed("no interpreter".to_string()))
        }
    }

    fn registry() -> (Arc<SessionRegistry>, Arc<LoopbackKernelManager>) {
        let manager = Arc::new(LoopbackKernelManager::new());
        let registry = SessionRegistry::new(
            KernelBinding::new(manager.clone(), Arc::new(PortPool::new(40000, 40009))),
            DocumentBinding::new(Arc::new(MemoryDocumentStore::new())),
            Pipeline::default(),
            Arc::new(MemoryEventBus::new(100)),
        );
        (Arc::new(registry), manager)
    }

    #[tokio::test]
    async fn first_connect_creates_session() {
        let (registry, manager) = registry();
        let (conn, _rx) = ChannelConnection::open("abc");

        let attachment = registry.on_connect(conn).await.unwrap();

        assert!(attachment.created);
        assert_eq!(registry.len(), 1);
        assert_eq!(manager.created(), 1);
        assert_eq!(attachment.session.document().len(), 2);
    }

    #[tokio::test]
    async fn reconnect_reuses_session() {
        let (registry, manager) = registry();
        let (first, _rx1) = ChannelConnection::open("abc");
        let created = registry.on_connect(first.clone()).await.unwrap();

        registry.on_disconnect(first).await.unwrap();
        assert_eq!(created.session.state().await, AttachState::Detached);

        let (second, _rx2) = ChannelConnection::open("abc");
        let reattached = registry.on_connect(second).await.unwrap();

        assert!(!reattached.created);
        assert!(Arc::ptr_eq(&created.session, &reattached.session));
        assert_eq!(manager.created(), 1);
    }

    #[tokio::test]
    async fn disconnect_of_unknown_key_errors() {
        let (registry, _manager) = registry();
        let (conn, _rx) = ChannelConnection::open("nobody");

        let err = registry.on_disconnect(conn).await.unwrap_err();
        assert!(matches!(
            err,
            MuxError::Session(SessionError::UnknownSession(_))
        ));
    }

    #[tokio::test]
    async fn stale_disconnect_keeps_new_connection() {
        let (registry, _manager) = registry();
        let (first, _rx1) = ChannelConnection::open("abc");
        let (second, _rx2) = ChannelConnection::open("abc");
        registry.on_connect(first.clone()).await.unwrap();
        let attachment = registry.on_connect(second.clone()).await.unwrap();

        let outcome = registry.on_disconnect(first).await.unwrap();

        assert_eq!(outcome, DisconnectOutcome::Stale);
        assert_eq!(
            attachment.session.context().await.connection_id,
            Some(second.id())
        );
    }

    #[tokio::test]
    async fn missing_document_registers_nothing() {
        let (registry, manager) = registry();
        let (conn, _rx) = ChannelConnection::open_with_source(
            "abc",
            Some(DocumentSource::Path(PathBuf::from("missing.json"))),
        );

        let err = registry.on_connect(conn).await.err().unwrap();

        assert!(matches!(err, MuxError::Binding(BindingError::Document(_))));
        assert!(registry.is_empty());
        assert_eq!(manager.created(), 0);
    }

    #[tokio::test]
    async fn kernel_start_failure_registers_nothing() {
        let pool = Arc::new(PortPool::new(40000, 40001));
        let registry = SessionRegistry::new(
            KernelBinding::new(Arc::new(FailingManager), pool.clone()),
            DocumentBinding::new(Arc::new(MemoryDocumentStore::new())),
            Pipeline::default(),
            Arc::new(MemoryEventBus::new(100)),
        );
        let (conn, _rx) = ChannelConnection::open("abc");

        let err = registry.on_connect(conn).await.err().unwrap();

        assert!(matches!(
            err,
            MuxError::Binding(BindingError::Kernel(KernelError::StartFailed(_)))
        ));
        assert!(registry.is_empty());
        assert!(registry.get(&SessionKey::from("abc")).is_err());
        assert_eq!(pool.allocated(), 0);

        let events = registry.events().session_events(&SessionKey::from("abc")).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].1, MuxEvent::BindingFailed { .. }));
    }

    #[tokio::test]
    async fn teardown_releases_kernel() {
        let (registry, manager) = registry();
        let (conn, _rx) = ChannelConnection::open("abc");
        let attachment = registry.on_connect(conn).await.unwrap();
        let kernel_id = attachment.session.kernel().id().to_string();

        registry.teardown(&SessionKey::from("abc")).await.unwrap();

        assert!(registry.is_empty());
        assert!(attachment.session.is_closed());
        assert!(!manager.kernel(&kernel_id).unwrap().is_running());
        assert!(registry.teardown(&SessionKey::from("abc")).await.is_err());
    }

    #[tokio::test]
    async fn connect_after_teardown_starts_fresh() {
        let (registry, manager) = registry();
        let (first, _rx1) = ChannelConnection::open("abc");
        let old = registry.on_connect(first).await.unwrap().session;
        registry.teardown(old.key()).await.unwrap();

        let (second, _rx2) = ChannelConnection::open("abc");
        let attachment = registry.on_connect(second).await.unwrap();

        assert!(attachment.created);
        assert!(!Arc::ptr_eq(&old, &attachment.session));
        assert_eq!(manager.created(), 2);
    }

    #[tokio::test]
    async fn list_sessions_is_sorted() {
        let (registry, _manager) = registry();
        for key in ["b", "a", "c"] {
            let (conn, _rx) = ChannelConnection::open(key);
            registry.on_connect(conn).await.unwrap();
        }

        let keys: Vec<String> = registry
            .list_sessions()
            .await
            .into_iter()
            .map(|s| s.session_key.to_string())
            .collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(registry.keys().len(), 3);
    }

    #[tokio::test]
    async fn shutdown_closes_everything() {
        let (registry, _manager) = registry();
        for key in ["a", "b"] {
            let (conn, _rx) = ChannelConnection::open(key);
            registry.on_connect(conn).await.unwrap();
        }

        registry.shutdown().await;

        assert!(registry.is_empty());
        let closed = registry
            .events()
            .events_from(0)
            .await
            .into_iter()
            .filter(|(_, e)| {
                matches!(
                    e,
                    MuxEvent::SessionClosed {
                        reason: CloseReason::Shutdown,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(closed, 2);
    }
}
