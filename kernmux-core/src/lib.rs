//! kernmux-core: session lifecycle manager and message pipeline
//!
//! Binds each end-user session to one kernel and one notebook document and
//! relays messages between the user's connection and the kernel:
//!
//! - **Session registry** - [`SessionRegistry`] keeps at most one [`Session`]
//!   per [`SessionKey`] and reuses it across reconnects
//! - **Message pipeline** - [`Pipeline`] runs an ordered chain of
//!   [`Processor`]s over every relayed message
//! - **Bindings** - [`KernelBinding`] allocates ports and starts kernels,
//!   [`DocumentBinding`] builds or loads the session's document
//! - **Connection events** - [`ConnectionBinder`] drives the registry from
//!   the connection manager's connect/disconnect stream
//! - **Event system** - [`EventBus`] and [`MemoryEventBus`] report session
//!   lifecycle and relay failures
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use kernmux_core::{
//!     ConfigLoader, ConnectionBinder, ConnectionEvent, FsDocumentStore,
//!     LoopbackKernelManager, MemoryEventBus, Pipeline, SessionRegistry,
//! };
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::load()?;
//!     let registry = Arc::new(SessionRegistry::from_config(
//!         &config,
//!         Arc::new(LoopbackKernelManager::new()),
//!         Arc::new(FsDocumentStore::new(config.documents.root_or_default())),
//!         Pipeline::from_config(&config.pipeline).build(),
//!         Arc::new(MemoryEventBus::default()),
//!     ));
//!
//!     let (events, rx) = tokio::sync::mpsc::channel::<ConnectionEvent>(64);
//!     let binder = ConnectionBinder::spawn(registry.clone(), rx);
//!
//!     // Hand `events` to the transport layer...
//!     drop(events);
//!     binder.await?;
//!     registry.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ConnectionEvent ──► ConnectionBinder ──► SessionRegistry
//!                                               │ create or reattach
//!                                               ▼
//!   Connection ◄──────────────────────────── Session ──────────────► Kernel
//!              kernel output (or Backlog)    │    ▲   client input
//!                                            ▼    │
//!                                          Pipeline
//! ```

pub mod binder;
pub mod config;
pub mod connection;
pub mod document;
pub mod error;
pub mod events;
pub mod kernel;
pub mod logging;
pub mod message;
pub mod pipeline;
pub mod session;

// Re-export key types for convenience
pub use binder::ConnectionBinder;
pub use config::{ConfigError, ConfigLoader, MuxConfig};
pub use connection::{ChannelConnection, Connection, ConnectionEvent, ConnectionId, ConnectionRef};
pub use document::{
    Document, DocumentBinding, DocumentHandle, DocumentSource, DocumentStore, FsDocumentStore,
    MemoryDocumentStore,
};
pub use error::{
    BindingError, ConnectionError, DocumentError, KernelError, MuxError, ProcessingError,
    ProcessorError, SessionError,
};
pub use events::{CloseReason, EventBus, MemoryEventBus, MuxEvent};
pub use kernel::{
    Kernel, KernelBinding, KernelHandle, KernelManager, KernelPorts, LoopbackKernel,
    LoopbackKernelManager, PortAllocator, PortPool,
};
pub use message::{Message, Origin};
pub use pipeline::{FnProcessor, Outcome, Pipeline, PipelineBuilder, Processor};
pub use session::{
    AttachState, Attachment, Delivery, DisconnectOutcome, RetentionPolicy, Session,
    SessionContext, SessionKey, SessionRegistry, SessionSummary,
};
