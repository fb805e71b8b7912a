//! Kernel, KernelManager and PortAllocator traits

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::KernelError;
use crate::message::Message;

/// The two ports a kernel listens on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KernelPorts {
    /// Request/reply (shell-style) traffic
    pub control: u16,
    /// Broadcast (iopub-style) output
    pub broadcast: u16,
}

/// A running kernel as seen by a session
#[async_trait]
pub trait Kernel: Send + Sync {
    fn id(&self) -> &str;

    fn ports(&self) -> KernelPorts;

    /// Send a client message to the kernel
    async fn send(&self, message: Message) -> Result<(), KernelError>;

    /// Subscribe to messages emitted by the kernel
    fn subscribe(&self) -> broadcast::Receiver<Message>;

    /// Stop the kernel process
    async fn shutdown(&self) -> Result<(), KernelError>;
}

pub type KernelHandle = Arc<dyn Kernel>;

/// Spawns kernels on caller-chosen ports
#[async_trait]
pub trait KernelManager: Send + Sync {
    async fn create(&self, ports: KernelPorts) -> Result<KernelHandle, KernelError>;
}

/// Hands out ports that never collide while allocated
#[async_trait]
pub trait PortAllocator: Send + Sync {
    async fn allocate(&self) -> Result<u16, KernelError>;

    /// Return a port; releasing a port that isn't allocated is a no-op
    async fn release(&self, port: u16);
}
