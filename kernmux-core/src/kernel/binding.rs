//! KernelBinding: port allocation wrapped around kernel creation

use std::sync::Arc;

use super::traits::{KernelHandle, KernelManager, KernelPorts, PortAllocator};
use crate::error::KernelError;
use crate::session::SessionKey;

/// Creates one kernel per session on two freshly allocated ports
#[derive(Clone)]
pub struct KernelBinding {
    manager: Arc<dyn KernelManager>,
    ports: Arc<dyn PortAllocator>,
}

impl KernelBinding {
    /// Create a binding that starts kernels through `manager` on ports from `ports`
    pub fn new(manager: Arc<dyn KernelManager>, ports: Arc<dyn PortAllocator>) -> Self {
        Self { manager, ports }
    }

    /// Allocate control and broadcast ports and start a kernel on them.
    ///
    /// On any failure every port allocated so far is released again. If the
    /// returned future is dropped mid-way, the ports are released in the
    /// background.
    pub async fn create(&self, session_key: &SessionKey) -> Result<KernelHandle, KernelError> {
        let mut lease = PortLease::new(self.ports.clone());
        let ports = match lease.take_pair().await {
            Ok(ports) => ports,
            Err(e) => {
                lease.release().await;
                return Err(e);
            }
        };

        match self.manager.create(ports).await {
            Ok(kernel) => {
                lease.keep();
                tracing::info!(
                    session_key = %session_key,
                    kernel_id = %kernel.id(),
                    control = ports.control,
                    broadcast = ports.broadcast,
                    "Kernel started"
                );
                Ok(kernel)
            }
            Err(e) => {
                tracing::warn!(
                    session_key = %session_key,
                    control = ports.control,
                    broadcast = ports.broadcast,
                    error = %e,
                    "Kernel failed to start"
                );
                lease.release().await;
                Err(e)
            }
        }
    }

    /// Shut the kernel down and return its ports to the allocator.
    ///
    /// Ports are released even when shutdown reports an error.
    pub async fn release(&self, kernel: &KernelHandle) -> Result<(), KernelError> {
        let result = kernel.shutdown().await;
        let ports = kernel.ports();
        self.ports.release(ports.control).await;
        self.ports.release(ports.broadcast).await;
        result
    }
}

/// Ports held while a kernel starts.
///
/// Dropped without [`keep`](Self::keep) or [`release`](Self::release), the
/// ports go back to the allocator on a spawned task.
struct PortLease {
    allocator: Arc<dyn PortAllocator>,
    held: Vec<u16>,
}

impl PortLease {
    fn new(allocator: Arc<dyn PortAllocator>) -> Self {
        Self {
            allocator,
            held: Vec::with_capacity(2),
        }
    }

    async fn take(&mut self) -> Result<u16, KernelError> {
        let port = self.allocator.allocate().await?;
        self.held.push(port);
        Ok(port)
    }

    async fn take_pair(&mut self) -> Result<KernelPorts, KernelError> {
        let control = self.take().await?;
        let broadcast = self.take().await?;
        Ok(KernelPorts { control, broadcast })
    }

    /// The ports now belong to a running kernel
    fn keep(mut self) {
        self.held.clear();
    }

    async fn release(mut self) {
        for port in std::mem::take(&mut self.held) {
            self.allocator.release(port).await;
        }
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        if self.held.is_empty() {
            return;
        }
        let held = std::mem::take(&mut self.held);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!(ports = ?held, "Kernel start abandoned, releasing ports");
                let allocator = self.allocator.clone();
                handle.spawn(async move {
                    for port in held {
                        allocator.release(port).await;
                    }
                });
            }
            Err(_) => {
                tracing::warn!(
                    ports = ?held,
                    "Kernel start abandoned outside a runtime, ports leaked"
                );
            }
        }
    }
}
