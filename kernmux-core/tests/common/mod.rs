#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kernmux_core::{
    DocumentBinding, KernelBinding, KernelError, KernelHandle, KernelManager, KernelPorts,
    LoopbackKernelManager, MemoryDocumentStore, MemoryEventBus, Message, Pipeline, PortPool,
    SessionRegistry,
};
use tokio::sync::mpsc;

/// Loopback kernels that take a while to start
pub struct SlowKernelManager {
    pub inner: LoopbackKernelManager,
    pub delay: Duration,
}

#[async_trait]
impl KernelManager for SlowKernelManager {
    async fn create(&self, ports: KernelPorts) -> Result<KernelHandle, KernelError> {
        tokio::time::sleep(self.delay).await;
        self.inner.create(ports).await
    }
}

pub fn registry_with(manager: Arc<dyn KernelManager>, pipeline: Pipeline) -> SessionRegistry {
    registry_with_pool(manager, pipeline, Arc::new(PortPool::new(45000, 45999)))
}

pub fn registry_with_pool(
    manager: Arc<dyn KernelManager>,
    pipeline: Pipeline,
    pool: Arc<PortPool>,
) -> SessionRegistry {
    SessionRegistry::new(
        KernelBinding::new(manager, pool),
        DocumentBinding::new(Arc::new(MemoryDocumentStore::new())),
        pipeline,
        Arc::new(MemoryEventBus::new(1000)),
    )
}

pub async fn recv(rx: &mut mpsc::UnboundedReceiver<Message>) -> Message {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for message")
        .expect("connection channel closed")
}
