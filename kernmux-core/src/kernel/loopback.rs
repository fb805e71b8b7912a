//! In-process loopback kernel
//!
//! Answers every message with an `execute_reply` on its output channel. Used
//! when no real kernel manager is wired in, and by tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::traits::{Kernel, KernelHandle, KernelManager, KernelPorts};
use crate::error::KernelError;
use crate::message::Message;

const OUTPUT_CAPACITY: usize = 256;

pub struct LoopbackKernel {
    id: String,
    ports: KernelPorts,
    tx: broadcast::Sender<Message>,
    execution_count: AtomicU64,
    running: AtomicBool,
}

impl LoopbackKernel {
    pub fn new(ports: KernelPorts) -> Self {
        let (tx, _) = broadcast::channel(OUTPUT_CAPACITY);
        Self {
            id: Uuid::new_v4().to_string(),
            ports,
            tx,
            execution_count: AtomicU64::new(0),
            running: AtomicBool::new(true),
        }
    }

    /// Emit a message on the output channel as if the kernel produced it
    pub fn emit(&self, body: serde_json::Value) {
        // No subscribers is fine
        let _ = self.tx.send(Message::from_kernel(body));
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Kernel for LoopbackKernel {
    fn id(&self) -> &str {
        &self.id
    }

    fn ports(&self) -> KernelPorts {
        self.ports
    }

    async fn send(&self, message: Message) -> Result<(), KernelError> {
        if !self.is_running() {
            return Err(KernelError::Closed(self.id.clone()));
        }
        let count = self.execution_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.emit(json!({
            "type": "execute_reply",
            "execution_count": count,
            "parent": message.body,
        }));
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.tx.subscribe()
    }

    async fn shutdown(&self) -> Result<(), KernelError> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Creates [`LoopbackKernel`]s and remembers them
#[derive(Default)]
pub struct LoopbackKernelManager {
    created: AtomicUsize,
    kernels: std::sync::Mutex<Vec<Arc<LoopbackKernel>>>,
}

impl LoopbackKernelManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of kernels started so far
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Look up a kernel this manager started
    pub fn kernel(&self, id: &str) -> Option<Arc<LoopbackKernel>> {
        self.kernels
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .find(|k| k.id == id)
            .cloned()
    }
}

#[async_trait]
impl KernelManager for LoopbackKernelManager {
    async fn create(&self, ports: KernelPorts) -> Result<KernelHandle, KernelError> {
        let kernel = Arc::new(LoopbackKernel::new(ports));
        self.kernels
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(kernel.clone());
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(kernel)
    }
}
