//! Kernel binding
//!
//! Kernel processes are owned by an external [`KernelManager`]; this module
//! only allocates their ports and wraps creation and teardown.

pub mod binding;
pub mod loopback;
pub mod ports;
pub mod traits;

pub use binding::KernelBinding;
pub use loopback::{LoopbackKernel, LoopbackKernelManager};
pub use ports::PortPool;
pub use traits::{Kernel, KernelHandle, KernelManager, KernelPorts, PortAllocator};
