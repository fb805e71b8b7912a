//! In-memory port pool

use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::traits::PortAllocator;
use crate::config::PortRangeConfig;
use crate::error::KernelError;

/// Allocates ports from an inclusive range.
///
/// Scanning resumes after the last port handed out, so a port that was just
/// released is the last candidate to be reused.
#[derive(Debug)]
pub struct PortPool {
    start: u16,
    end: u16,
    state: Mutex<PoolState>,
}

#[derive(Debug)]
struct PoolState {
    in_use: BTreeSet<u16>,
    cursor: u16,
}

impl PortPool {
    /// Create a pool over `start..=end`
    pub fn new(start: u16, end: u16) -> Self {
        let (start, end) = if start <= end {
            (start, end)
        } else {
            (end, start)
        };
        Self {
            start,
            end,
            state: Mutex::new(PoolState {
                in_use: BTreeSet::new(),
                cursor: start,
            }),
        }
    }

    pub fn from_config(config: &PortRangeConfig) -> Self {
        Self::new(config.start, config.end)
    }

    /// Number of ports currently allocated
    pub fn allocated(&self) -> usize {
        self.lock().in_use.len()
    }

    /// Total number of ports in the range
    pub fn capacity(&self) -> usize {
        usize::from(self.end - self.start) + 1
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_after(&self, port: u16) -> u16 {
        if port >= self.end {
            self.start
        } else {
            port + 1
        }
    }
}

#[async_trait]
impl PortAllocator for PortPool {
    async fn allocate(&self) -> Result<u16, KernelError> {
        let mut state = self.lock();
        let mut candidate = state.cursor;

        for _ in 0..self.capacity() {
            if !state.in_use.contains(&candidate) {
                state.in_use.insert(candidate);
                state.cursor = self.next_after(candidate);
                tracing::trace!(port = candidate, "Allocated port");
                return Ok(candidate);
            }
            candidate = self.next_after(candidate);
        }

        Err(KernelError::PortsExhausted {
            start: self.start,
            end: self.end,
        })
    }

    async fn release(&self, port: u16) {
        if self.lock().in_use.remove(&port) {
            tracing::trace!(port, "Released port");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[tokio::test]
    async fn allocations_are_unique() {
        let pool = PortPool::new(9000, 9009);
        let mut seen = HashSet::new();
        for _ in 0..10 {
            assert!(seen.insert(pool.allocate().await.unwrap()));
        }
        assert_eq!(pool.allocated(), 10);
    }

    #[tokio::test]
    async fn exhausted_pool_errors() {
        let pool = PortPool::new(9000, 9001);
        pool.allocate().await.unwrap();
        pool.allocate().await.unwrap();

        let err = pool.allocate().await.unwrap_err();
        assert!(matches!(
            err,
            KernelError::PortsExhausted {
                start: 9000,
                end: 9001
            }
        ));
    }

    #[tokio::test]
    async fn released_port_is_reused_last() {
        let pool = PortPool::new(9000, 9002);
        let first = pool.allocate().await.unwrap();
        pool.release(first).await;

        assert_eq!(pool.allocate().await.unwrap(), 9001);
        assert_eq!(pool.allocate().await.unwrap(), 9002);
        assert_eq!(pool.allocate().await.unwrap(), first);
    }

    #[tokio::test]
    async fn release_of_unknown_port_is_noop() {
        let pool = PortPool::new(9000, 9001);
        pool.release(1234).await;
        assert_eq!(pool.allocated(), 0);
    }

    #[tokio::test]
    async fn single_port_range_works() {
        let pool = PortPool::new(u16::MAX, u16::MAX);
        assert_eq!(pool.capacity(), 1);
        assert_eq!(pool.allocate().await.unwrap(), u16::MAX);
        assert!(pool.allocate().await.is_err());
    }

    #[tokio::test]
    async fn concurrent_allocations_never_collide() {
        let pool = Arc::new(PortPool::new(10000, 10199));
        let mut handles = vec![];
        for _ in 0..100 {
            let pool = Arc::clone(&pool);
            handles.push(tokio::spawn(async move { pool.allocate().await.unwrap() }));
        }

        let mut ports = HashSet::new();
        for handle in handles {
            assert!(ports.insert(handle.await.unwrap()));
        }
        assert_eq!(ports.len(), 100);
    }
}
