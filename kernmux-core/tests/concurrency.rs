//! Concurrency tests for SessionRegistry
//!
//! - Concurrent connects for one new key create exactly one session
//! - Slow creation of one session doesn't hold up another key

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use kernmux_core::{ChannelConnection, LoopbackKernelManager, Pipeline, PortPool, SessionKey};

use common::{SlowKernelManager, registry_with, registry_with_pool};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_connects_for_new_key_create_one_session() {
    let manager = Arc::new(SlowKernelManager {
        inner: LoopbackKernelManager::new(),
        delay: Duration::from_millis(50),
    });
    let registry = Arc::new(registry_with(manager.clone(), Pipeline::default()));

    let mut handles = Vec::new();
    let mut receivers = Vec::new();
    for _ in 0..8 {
        let (conn, rx) = ChannelConnection::open("abc");
        receivers.push(rx);
        let registry = registry.clone();
        handles.push(tokio::spawn(async move { registry.on_connect(conn).await }));
    }

    let mut sessions = Vec::new();
    for handle in handles {
        sessions.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(sessions.iter().filter(|a| a.created).count(), 1);
    assert!(
        sessions
            .windows(2)
            .all(|pair| Arc::ptr_eq(&pair[0].session, &pair[1].session))
    );
    assert_eq!(manager.inner.created(), 1);
    assert_eq!(registry.keys(), vec![SessionKey::from("abc")]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn different_keys_create_in_parallel() {
    let manager = Arc::new(SlowKernelManager {
        inner: LoopbackKernelManager::new(),
        delay: Duration::from_millis(100),
    });
    let registry = Arc::new(registry_with(manager.clone(), Pipeline::default()));

    let start = Instant::now();
    let mut handles = Vec::new();
    let mut receivers = Vec::new();
    for key in ["a", "b", "c", "d"] {
        let (conn, rx) = ChannelConnection::open(key);
        receivers.push(rx);
        let registry = registry.clone();
        handles.push(tokio::spawn(async move { registry.on_connect(conn).await }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().unwrap().created);
    }

    // Four serial creations would take at least 400ms
    assert!(start.elapsed() < Duration::from_millis(350));
    assert_eq!(registry.len(), 4);
    assert_eq!(manager.inner.created(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancelled_creation_leaves_no_slot_and_no_ports() {
    let manager = Arc::new(SlowKernelManager {
        inner: LoopbackKernelManager::new(),
        delay: Duration::from_millis(200),
    });
    // Room for exactly one kernel
    let pool = Arc::new(PortPool::new(46000, 46001));
    let registry = Arc::new(registry_with_pool(
        manager.clone(),
        Pipeline::default(),
        pool.clone(),
    ));

    let (conn, _rx) = ChannelConnection::open("abc");
    let first = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.on_connect(conn).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    first.abort();
    let _ = first.await;

    assert!(registry.is_empty());
    tokio::time::timeout(Duration::from_secs(1), async {
        while pool.allocated() != 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("ports from the cancelled start were not released");

    let (conn, _rx2) = ChannelConnection::open("abc");
    let attachment = registry.on_connect(conn).await.unwrap();
    assert!(attachment.created);
    assert_eq!(pool.allocated(), 2);
}
