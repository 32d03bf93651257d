//! Versioned config store with change notification.
//!
//! `ConfigStore<T>` keeps the live value behind a `RwLock` and bumps a
//! version on every replacement. Request handlers take a cheap
//! [`snapshot`](ConfigStore::snapshot); long-running processors hold a
//! [`ConfigWatcher`] and react when the value is swapped.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, RwLockReadGuard, watch};

pub struct ConfigStore<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    data: RwLock<T>,
    version: AtomicU64,
    version_tx: watch::Sender<u64>,
}

/// Receives notifications when a [`ConfigStore`] is updated.
pub struct ConfigWatcher {
    version_rx: watch::Receiver<u64>,
}

impl<T> ConfigStore<T> {
    pub fn new(initial: T) -> Self {
        let (version_tx, _) = watch::channel(0u64);
        Self {
            inner: Arc::new(Inner {
                data: RwLock::new(initial),
                version: AtomicU64::new(0),
                version_tx,
            }),
        }
    }

    /// Replace the stored value and notify all watchers.
    pub async fn update(&self, value: T) {
        let mut guard = self.inner.data.write().await;
        *guard = value;
        let version = self.inner.version.fetch_add(1, Ordering::Relaxed) + 1;
        // Release the write lock before waking watchers that will read.
        drop(guard);
        let _ = self.inner.version_tx.send(version);
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.data.read().await
    }

    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Relaxed)
    }

    pub fn subscribe(&self) -> ConfigWatcher {
        ConfigWatcher {
            version_rx: self.inner.version_tx.subscribe(),
        }
    }
}

impl<T: Clone> ConfigStore<T> {
    /// Clone the current value so no lock is held across awaits.
    pub async fn snapshot(&self) -> T {
        self.inner.data.read().await.clone()
    }
}

impl<T> Clone for ConfigStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl ConfigWatcher {
    /// Wait until the config store is updated.
    ///
    /// Returns `Err` once the [`ConfigStore`] has been dropped.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.version_rx.changed().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_update_bumps_version_and_wakes_watcher() {
        let store = ConfigStore::new(1u32);
        let mut watcher = store.subscribe();
        assert_eq!(store.version(), 0);

        store.update(2).await;

        watcher.changed().await.unwrap();
        assert_eq!(store.version(), 1);
        assert_eq!(store.snapshot().await, 2);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = ConfigStore::new(String::from("thb"));
        let other = store.clone();
        other.update(String::from("usd")).await;
        assert_eq!(*store.read().await, "usd");
    }
}
