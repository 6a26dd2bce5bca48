//! Row-level locking
//!
//! Every mutable row (a tenant balance here, an inventory item in the sale
//! engine) is guarded by an in-process async mutex, the moral equivalent of
//! `SELECT ... FOR UPDATE`. A unit of work acquires every lock it needs up
//! front, holds them until its WriteBatch commits, and fails with a
//! retryable [`Error::LockTimeout`] if acquisition exceeds the configured
//! timeout.
//!
//! Multi-row acquisition sorts keys first; two units of work touching
//! overlapping row sets always lock in the same order, so lock-ordering
//! deadlocks cannot occur.

use crate::error::{Error, Result};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::{timeout, Duration};

/// Guard for one locked row; the row stays locked until this is dropped
pub type RowGuard = OwnedMutexGuard<()>;

/// Registry of per-row locks
pub struct RowLocks {
    locks: DashMap<Vec<u8>, Arc<Mutex<()>>>,
    acquire_timeout: Duration,
}

impl RowLocks {
    /// Create a registry with the given acquisition timeout
    pub fn new(acquire_timeout: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            acquire_timeout,
        }
    }

    /// Acquire the lock for one row key
    pub async fn acquire(&self, key: Vec<u8>) -> Result<RowGuard> {
        let lock = self
            .locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        timeout(self.acquire_timeout, lock.lock_owned())
            .await
            .map_err(|_| {
                Error::LockTimeout(format!(
                    "row lock not acquired within {:?}",
                    self.acquire_timeout
                ))
            })
    }

    /// Acquire locks for several rows in stable sorted order
    ///
    /// Keys are deduplicated; the returned guards are held until dropped.
    pub async fn acquire_many(&self, mut keys: Vec<Vec<u8>>) -> Result<Vec<RowGuard>> {
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            // Guards acquired so far are released on error, unwinding the
            // partial acquisition
            guards.push(self.acquire(key).await?);
        }

        Ok(guards)
    }

    /// Number of rows ever locked (registry size)
    pub fn tracked_rows(&self) -> usize {
        self.locks.len()
    }
}
