//! Named async locks
//!
//! Zone operations serialize on string keys rather than on objects:
//! `zone-status:{id}` guards the check-and-transition out of `available`,
//! `zone:{id}` guards record-set sync, cache registration and VPC list
//! updates, `record:{id}` guards traffic-policy replacement on one record,
//! and `policy:{provider}` guards policy dedup for one provider.
//!
//! Callers wait for the lock; there is no try-lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;

/// Held named lock; released on drop
pub type NamedLockGuard = OwnedMutexGuard<()>;

/// Lock key for zone status transitions
pub fn status_key(zone_id: &str) -> String {
    format!("zone-status:{}", zone_id)
}

pub fn zone_key(zone_id: &str) -> String {
    format!("zone:{}", zone_id)
}

/// Lock key for per-record policy updates
pub fn record_key(record_id: &str) -> String {
    format!("record:{}", record_id)
}

/// Lock key for policy dedup on one provider
pub fn policy_key(provider: &str) -> String {
    format!("policy:{}", provider)
}

/// Table of named async mutexes
#[derive(Debug, Default)]
pub struct LockManager {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock named `key`, waiting until it is free
    pub async fn lock(&self, key: &str) -> NamedLockGuard {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // drop entries nobody holds or waits on
            locks.retain(|name, m| name == key || Arc::strong_count(m) > 1);
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        tracing::trace!("Waiting for lock {}", key);
        mutex.lock_owned().await
    }

    /// Number of lock entries currently tracked
    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
