//! In-process [`ReportStore`] backed by a `BTreeMap`.
//!
//! Used by tests and by embedders that persist state themselves. Reads and
//! writes can be made to fail on demand with [`MemoryStore::fail_next_reads`]
//! and [`MemoryStore::fail_next_writes`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::{ReportStore, StorageError};

/// A [`ReportStore`] that keeps every value in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
    failing_reads: AtomicU32,
    failing_writes: AtomicU32,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` calls to `load` fail with
    /// [`StorageError::Backend`].
    pub fn fail_next_reads(&self, count: u32) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` calls to `save` or `remove` fail with
    /// [`StorageError::Backend`].
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Returns a copy of the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.values().get(key).cloned()
    }

    /// Stores a raw value without going through the failure injection.
    pub fn insert(&self, key: &str, value: &str) {
        self.values().insert(key.to_string(), value.to_string());
    }

    fn values(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(counter: &AtomicU32, op: &str, key: &str) -> Result<(), StorageError> {
        let injected = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        if injected {
            return Err(StorageError::Backend {
                message: format!("injected {op} failure for '{key}'"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        Self::check(&self.failing_reads, "read", key)?;
        Ok(self.get(key))
    }

    async fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        Self::check(&self.failing_writes, "write", key)?;
        self.insert(key, value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        Self::check(&self.failing_writes, "write", key)?;
        self.values().remove(key);
        Ok(())
    }
}
