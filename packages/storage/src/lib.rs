#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Durable key-value storage for clean592 reports.
//!
//! The sync engine never talks to a concrete backend. It goes through the
//! [`ReportStore`] trait, which stores JSON strings under string keys. Two
//! keys are used:
//!
//! * [`PENDING_REPORTS`]: reports created offline, in submission order
//! * [`HISTORY_REPORTS`]: acknowledged reports, most recent first
//!
//! [`load_reports`] and [`save_reports`] wrap a store with JSON
//! (de)serialization and a single retry on failure.

pub mod file;
pub mod memory;
pub mod paths;

use std::future::Future;

use async_trait::async_trait;
use clean592_report_models::Report;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Storage key of the pending (unsynced) queue.
pub const PENDING_REPORTS: &str = "pending_reports";

/// Storage key of the committed history.
pub const HISTORY_REPORTS: &str = "history_reports";

/// Errors that can occur while reading or writing durable storage.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error (file read/write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored value is not valid report JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Key contains characters the backend cannot store.
    #[error("Invalid storage key: {key}")]
    InvalidKey {
        /// The offending key.
        key: String,
    },

    /// Backend-specific failure.
    #[error("Storage backend error: {message}")]
    Backend {
        /// Description of what went wrong.
        message: String,
    },
}

/// String-keyed, JSON-valued durable storage.
///
/// Implementations must be `Send + Sync` so a store can be shared with
/// background sync tasks.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Reads the value stored under `key`, or `None` if nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be read.
    async fn load(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be written.
    async fn save(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Deletes the value stored under `key`. Removing a missing key is not
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be written.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Loads a report collection, treating a missing key as empty.
///
/// A failed read is retried once before the error is returned.
///
/// # Errors
///
/// Returns [`StorageError`] if the read fails twice or the stored value is
/// not a valid report list.
pub async fn load_reports(store: &dyn ReportStore, key: &str) -> Result<Vec<Report>, StorageError> {
    let raw = retry_once("load", key, || store.load(key)).await?;

    match raw {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Ok(Vec::new()),
    }
}

/// Persists a report collection.
///
/// An empty collection removes the key so a cleared queue leaves nothing
/// behind. A failed write is retried once before the error is returned.
///
/// # Errors
///
/// Returns [`StorageError`] if serialization fails or the write fails
/// twice.
pub async fn save_reports(
    store: &dyn ReportStore,
    key: &str,
    reports: &[Report],
) -> Result<(), StorageError> {
    if reports.is_empty() {
        return retry_once("remove", key, || store.remove(key)).await;
    }

    let json = serde_json::to_string(reports)?;
    retry_once("save", key, || store.save(key, &json)).await
}

async fn retry_once<T, F, Fut>(op: &str, key: &str, attempt: F) -> Result<T, StorageError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    match attempt().await {
        Ok(value) => Ok(value),
        Err(e) => {
            log::warn!("storage {op} of '{key}' failed, retrying once: {e}");
            attempt().await
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use clean592_report_models::{ReportDraft, ReportType};
    use uuid::Uuid;

    use super::*;

    fn report(id: i64, address: &str) -> Report {
        Report::from_draft(
            ReportDraft::new(ReportType::Littering).with_address(address),
            id,
            Uuid::new_v4(),
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn missing_key_loads_as_empty() {
        let store = MemoryStore::new();
        let reports = load_reports(&store, PENDING_REPORTS).await.unwrap();
        assert!(reports.is_empty());
    }

    #[tokio::test]
    async fn saved_collection_reloads_equal() {
        let store = MemoryStore::new();
        let reports = vec![report(1, "Camp St"), report(2, "Church St")];

        save_reports(&store, HISTORY_REPORTS, &reports).await.unwrap();
        let loaded = load_reports(&store, HISTORY_REPORTS).await.unwrap();

        assert_eq!(loaded, reports);
    }

    #[tokio::test]
    async fn saving_empty_collection_removes_key() {
        let store = MemoryStore::new();
        save_reports(&store, PENDING_REPORTS, &[report(1, "Camp St")])
            .await
            .unwrap();
        save_reports(&store, PENDING_REPORTS, &[]).await.unwrap();

        assert_eq!(store.get(PENDING_REPORTS), None);
    }

    #[tokio::test]
    async fn single_failure_is_retried() {
        let store = MemoryStore::new();
        store.fail_next_writes(1);

        save_reports(&store, HISTORY_REPORTS, &[report(1, "Camp St")])
            .await
            .unwrap();

        assert!(store.get(HISTORY_REPORTS).is_some());
    }

    #[tokio::test]
    async fn second_failure_is_returned() {
        let store = MemoryStore::new();
        store.fail_next_writes(2);

        let result = save_reports(&store, HISTORY_REPORTS, &[report(1, "Camp St")]).await;

        assert!(matches!(result, Err(StorageError::Backend { .. })));
        assert_eq!(store.get(HISTORY_REPORTS), None);
    }

    #[tokio::test]
    async fn single_read_failure_is_retried() {
        let store = MemoryStore::new();
        save_reports(&store, PENDING_REPORTS, &[report(1, "Camp St")])
            .await
            .unwrap();
        store.fail_next_reads(1);

        let loaded = load_reports(&store, PENDING_REPORTS).await.unwrap();

        assert_eq!(loaded.len(), 1);
    }

    #[tokio::test]
    async fn corrupt_value_is_a_json_error() {
        let store = MemoryStore::new();
        store.insert(HISTORY_REPORTS, "{not json");

        let result = load_reports(&store, HISTORY_REPORTS).await;

        assert!(matches!(result, Err(StorageError::Json(_))));
    }
}
