//! Record manager: bookkeeping of which sync keys have been indexed.
//!
//! One entry per `(key, namespace)` holds the time the key was last seen and
//! an optional group id (the chunk's source path). The indexer compares
//! entries against the start time of a run to find what it did not touch.
//!
//! Timestamps are seconds since the Unix epoch as `f64`, taken from the
//! manager's own clock via [`RecordManager::get_time`] so every writer in a
//! namespace shares one time source.

pub mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;

/// A key to record, with the group it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordUpdate {
    pub key: String,
    pub group_id: Option<String>,
}

#[async_trait]
pub trait RecordManager: Send + Sync {
    /// Current time according to the record store.
    async fn get_time(&self) -> Result<f64>;

    /// For each key, whether it is recorded in `namespace`.
    async fn exists(&self, namespace: &str, keys: &[String]) -> Result<Vec<bool>>;

    /// Insert or refresh entries, setting `updated_at = timestamp`.
    async fn update_records(
        &self,
        namespace: &str,
        records: &[RecordUpdate],
        timestamp: f64,
    ) -> Result<()>;

    /// All keys in `namespace`, sorted.
    async fn list_keys(&self, namespace: &str) -> Result<Vec<String>>;

    /// Keys in `namespace` last updated strictly before `cutoff`, sorted.
    ///
    /// With `group_ids`, only entries whose group is listed are returned.
    async fn list_keys_older_than(
        &self,
        namespace: &str,
        cutoff: f64,
        group_ids: Option<&[String]>,
    ) -> Result<Vec<String>>;

    /// Remove entries, returning how many existed.
    async fn delete_keys(&self, namespace: &str, keys: &[String]) -> Result<u64>;

    /// Release underlying connections.
    async fn end(&self) {}
}
