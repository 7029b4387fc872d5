//! In-memory [`RecordManager`] for tests and offline runs.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, RwLock};

use anyhow::Result;
use async_trait::async_trait;

use super::{RecordManager, RecordUpdate};

#[derive(Debug, Clone)]
struct Entry {
    updated_at: f64,
    group_id: Option<String>,
}

pub struct InMemoryRecordManager {
    /// `(namespace, key)` → entry.
    entries: RwLock<BTreeMap<(String, String), Entry>>,
    last_time: Mutex<f64>,
}

impl InMemoryRecordManager {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            last_time: Mutex::new(0.0),
        }
    }

    /// Group id recorded for `key`, if any.
    pub fn group_of(&self, namespace: &str, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap()
            .get(&(namespace.to_string(), key.to_string()))
            .and_then(|e| e.group_id.clone())
    }
}

impl Default for InMemoryRecordManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordManager for InMemoryRecordManager {
    /// Wall-clock time, nudged forward so successive calls strictly increase.
    async fn get_time(&self) -> Result<f64> {
        let mut last = self.last_time.lock().unwrap();
        let mut now = chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0;
        if now <= *last {
            now = *last + 0.001;
        }
        *last = now;
        Ok(now)
    }

    async fn exists(&self, namespace: &str, keys: &[String]) -> Result<Vec<bool>> {
        let entries = self.entries.read().unwrap();
        Ok(keys
            .iter()
            .map(|k| entries.contains_key(&(namespace.to_string(), k.clone())))
            .collect())
    }

    async fn update_records(
        &self,
        namespace: &str,
        records: &[RecordUpdate],
        timestamp: f64,
    ) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        for record in records {
            entries.insert(
                (namespace.to_string(), record.key.clone()),
                Entry {
                    updated_at: timestamp,
                    group_id: record.group_id.clone(),
                },
            );
        }
        Ok(())
    }

    async fn list_keys(&self, namespace: &str) -> Result<Vec<String>> {
        let entries = self.entries.read().unwrap();
        Ok(entries
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, key)| key.clone())
            .collect())
    }

    async fn list_keys_older_than(
        &self,
        namespace: &str,
        cutoff: f64,
        group_ids: Option<&[String]>,
    ) -> Result<Vec<String>> {
        let groups: Option<HashSet<&str>> =
            group_ids.map(|ids| ids.iter().map(String::as_str).collect());
        let entries = self.entries.read().unwrap();
        Ok(entries
            .iter()
            .filter(|((ns, _), entry)| ns == namespace && entry.updated_at < cutoff)
            .filter(|(_, entry)| match &groups {
                Some(groups) => entry
                    .group_id
                    .as_deref()
                    .is_some_and(|g| groups.contains(g)),
                None => true,
            })
            .map(|((_, key), _)| key.clone())
            .collect())
    }

    async fn delete_keys(&self, namespace: &str, keys: &[String]) -> Result<u64> {
        let mut entries = self.entries.write().unwrap();
        Ok(keys
            .iter()
            .filter(|k| entries.remove(&(namespace.to_string(), (*k).clone())).is_some())
            .count() as u64)
    }
}
