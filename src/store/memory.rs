//! In-memory [`VectorStore`] for tests and offline runs.
//!
//! Rows are kept in a `BTreeMap` keyed by id behind `std::sync::RwLock`.
//! Search is exact brute-force L2, so results match what the HNSW index
//! would return at full recall.

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use super::{json_contains, VectorStore};
use crate::models::{SearchHit, VectorRow};

pub struct InMemoryVectorStore {
    rows: RwLock<BTreeMap<Uuid, VectorRow>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all stored rows, ordered by id.
    pub fn rows(&self) -> Vec<VectorRow> {
        self.rows.read().unwrap().values().cloned().collect()
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

fn l2_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = (*x as f64) - (*y as f64);
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, rows: &[VectorRow]) -> Result<()> {
        let mut stored = self.rows.write().unwrap();
        for row in rows {
            stored.insert(row.id, row.clone());
        }
        Ok(())
    }

    async fn delete_by_ids(&self, ids: &[Uuid]) -> Result<u64> {
        let mut stored = self.rows.write().unwrap();
        Ok(ids.iter().filter(|id| stored.remove(*id).is_some()).count() as u64)
    }

    async fn similarity_search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&Value>,
    ) -> Result<Vec<SearchHit>> {
        let stored = self.rows.read().unwrap();
        let mut hits: Vec<SearchHit> = stored
            .values()
            .filter(|row| filter.map_or(true, |f| json_contains(&row.metadata, f)))
            .map(|row| SearchHit {
                id: row.id,
                content: row.content.clone(),
                metadata: row.metadata.clone(),
                distance: l2_distance(query, &row.vector),
            })
            .collect();

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
        hits.truncate(top_k);
        Ok(hits)
    }
}
