//! Vector storage abstraction.
//!
//! The [`VectorStore`] trait covers what the indexer and the query tool need
//! from the vector table: upsert rows, delete rows by id, and nearest-neighbour
//! search by L2 distance.
//!
//! | Implementation | Backend |
//! |----------------|---------|
//! | [`postgres::PgVectorStore`] | PostgreSQL + pgvector, HNSW index |
//! | [`memory::InMemoryVectorStore`] | exact brute-force search, for tests |

pub mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::models::{SearchHit, VectorRow};

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert rows, replacing any existing row with the same id.
    async fn upsert(&self, rows: &[VectorRow]) -> Result<()>;

    /// Delete rows by id, returning how many existed.
    async fn delete_by_ids(&self, ids: &[Uuid]) -> Result<u64>;

    /// Return at most `top_k` rows ordered by ascending L2 distance to
    /// `query`. Ties are broken by row id.
    ///
    /// `filter`, when given, is a JSON object the row metadata must contain.
    async fn similarity_search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&Value>,
    ) -> Result<Vec<SearchHit>>;

    /// Release underlying connections.
    async fn end(&self) {}
}

/// JSON containment with the semantics of Postgres `jsonb @>`.
pub(crate) fn json_contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::Object(h), Value::Object(n)) => n
            .iter()
            .all(|(k, nv)| h.get(k).is_some_and(|hv| json_contains(hv, nv))),
        (Value::Array(h), Value::Array(n)) => n
            .iter()
            .all(|nv| h.iter().any(|hv| json_contains(hv, nv))),
        (Value::Array(h), scalar) if !scalar.is_object() => h.iter().any(|hv| hv == scalar),
        (h, n) => h == n,
    }
}
