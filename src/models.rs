//! Core data models used throughout codevec.
//!
//! These types represent the documents, chunks, stored rows and search hits
//! that flow through the indexing and retrieval pipeline.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A loaded file: its full text and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub content: String,
    pub source: String,
}

/// A bounded slice of a [`Document`]'s content.
///
/// `metadata` always carries `source`; the chunker adds `loc.lines`.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub content: String,
    pub metadata: Value,
}

impl Chunk {
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(Value::as_str)
    }

    /// Stable sync key derived from the chunk's content and metadata.
    ///
    /// Identical chunks always produce the same key. The vector row id is
    /// derived from it per namespace by [`row_id`].
    pub fn sync_key(&self) -> Uuid {
        let content_hash = sha256_hex(self.content.as_bytes());
        // serde_json maps are ordered by key, so this is canonical.
        let metadata_hash = sha256_hex(self.metadata.to_string().as_bytes());
        let combined = format!("{}{}", content_hash, metadata_hash);
        Uuid::new_v5(&Uuid::NAMESPACE_URL, combined.as_bytes())
    }
}

/// Vector row id of sync key `key` within `namespace`.
///
/// Namespaces share the vector table, so the same chunk indexed into two
/// namespaces must land in two rows.
pub fn row_id(namespace: &str, key: &Uuid) -> Uuid {
    let scope = Uuid::new_v5(&Uuid::NAMESPACE_URL, namespace.as_bytes());
    Uuid::new_v5(&scope, key.as_bytes())
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// One persisted row of the vector table.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRow {
    pub id: Uuid,
    pub content: String,
    pub metadata: Value,
    pub vector: Vec<f32>,
}

/// A row returned by similarity search, nearest first.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: Uuid,
    pub content: String,
    pub metadata: Value,
    /// L2 distance between the query vector and the stored vector.
    pub distance: f64,
}

impl SearchHit {
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(Value::as_str)
    }
}

/// Counters reported by one indexing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexSummary {
    pub num_added: u64,
    pub num_updated: u64,
    pub num_skipped: u64,
    pub num_deleted: u64,
}
