//! Fatal indexing errors.
//!
//! Everything else travels as `anyhow::Error`; these variants exist so that
//! callers can tell a misconfigured pipeline apart from a transient I/O
//! failure with `err.downcast_ref::<IndexError>()`.

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The embedder or the vector column produced a different width than configured.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The backend returned a different number of vectors than texts sent.
    #[error("embedding backend returned {actual} vectors for {expected} texts")]
    EmbeddingCountMismatch { expected: usize, actual: usize },

    /// Incremental indexing needs `metadata.source` on every chunk.
    #[error("chunk {index} has no 'source' metadata; incremental indexing needs one")]
    MissingSource { index: usize },

    #[error("record manager clock went backwards: now {now} is before run start {run_start}")]
    ClockSkew { now: f64, run_start: f64 },

    #[error("invalid table name '{0}': expected [schema.]identifier")]
    InvalidTableName(String),
}
