//! [`VectorStore`] over a pgvector table.
//!
//! Rows live in `{table}(id UUID, content TEXT, metadata JSONB, vector VECTOR(n))`
//! as created by [`crate::schema`]. Search orders by the `<->` (L2) operator
//! so the HNSW index on `vector` can serve it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use pgvector::Vector;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::VectorStore;
use crate::models::{SearchHit, VectorRow};
use crate::schema::TableName;

pub struct PgVectorStore {
    pool: PgPool,
    table: TableName,
}

impl PgVectorStore {
    pub fn new(pool: PgPool, table: TableName) -> Self {
        Self { pool, table }
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn upsert(&self, rows: &[VectorRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let sql = format!(
            r#"
            INSERT INTO {} (id, content, metadata, vector)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                content = EXCLUDED.content,
                metadata = EXCLUDED.metadata,
                vector = EXCLUDED.vector
            "#,
            self.table
        );

        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(&sql)
                .bind(row.id)
                .bind(&row.content)
                .bind(Json(&row.metadata))
                .bind(Vector::from(row.vector.clone()))
                .execute(&mut *tx)
                .await
                .with_context(|| format!("failed to upsert vector row {}", row.id))?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn delete_by_ids(&self, ids: &[Uuid]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ANY($1)", self.table))
            .bind(ids)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn similarity_search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&Value>,
    ) -> Result<Vec<SearchHit>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        // The inner ORDER BY is what the HNSW index can serve; the outer one
        // makes ties deterministic.
        let sql = format!(
            r#"
            SELECT id, content, metadata, distance FROM (
                SELECT id, content, metadata, (vector <-> $1)::float8 AS distance
                FROM {}
                WHERE $3::jsonb IS NULL OR metadata @> $3::jsonb
                ORDER BY vector <-> $1
                LIMIT $2
            ) nearest
            ORDER BY distance, id
            "#,
            self.table
        );

        let rows = sqlx::query(&sql)
            .bind(Vector::from(query.to_vec()))
            .bind(top_k as i64)
            .bind(filter.map(Json))
            .fetch_all(&self.pool)
            .await
            .context("similarity search failed")?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            let metadata: Option<Json<Value>> = row.try_get("metadata")?;
            hits.push(SearchHit {
                id: row.try_get("id")?,
                content: row.try_get("content")?,
                metadata: metadata.map(|m| m.0).unwrap_or(Value::Null),
                distance: row.try_get("distance")?,
            });
        }
        Ok(hits)
    }

    async fn end(&self) {
        self.pool.close().await;
    }
}
