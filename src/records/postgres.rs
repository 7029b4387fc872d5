//! [`RecordManager`] over the Postgres record table.
//!
//! Timestamps come from the database clock so that concurrent readers and
//! writers on different hosts agree on ordering.

use std::collections::HashSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;

use super::{RecordManager, RecordUpdate};
use crate::schema::TableName;

pub struct PgRecordManager {
    pool: PgPool,
    table: TableName,
}

impl PgRecordManager {
    pub fn new(pool: PgPool, table: TableName) -> Self {
        Self { pool, table }
    }
}

#[async_trait]
impl RecordManager for PgRecordManager {
    async fn get_time(&self) -> Result<f64> {
        let now: f64 = sqlx::query_scalar("SELECT EXTRACT(EPOCH FROM clock_timestamp())::float8")
            .fetch_one(&self.pool)
            .await
            .context("failed to read database clock")?;
        Ok(now)
    }

    async fn exists(&self, namespace: &str, keys: &[String]) -> Result<Vec<bool>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let found: Vec<String> = sqlx::query_scalar(&format!(
            r#"SELECT "key" FROM {} WHERE namespace = $1 AND "key" = ANY($2)"#,
            self.table
        ))
        .bind(namespace)
        .bind(keys)
        .fetch_all(&self.pool)
        .await?;

        let found: HashSet<String> = found.into_iter().collect();
        Ok(keys.iter().map(|k| found.contains(k)).collect())
    }

    async fn update_records(
        &self,
        namespace: &str,
        records: &[RecordUpdate],
        timestamp: f64,
    ) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let keys: Vec<String> = records.iter().map(|r| r.key.clone()).collect();
        let groups: Vec<Option<String>> = records.iter().map(|r| r.group_id.clone()).collect();

        sqlx::query(&format!(
            r#"
            INSERT INTO {} ("key", namespace, updated_at, group_id)
            SELECT k, $1, $2, g FROM UNNEST($3::text[], $4::text[]) AS u(k, g)
            ON CONFLICT ("key", namespace) DO UPDATE SET
                updated_at = EXCLUDED.updated_at,
                group_id = EXCLUDED.group_id
            "#,
            self.table
        ))
        .bind(namespace)
        .bind(timestamp)
        .bind(keys)
        .bind(groups)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to update {} records", records.len()))?;

        Ok(())
    }

    async fn list_keys(&self, namespace: &str) -> Result<Vec<String>> {
        let keys = sqlx::query_scalar(&format!(
            r#"SELECT "key" FROM {} WHERE namespace = $1 ORDER BY "key""#,
            self.table
        ))
        .bind(namespace)
        .fetch_all(&self.pool)
        .await?;
        Ok(keys)
    }

    async fn list_keys_older_than(
        &self,
        namespace: &str,
        cutoff: f64,
        group_ids: Option<&[String]>,
    ) -> Result<Vec<String>> {
        let keys = sqlx::query_scalar(&format!(
            r#"
            SELECT "key" FROM {}
            WHERE namespace = $1
              AND updated_at < $2
              AND ($3::text[] IS NULL OR group_id = ANY($3))
            ORDER BY "key"
            "#,
            self.table
        ))
        .bind(namespace)
        .bind(cutoff)
        .bind(group_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(keys)
    }

    async fn delete_keys(&self, namespace: &str, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(&format!(
            r#"DELETE FROM {} WHERE namespace = $1 AND "key" = ANY($2)"#,
            self.table
        ))
        .bind(namespace)
        .bind(keys)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn end(&self) {
        self.pool.close().await;
    }
}
