//! Schema management for the record and vector tables.
//!
//! [`recreate_schema`] drops and recreates both tables (destructive, used by
//! `codevec-schema`); [`ensure_schema`] only creates what is missing and is
//! run before every indexing pass.
//!
//! Table names come from configuration and are interpolated into DDL, so
//! they are validated as plain identifiers by [`TableName::parse`].

use anyhow::{Context, Result};
use sqlx::{PgPool, Postgres, Transaction};
use std::fmt;

use crate::config::Config;
use crate::db;
use crate::error::IndexError;

/// A validated `[schema.]table` identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    schema: Option<String>,
    table: String,
}

impl TableName {
    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split('.').collect();
        let (schema, table) = match parts.as_slice() {
            [table] => (None, *table),
            [schema, table] => (Some(*schema), *table),
            _ => return Err(IndexError::InvalidTableName(raw.to_string()).into()),
        };

        if !is_identifier(table) || !schema.map_or(true, is_identifier) {
            return Err(IndexError::InvalidTableName(raw.to_string()).into());
        }

        Ok(Self {
            schema: schema.map(str::to_string),
            table: table.to_string(),
        })
    }

    /// Bare table name, used to derive index names.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Name of a table-specific index, e.g. `code_vectors_vector_idx`.
    fn index_name(&self, suffix: &str) -> String {
        format!("{}_{}", self.table, suffix)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.table),
            None => write!(f, "{}", self.table),
        }
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_') && s.len() <= 63
}

fn record_table_ddl(table: &TableName) -> Vec<String> {
    vec![
        r#"CREATE EXTENSION IF NOT EXISTS "pgcrypto""#.to_string(),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                uuid UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                "key" TEXT NOT NULL,
                namespace TEXT NOT NULL,
                updated_at DOUBLE PRECISION NOT NULL,
                group_id TEXT,
                UNIQUE ("key", namespace)
            )
            "#
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} (updated_at)",
            table.index_name("updated_at_idx"),
            table
        ),
        format!(
            r#"CREATE INDEX IF NOT EXISTS {} ON {} ("key")"#,
            table.index_name("key_idx"),
            table
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} (namespace)",
            table.index_name("namespace_idx"),
            table
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} (group_id)",
            table.index_name("group_id_idx"),
            table
        ),
    ]
}

fn vector_table_ddl(table: &TableName, dims: usize) -> Vec<String> {
    vec![
        "CREATE EXTENSION IF NOT EXISTS vector".to_string(),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                content TEXT NOT NULL,
                metadata JSONB,
                vector VECTOR({dims})
            )
            "#
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} USING hnsw (vector vector_l2_ops)",
            table.index_name("vector_idx"),
            table
        ),
    ]
}

async fn execute_all(tx: &mut Transaction<'_, Postgres>, statements: &[String]) -> Result<()> {
    for sql in statements {
        sqlx::query(sql)
            .execute(&mut **tx)
            .await
            .with_context(|| format!("failed to execute: {}", sql.trim()))?;
    }
    Ok(())
}

/// Drop both tables and create them again. All indexed data is lost.
pub async fn recreate_schema(
    pool: &PgPool,
    record_table: &TableName,
    vector_table: &TableName,
    dims: usize,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    tracing::info!(%record_table, %vector_table, "dropping existing tables");
    execute_all(
        &mut tx,
        &[
            format!("DROP TABLE IF EXISTS {}", record_table),
            format!("DROP TABLE IF EXISTS {}", vector_table),
        ],
    )
    .await?;

    tracing::info!(%record_table, "creating record table");
    execute_all(&mut tx, &record_table_ddl(record_table)).await?;

    tracing::info!(%vector_table, dims, "creating vector table");
    execute_all(&mut tx, &vector_table_ddl(vector_table, dims)).await?;

    tx.commit().await?;
    Ok(())
}

/// Entry point of `codevec-schema`.
pub async fn run_recreate(config: &Config) -> Result<()> {
    let record_table = config.tables.record_table()?;
    let vector_table = config.tables.vector_table()?;

    let pool = db::connect(&config.db).await?;
    let result = recreate_schema(&pool, &record_table, &vector_table, config.embedding.dims).await;
    pool.close().await;
    result?;

    println!("Schema recreated: {} and {}", record_table, vector_table);
    Ok(())
}

/// Create the extensions, tables and indexes that do not exist yet, then
/// check that an existing vector column has the configured width.
pub async fn ensure_schema(
    pool: &PgPool,
    record_table: &TableName,
    vector_table: &TableName,
    dims: usize,
) -> Result<()> {
    let mut tx = pool.begin().await?;
    execute_all(&mut tx, &record_table_ddl(record_table)).await?;
    execute_all(&mut tx, &vector_table_ddl(vector_table, dims)).await?;
    tx.commit().await?;

    if let Some(actual) = vector_dimension(pool, vector_table).await? {
        if actual != dims {
            return Err(IndexError::DimensionMismatch {
                expected: dims,
                actual,
            }
            .into());
        }
    }
    Ok(())
}

/// Declared width of the `vector` column, if the table exists.
pub async fn vector_dimension(pool: &PgPool, vector_table: &TableName) -> Result<Option<usize>> {
    // pgvector stores the dimension in atttypmod.
    let typmod: Option<i32> = sqlx::query_scalar(
        r#"
        SELECT a.atttypmod
        FROM pg_attribute a
        WHERE a.attrelid = to_regclass($1)
          AND a.attname = 'vector'
          AND NOT a.attisdropped
        "#,
    )
    .bind(vector_table.to_string())
    .fetch_optional(pool)
    .await?;

    Ok(typmod.filter(|m| *m > 0).map(|m| m as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_and_qualified() {
        let t = TableName::parse("code_vectors").unwrap();
        assert_eq!(t.to_string(), "code_vectors");
        assert_eq!(t.table(), "code_vectors");

        let q = TableName::parse("rag.code_vectors").unwrap();
        assert_eq!(q.to_string(), "rag.code_vectors");
        assert_eq!(q.table(), "code_vectors");
    }

    #[test]
    fn test_parse_rejects_unsafe_names() {
        for bad in [
            "",
            "1table",
            "code-vectors",
            "a.b.c",
            "vectors; DROP TABLE x",
            "\"quoted\"",
            ".vectors",
        ] {
            let err = TableName::parse(bad).unwrap_err();
            assert!(
                matches!(
                    err.downcast_ref::<IndexError>(),
                    Some(IndexError::InvalidTableName(_))
                ),
                "expected rejection for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_vector_ddl_uses_configured_names_and_dims() {
        let table = TableName::parse("docs").unwrap();
        let ddl = vector_table_ddl(&table, 384).join("\n");
        assert!(ddl.contains("CREATE TABLE IF NOT EXISTS docs"));
        assert!(ddl.contains("VECTOR(384)"));
        assert!(ddl.contains("docs_vector_idx ON docs USING hnsw (vector vector_l2_ops)"));
    }

    #[test]
    fn test_record_ddl_has_unique_key_namespace() {
        let table = TableName::parse("records").unwrap();
        let ddl = record_table_ddl(&table).join("\n");
        assert!(ddl.contains(r#"UNIQUE ("key", namespace)"#));
        assert!(ddl.contains("records_namespace_idx"));
    }
}
