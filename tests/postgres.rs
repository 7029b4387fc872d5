//! Live round trip against a pgvector-enabled Postgres.
//!
//! ```bash
//! CODEVEC_TEST_DATABASE=1 DB_HOST=127.0.0.1 cargo test --test postgres -- --ignored
//! ```
//!
//! Uses dedicated table names and drops them afterwards.

use std::fs;
use tempfile::TempDir;

use codevec::config::load_config;
use codevec::db;
use codevec::embedding::HashingEmbedder;
use codevec::ingest::{index_directory, IndexOptions};
use codevec::records::postgres::PgRecordManager;
use codevec::records::RecordManager;
use codevec::schema::{self, TableName};
use codevec::search::search;
use codevec::store::postgres::PgVectorStore;
use codevec::store::VectorStore;

const DIMS: usize = 64;

#[tokio::test]
#[ignore]
async fn test_postgres_round_trip() {
    if std::env::var("CODEVEC_TEST_DATABASE").is_err() {
        eprintln!("CODEVEC_TEST_DATABASE not set; skipping");
        return;
    }

    let mut config = load_config(None).unwrap();
    config.embedding.dims = DIMS;
    let record_table = TableName::parse("codevec_test_records").unwrap();
    let vector_table = TableName::parse("codevec_test_vectors").unwrap();

    let pool = db::connect(&config.db).await.unwrap();
    schema::recreate_schema(&pool, &record_table, &vector_table, DIMS)
        .await
        .unwrap();
    assert_eq!(
        schema::vector_dimension(&pool, &vector_table).await.unwrap(),
        Some(DIMS)
    );
    // Idempotent on an existing schema.
    schema::ensure_schema(&pool, &record_table, &vector_table, DIMS)
        .await
        .unwrap();
    assert!(schema::ensure_schema(&pool, &record_table, &vector_table, DIMS + 1)
        .await
        .is_err());

    let records = PgRecordManager::new(pool.clone(), record_table.clone());
    let store = PgVectorStore::new(pool.clone(), vector_table.clone());
    let embedder = HashingEmbedder::new(DIMS);
    let options = IndexOptions::new("pg_test");

    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("hello.md"), "A B C").unwrap();
    fs::write(dir.path().join("other.js"), "console.log('other');").unwrap();

    let first = index_directory(&config, dir.path(), &records, &store, &embedder, &options)
        .await
        .unwrap();
    assert_eq!(first.num_added, 2);

    let second = index_directory(&config, dir.path(), &records, &store, &embedder, &options)
        .await
        .unwrap();
    assert_eq!(second.num_skipped, 2);
    assert_eq!(second.num_added, 0);

    let hits = search(&store, &embedder, "A B C", 1, None).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].content, "A B C");

    fs::remove_file(dir.path().join("other.js")).unwrap();
    let third = index_directory(&config, dir.path(), &records, &store, &embedder, &options)
        .await
        .unwrap();
    assert_eq!(third.num_deleted, 1);
    assert_eq!(records.list_keys("pg_test").await.unwrap().len(), 1);

    for table in [&record_table, &vector_table] {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
            .execute(&pool)
            .await
            .unwrap();
    }
    store.end().await;
}
