//! Similarity search over the vector table.
//!
//! [`search`] embeds the query with the same backend used at index time and
//! returns the `top_k` nearest rows by L2 distance, optionally restricted to
//! rows whose metadata contains a JSON filter. [`run_search`] is the
//! `codevec-query` entry point and handles connection and presentation.

use anyhow::{bail, Result};
use serde_json::{json, Value};

use crate::config::Config;
use crate::db;
use crate::embedding::{create_embedder, Embedder};
use crate::error::IndexError;
use crate::models::SearchHit;
use crate::schema;
use crate::store::postgres::PgVectorStore;
use crate::store::VectorStore;

/// Results printed when no count is given on the command line.
pub const DEFAULT_TOP_K: usize = 3;

const PREVIEW_CHARS: usize = 200;

/// Embed `query` and return the `top_k` nearest rows, nearest first.
pub async fn search(
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    query: &str,
    top_k: usize,
    filter: Option<&Value>,
) -> Result<Vec<SearchHit>> {
    let query = query.trim();
    if query.is_empty() {
        bail!("Search query must not be empty");
    }

    let vector = embedder.embed_query(query).await?;
    if vector.len() != embedder.dims() {
        return Err(IndexError::DimensionMismatch {
            expected: embedder.dims(),
            actual: vector.len(),
        }
        .into());
    }

    store.similarity_search(&vector, top_k, filter).await
}

/// Metadata filter matching rows from one source path.
pub fn source_filter(source: Option<&str>) -> Option<Value> {
    source.map(|s| json!({ "source": s }))
}

fn preview(content: &str) -> String {
    match content.char_indices().nth(PREVIEW_CHARS) {
        Some((end, _)) => format!("{}...", &content[..end]),
        None => content.to_string(),
    }
}

/// Human-readable rendering of `hits`, one block per hit.
pub fn format_hits(hits: &[SearchHit]) -> String {
    let mut out = format!("Found {} results:\n\n", hits.len());
    for (i, hit) in hits.iter().enumerate() {
        out.push_str(&format!("Result {}:\n", i + 1));
        out.push_str(&format!("Source: {}\n", hit.source().unwrap_or("(unknown)")));
        out.push_str(&format!("Distance: {:.4}\n", hit.distance));
        out.push_str(&format!("Content (preview): {}\n", preview(&hit.content)));
        out.push_str(&"-".repeat(80));
        out.push('\n');
    }
    out
}

/// Entry point of `codevec-query`.
pub async fn run_search(
    config: &Config,
    query: &str,
    top_k: usize,
    source: Option<&str>,
    json_output: bool,
) -> Result<()> {
    let vector_table = config.tables.vector_table()?;
    let embedder = create_embedder(&config.embedding)?;
    let filter = source_filter(source);

    tracing::info!(query, top_k, model = embedder.model_name(), "searching");

    let pool = db::connect(&config.db).await?;
    let store = PgVectorStore::new(pool.clone(), vector_table.clone());

    let result: Result<Vec<SearchHit>> = async {
        match schema::vector_dimension(&pool, &vector_table).await? {
            None => bail!(
                "Vector table {} does not exist; run codevec-schema or codevec-index first",
                vector_table
            ),
            Some(actual) if actual != config.embedding.dims => {
                return Err(IndexError::DimensionMismatch {
                    expected: config.embedding.dims,
                    actual,
                }
                .into())
            }
            Some(_) => {}
        }
        search(&store, embedder.as_ref(), query, top_k, filter.as_ref()).await
    }
    .await;

    store.end().await;
    let hits = result?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&hits)?);
    } else if hits.is_empty() {
        println!("No results.");
    } else {
        print!("{}", format_hits(&hits));
    }

    Ok(())
}
