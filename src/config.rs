//! Configuration for the indexing and query tools.
//!
//! A [`Config`] is assembled once per process from three layers, lowest
//! precedence first:
//!
//! 1. built-in defaults,
//! 2. an optional TOML file (`--config <path>`),
//! 3. environment variables (`DB_HOST`, `DB_PORT`, `VECTOR_TABLE`, …).
//!
//! The resulting value is immutable and passed by reference into every
//! component; nothing below this module reads the environment.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::schema::TableName;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub db: DbConfig,
    pub tables: TablesConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub loader: LoaderConfig,
    pub index: IndexConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            name: "langchain".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TablesConfig {
    pub vector: String,
    pub record: String,
}

impl Default for TablesConfig {
    fn default() -> Self {
        Self {
            vector: "code_vectors".to_string(),
            record: "code_records".to_string(),
        }
    }
}

impl TablesConfig {
    pub fn vector_table(&self) -> Result<TableName> {
        TableName::parse(&self.vector)
    }

    pub fn record_table(&self) -> Result<TableName> {
        TableName::parse(&self.record)
    }
}

/// Character-based chunking parameters.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 2000,
            chunk_overlap: 400,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `ollama`, `openai` or `hashing`.
    pub provider: String,
    pub model: String,
    pub dims: usize,
    /// Base URL of the embedding backend. Only used by `ollama`.
    pub url: String,
    pub batch_size: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
    /// OpenAI API key. Usually supplied through `OPENAI_API_KEY`.
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "nomic-embed-text".to_string(),
            dims: 768,
            url: "http://localhost:11434".to_string(),
            batch_size: 64,
            max_retries: 0,
            timeout_secs: 60,
            api_key: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoaderConfig {
    pub extensions: Vec<String>,
    pub exclude_globs: Vec<String>,
    pub follow_symlinks: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            extensions: [".ts", ".js", ".md", ".tsx", ".jsx", ".map"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            exclude_globs: vec!["**/.git/**".to_string(), "**/node_modules/**".to_string()],
            follow_symlinks: false,
        }
    }
}

/// What the indexer deletes once the new chunks are recorded.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CleanupMode {
    /// Delete every key in the namespace that this run did not touch.
    #[default]
    Incremental,
    /// Delete untouched keys only within sources seen by this run.
    Source,
    /// Never delete.
    None,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndexConfig {
    pub batch_size: usize,
    pub cleanup: CleanupMode,
    pub force_update: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            cleanup: CleanupMode::Incremental,
            force_update: false,
        }
    }
}

/// Load configuration from an optional TOML file and the process environment.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&content).with_context(|| "Failed to parse config file")?
        }
        None => Config::default(),
    };

    apply_env(&mut config, |key| std::env::var(key).ok())?;
    validate(&config)?;
    Ok(config)
}

/// Overlay environment variables onto `config`.
///
/// `lookup` returns the value of a variable, or `None` when unset.
pub fn apply_env<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("DB_HOST") {
        config.db.host = v;
    }
    if let Some(v) = lookup("DB_PORT") {
        config.db.port = v
            .parse()
            .with_context(|| format!("DB_PORT must be a port number, got '{}'", v))?;
    }
    if let Some(v) = lookup("DB_USER") {
        config.db.user = v;
    }
    if let Some(v) = lookup("DB_PASSWORD") {
        config.db.password = v;
    }
    if let Some(v) = lookup("DB_NAME") {
        config.db.name = v;
    }
    if let Some(v) = lookup("VECTOR_TABLE") {
        config.tables.vector = v;
    }
    if let Some(v) = lookup("RECORD_TABLE") {
        config.tables.record = v;
    }
    if let Some(v) = lookup("EMBEDDING_PROVIDER") {
        config.embedding.provider = v;
    }
    if let Some(v) = lookup("EMBEDDING_MODEL") {
        config.embedding.model = v;
    }
    if let Some(v) = lookup("EMBEDDING_DIMS") {
        config.embedding.dims = v
            .parse()
            .with_context(|| format!("EMBEDDING_DIMS must be an integer, got '{}'", v))?;
    }
    if let Some(v) = lookup("EMBEDDING_URL") {
        config.embedding.url = v;
    }
    if let Some(v) = lookup("OPENAI_API_KEY") {
        config.embedding.api_key = Some(v);
    }
    Ok(())
}

pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }

    if config.embedding.dims == 0 {
        bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    if config.index.batch_size == 0 {
        bail!("index.batch_size must be > 0");
    }

    match config.embedding.provider.as_str() {
        "ollama" | "openai" | "hashing" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be ollama, openai, or hashing.",
            other
        ),
    }

    config
        .tables
        .vector_table()
        .context("invalid vector table name")?;
    config
        .tables
        .record_table()
        .context("invalid record table name")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_match_reference_setup() {
        let cfg = Config::default();
        assert_eq!(cfg.db.host, "127.0.0.1");
        assert_eq!(cfg.db.port, 5432);
        assert_eq!(cfg.db.name, "langchain");
        assert_eq!(cfg.tables.vector, "code_vectors");
        assert_eq!(cfg.tables.record, "code_records");
        assert_eq!(cfg.chunking.chunk_size, 2000);
        assert_eq!(cfg.chunking.chunk_overlap, 400);
        assert_eq!(cfg.embedding.model, "nomic-embed-text");
        assert_eq!(cfg.embedding.dims, 768);
        assert_eq!(cfg.index.cleanup, CleanupMode::Incremental);
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let vars = env(&[
            ("DB_HOST", "db.internal"),
            ("DB_PORT", "6543"),
            ("DB_NAME", "vectors"),
            ("VECTOR_TABLE", "docs_vectors"),
            ("RECORD_TABLE", "docs_records"),
        ]);
        let mut cfg = Config::default();
        apply_env(&mut cfg, |k| vars.get(k).cloned()).unwrap();

        assert_eq!(cfg.db.host, "db.internal");
        assert_eq!(cfg.db.port, 6543);
        assert_eq!(cfg.db.name, "vectors");
        assert_eq!(cfg.db.user, "postgres");
        assert_eq!(cfg.tables.vector, "docs_vectors");
        assert_eq!(cfg.tables.record, "docs_records");
    }

    #[test]
    fn test_bad_port_names_variable() {
        let vars = env(&[("DB_PORT", "abc")]);
        let mut cfg = Config::default();
        let err = apply_env(&mut cfg, |k| vars.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("DB_PORT"));
    }

    #[test]
    fn test_partial_toml() {
        let cfg: Config = toml::from_str(
            r#"
            [chunking]
            chunk_size = 500
            chunk_overlap = 50

            [index]
            cleanup = "source"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.chunking.chunk_size, 500);
        assert_eq!(cfg.chunking.chunk_overlap, 50);
        assert_eq!(cfg.index.cleanup, CleanupMode::Source);
        assert_eq!(cfg.db.port, 5432);
        assert_eq!(cfg.embedding.provider, "ollama");
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let mut cfg = Config::default();
        cfg.chunking.chunk_overlap = cfg.chunking.chunk_size;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let mut cfg = Config::default();
        cfg.embedding.provider = "word2vec".to_string();
        let err = validate(&cfg).unwrap_err();
        assert!(err.to_string().contains("word2vec"));
    }

    #[test]
    fn test_table_name_injection_rejected() {
        let mut cfg = Config::default();
        cfg.tables.vector = "code_vectors; DROP TABLE users".to_string();
        assert!(validate(&cfg).is_err());
    }
}
