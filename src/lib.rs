//! # codevec
//!
//! Incremental indexing of source code and documentation into PostgreSQL +
//! pgvector, with similarity search on top.
//!
//! A directory is walked for text-like files (`.ts .js .md .tsx .jsx .map`),
//! each file is split into overlapping chunks, chunks are embedded and
//! upserted into a vector table. A record table remembers which chunks have
//! been indexed per namespace, so re-running over an unchanged tree embeds
//! nothing and chunks from deleted files are removed.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌──────────┐   ┌────────────────┐
//! │  Loader  │──▶│ Chunker │──▶│ Embedder │──▶│ pgvector table │
//! └──────────┘   └────┬────┘   └──────────┘   └───────┬────────┘
//!                     │                               │
//!                     ▼                               ▼
//!               ┌──────────────┐              ┌──────────────┐
//!               │ record table │              │ query (L2)   │
//!               └──────────────┘              └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! codevec-schema                         # drop + create both tables
//! codevec-index ./my-project             # namespace "code_index"
//! codevec-query "database connection" 5
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Defaults, TOML file and environment overlay |
//! | [`models`] | Core data types |
//! | [`loader`] | Directory walk and file filtering |
//! | [`chunk`] | Recursive character splitter |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector store trait, Postgres and in-memory backends |
//! | [`records`] | Record manager trait, Postgres and in-memory backends |
//! | [`ingest`] | Incremental indexing |
//! | [`search`] | Similarity search |
//! | [`schema`] | Table creation |
//! | [`db`] | Connection pool |
//! | [`error`] | Typed fatal errors |
//! | [`cli`] | Binary plumbing and logging |

pub mod chunk;
pub mod cli;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod loader;
pub mod models;
pub mod records;
pub mod schema;
pub mod search;
pub mod store;
