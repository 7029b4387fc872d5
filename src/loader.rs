//! Directory loader.
//!
//! Walks a directory tree and turns every file whose extension is on the
//! configured allow-list into a [`Document`]. Unreadable files are skipped
//! with a warning instead of failing the whole run.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::LoaderConfig;
use crate::models::Document;

/// Load all eligible files under `root`, sorted by path.
///
/// `source` is the walked path (root joined with the relative path), so it
/// is absolute when `root` is absolute.
pub fn load_documents(root: &Path, config: &LoaderConfig) -> Result<Vec<Document>> {
    if !root.is_dir() {
        bail!("Directory not found: {}", root.display());
    }

    let exclude_set = build_globset(&config.exclude_globs)?;
    let mut docs = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(config.follow_symlinks)
        .sort_by_file_name();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if exclude_set.is_match(relative) {
            continue;
        }
        if !has_allowed_extension(path, &config.extensions) {
            continue;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => docs.push(Document {
                content,
                source: path.to_string_lossy().to_string(),
            }),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable file");
            }
        }
    }

    docs.sort_by(|a, b| a.source.cmp(&b.source));
    Ok(docs)
}

fn has_allowed_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions
        .iter()
        .any(|allowed| allowed.trim_start_matches('.') == ext)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
