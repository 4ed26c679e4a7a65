//! On-disk cache of built document indexes
//!
//! Entries are JSON files keyed by a SHA-256 over everything that shapes the
//! index: document text, embedding model, chunk size and overlap.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::chunking::Chunker;
use super::index::DocumentIndex;
use crate::Result;

#[derive(Debug, Serialize, Deserialize)]
struct CachedIndex {
    key: String,
    model: String,
    created_at: DateTime<Utc>,
    index: DocumentIndex,
}

/// Directory of cached indexes
#[derive(Debug, Clone)]
pub struct IndexCache {
    dir: PathBuf,
}

impl IndexCache {
    #[must_use]
    pub const fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Cache key for `text` indexed with `model` and `chunker`
    #[must_use]
    pub fn key(text: &str, model: &str, chunker: &Chunker) -> String {
        let mut hasher = Sha256::new();
        hasher.update(model.as_bytes());
        hasher.update([0]);
        hasher.update(chunker.size().to_le_bytes());
        hasher.update(chunker.overlap().to_le_bytes());
        hasher.update(text.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Load a cached index, if present and intact
    #[must_use]
    pub fn read(&self, key: &str) -> Option<DocumentIndex> {
        let path = self.path(key);
        let contents = std::fs::read_to_string(&path).ok()?;

        let cached = match serde_json::from_str::<CachedIndex>(&contents) {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "corrupt index cache entry");
                return None;
            }
        };

        if cached.key != key {
            tracing::warn!(path = %path.display(), "index cache key mismatch");
            return None;
        }

        if let Err(e) = cached.index.validate() {
            tracing::warn!(path = %path.display(), error = %e, "invalid cached index");
            return None;
        }

        tracing::debug!(
            path = %path.display(),
            model = %cached.model,
            created_at = %cached.created_at,
            "index cache hit"
        );
        Some(cached.index)
    }

    /// Store `index` under `key`
    ///
    /// # Errors
    ///
    /// Returns error if the directory or file cannot be written
    pub fn write(&self, key: &str, model: &str, index: &DocumentIndex) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        let cached = CachedIndex {
            key: key.to_string(),
            model: model.to_string(),
            created_at: Utc::now(),
            index: index.clone(),
        };

        let path = self.path(key);
        std::fs::write(&path, serde_json::to_string(&cached)?)?;

        tracing::debug!(path = %path.display(), "cached document index");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::TextChunk;

    fn sample_index() -> DocumentIndex {
        DocumentIndex::new(
            vec![TextChunk {
                index: 0,
                text: "Flood damage is covered.".to_string(),
            }],
            vec![vec![0.5, 0.5]],
        )
        .unwrap()
    }

    #[test]
    fn key_depends_on_every_input() {
        let chunker = Chunker::new(500, 50);
        let base = IndexCache::key("doc", "model", &chunker);

        assert_eq!(base.len(), 64);
        assert_eq!(base, IndexCache::key("doc", "model", &chunker));
        assert_ne!(base, IndexCache::key("doc2", "model", &chunker));
        assert_ne!(base, IndexCache::key("doc", "model2", &chunker));
        assert_ne!(base, IndexCache::key("doc", "model", &Chunker::new(400, 50)));
        assert_ne!(base, IndexCache::key("doc", "model", &Chunker::new(500, 40)));
    }

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(dir.path().join("index"));
        let index = sample_index();

        cache.write("abc", "model", &index).unwrap();
        assert_eq!(cache.read("abc"), Some(index));
        assert!(cache.read("other").is_none());
    }

    #[test]
    fn corrupt_entry_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(dir.path().to_path_buf());
        std::fs::write(dir.path().join("abc.json"), "{not json").unwrap();

        assert!(cache.read("abc").is_none());
    }
}
