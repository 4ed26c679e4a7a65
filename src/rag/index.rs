//! Document index: chunks paired with their embeddings

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::cache::IndexCache;
use super::chunking::Chunker;
use super::embedder::Embeds;
use crate::{Error, Result};

/// A contiguous span of the source document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Position in the document's chunk sequence
    pub index: usize,
    pub text: String,
}

/// A chunk and its embedding vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub chunk: TextChunk,
    pub embedding: Vec<f32>,
}

/// Ordered chunks of one document with uniform-dimension embeddings
///
/// Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentIndex {
    entries: Vec<IndexedChunk>,
    dimension: usize,
}

impl DocumentIndex {
    /// Pair chunks with embeddings
    ///
    /// # Errors
    ///
    /// Returns error if the counts differ, there are no chunks, chunk indices
    /// are not `0..n` in order, or embedding dimensions are zero or mixed
    pub fn new(chunks: Vec<TextChunk>, embeddings: Vec<Vec<f32>>) -> Result<Self> {
        if chunks.len() != embeddings.len() {
            return Err(Error::Index(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }

        let dimension = embeddings.first().map_or(0, Vec::len);
        let entries = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexedChunk { chunk, embedding })
            .collect();

        let index = Self { entries, dimension };
        index.validate()?;
        Ok(index)
    }

    /// Check the invariants `new` establishes (used for cached indexes)
    ///
    /// # Errors
    ///
    /// Returns error describing the first violated invariant
    pub fn validate(&self) -> Result<()> {
        if self.entries.is_empty() {
            return Err(Error::Index("index has no chunks".to_string()));
        }
        if self.dimension == 0 {
            return Err(Error::Index("embeddings are empty".to_string()));
        }

        for (position, entry) in self.entries.iter().enumerate() {
            if entry.chunk.index != position {
                return Err(Error::Index(format!(
                    "chunk at position {position} has index {}",
                    entry.chunk.index
                )));
            }
            if entry.embedding.len() != self.dimension {
                return Err(Error::Index(format!(
                    "chunk {position} has dimension {}, expected {}",
                    entry.embedding.len(),
                    self.dimension
                )));
            }
        }

        Ok(())
    }

    #[must_use]
    pub fn entries(&self) -> &[IndexedChunk] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Embedding dimension shared by every chunk
    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub fn chunk(&self, index: usize) -> Option<&TextChunk> {
        self.entries.get(index).map(|e| &e.chunk)
    }
}

/// Read the source document as text
///
/// Files ending in `.pdf` have their text extracted; anything else is read
/// as UTF-8.
///
/// # Errors
///
/// Returns `Error::Document` if the file is missing, unreadable, not valid
/// text or PDF, or blank
pub fn load_document(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .map_err(|e| Error::Document(format!("cannot read {}: {e}", path.display())))?;

    let text = if is_pdf(path) {
        pdf_extract::extract_text_from_mem(&bytes)
            .map_err(|e| Error::Document(format!("cannot extract text from {}: {e}", path.display())))?
    } else {
        String::from_utf8(bytes)
            .map_err(|e| Error::Document(format!("{} is not UTF-8 text: {e}", path.display())))?
    };

    if text.trim().is_empty() {
        return Err(Error::Document(format!("{} is empty", path.display())));
    }

    tracing::info!(path = %path.display(), chars = text.chars().count(), "loaded source document");
    Ok(text)
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Builds a [`DocumentIndex`] from source text
pub struct DocumentIndexer {
    embedder: Arc<dyn Embeds>,
    chunker: Chunker,
    cache: Option<IndexCache>,
}

impl DocumentIndexer {
    #[must_use]
    pub fn new(embedder: Arc<dyn Embeds>, chunker: Chunker) -> Self {
        Self {
            embedder,
            chunker,
            cache: None,
        }
    }

    /// Reuse indexes stored under `dir` when the document is unchanged
    #[must_use]
    pub fn with_cache_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.cache = dir.map(IndexCache::new);
        self
    }

    /// Split `text` into numbered chunks
    #[must_use]
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        self.chunker
            .split(text)
            .into_iter()
            .enumerate()
            .map(|(index, text)| TextChunk { index, text })
            .collect()
    }

    /// Read the document at `path` and index it
    ///
    /// # Errors
    ///
    /// Returns `Error::Document` if the file is missing, unreadable or empty,
    /// or the error from [`Self::build`]
    pub async fn build_from_file(&self, path: &Path) -> Result<DocumentIndex> {
        let text = load_document(path)?;
        self.build(&text).await
    }

    /// Chunk and embed `text`
    ///
    /// # Errors
    ///
    /// Returns `Error::Document` if the text is blank, or an embedding or
    /// index error
    pub async fn build(&self, text: &str) -> Result<DocumentIndex> {
        if text.trim().is_empty() {
            return Err(Error::Document("source document is empty".to_string()));
        }

        let key = IndexCache::key(text, self.embedder.model_id(), &self.chunker);
        if let Some(index) = self.cache.as_ref().and_then(|c| c.read(&key)) {
            tracing::info!(chunks = index.len(), dimension = index.dimension(), "loaded cached index");
            return Ok(index);
        }

        let chunks = self.chunk(text);
        tracing::info!(
            chunks = chunks.len(),
            size = self.chunker.size(),
            overlap = self.chunker.overlap(),
            "embedding document chunks"
        );

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| Error::Index(format!("embedding chunks failed: {e}")))?;

        let index = DocumentIndex::new(chunks, embeddings)?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.write(&key, self.embedder.model_id(), &index) {
                tracing::warn!(error = %e, "failed to cache index");
            }
        }

        tracing::info!(chunks = index.len(), dimension = index.dimension(), "document indexed");
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: usize, text: &str) -> TextChunk {
        TextChunk {
            index,
            text: text.to_string(),
        }
    }

    #[test]
    fn mismatched_dimensions_are_rejected() {
        let result = DocumentIndex::new(
            vec![chunk(0, "a"), chunk(1, "b")],
            vec![vec![1.0, 0.0], vec![1.0, 0.0, 0.0]],
        );
        assert!(matches!(result, Err(Error::Index(_))));
    }

    #[test]
    fn counts_must_agree() {
        let result = DocumentIndex::new(vec![chunk(0, "a")], vec![]);
        assert!(result.is_err());
    }

    #[test]
    fn empty_and_zero_dimension_are_rejected() {
        assert!(DocumentIndex::new(vec![], vec![]).is_err());
        assert!(DocumentIndex::new(vec![chunk(0, "a")], vec![vec![]]).is_err());
    }

    #[test]
    fn chunk_indices_must_be_sequential() {
        let result = DocumentIndex::new(
            vec![chunk(0, "a"), chunk(2, "b")],
            vec![vec![1.0], vec![1.0]],
        );
        assert!(result.is_err());
    }

    #[test]
    fn missing_or_blank_document_is_a_document_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = load_document(&dir.path().join("handbook.txt"));
        assert!(matches!(missing, Err(Error::Document(_))));

        let blank = dir.path().join("blank.txt");
        std::fs::write(&blank, " \n\n ").unwrap();
        assert!(matches!(load_document(&blank), Err(Error::Document(_))));
    }

    #[test]
    fn pdf_is_detected_by_extension() {
        assert!(is_pdf(Path::new("Insurance_Handbook_20103.pdf")));
        assert!(is_pdf(Path::new("HANDBOOK.PDF")));
        assert!(!is_pdf(Path::new("handbook.txt")));
        assert!(!is_pdf(Path::new("pdf")));
    }

    #[test]
    fn broken_pdf_is_a_document_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handbook.pdf");
        std::fs::write(&path, "Flood damage is covered under Section 4.").unwrap();
        assert!(matches!(load_document(&path), Err(Error::Document(_))));
    }

    #[test]
    fn lookup_by_index() {
        let index = DocumentIndex::new(
            vec![chunk(0, "a"), chunk(1, "b")],
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        )
        .unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.dimension(), 2);
        assert_eq!(index.chunk(1).map(|c| c.text.as_str()), Some("b"));
        assert!(index.chunk(2).is_none());
    }
}
