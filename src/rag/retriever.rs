//! Similarity search over the document index

use std::sync::Arc;

use serde::Serialize;

use super::embedder::Embeds;
use super::index::{DocumentIndex, TextChunk};
use crate::config::SIMILARITY_THRESHOLD;
use crate::Result;

/// A chunk and its similarity to the query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: TextChunk,
    pub score: f32,
}

/// Outcome of a retrieval
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RetrievalResult {
    /// Best chunk, at or above the threshold
    Match(ScoredChunk),
    /// Nothing relevant enough; `best_score` is the closest similarity seen
    NoMatch { best_score: Option<f32> },
}

impl RetrievalResult {
    #[must_use]
    pub const fn is_match(&self) -> bool {
        matches!(self, Self::Match(_))
    }

    /// Matched chunk, if any
    #[must_use]
    pub const fn chunk(&self) -> Option<&TextChunk> {
        match self {
            Self::Match(scored) => Some(&scored.chunk),
            Self::NoMatch { .. } => None,
        }
    }

    /// Best similarity seen, matched or not
    #[must_use]
    pub const fn score(&self) -> Option<f32> {
        match self {
            Self::Match(scored) => Some(scored.score),
            Self::NoMatch { best_score } => *best_score,
        }
    }
}

/// Ranks indexed chunks against a query by cosine similarity
pub struct Retriever {
    index: Arc<DocumentIndex>,
    embedder: Arc<dyn Embeds>,
    threshold: f32,
}

impl Retriever {
    /// `embedder` must be the one the index was built with
    #[must_use]
    pub fn new(index: Arc<DocumentIndex>, embedder: Arc<dyn Embeds>) -> Self {
        Self {
            index,
            embedder,
            threshold: SIMILARITY_THRESHOLD,
        }
    }

    /// Minimum similarity for a match
    #[must_use]
    pub const fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    #[must_use]
    pub const fn threshold(&self) -> f32 {
        self.threshold
    }

    #[must_use]
    pub fn index(&self) -> &DocumentIndex {
        &self.index
    }

    /// Embed `query` and return the best chunk or no match
    ///
    /// # Errors
    ///
    /// Returns error if the query cannot be embedded
    pub async fn search(&self, query: &str) -> Result<RetrievalResult> {
        let query_embedding = self.embedder.embed(query).await?;
        let result = self.rank(&query_embedding);

        match &result {
            RetrievalResult::Match(scored) => tracing::info!(
                chunk = scored.chunk.index,
                score = scored.score,
                "retrieved chunk"
            ),
            RetrievalResult::NoMatch { best_score } => tracing::info!(
                best_score = ?best_score,
                threshold = self.threshold,
                "no chunk above threshold"
            ),
        }

        Ok(result)
    }

    /// Linear scan for the most similar chunk
    ///
    /// Ties keep the earliest chunk. Scores that are not numbers are skipped.
    #[must_use]
    pub fn rank(&self, query_embedding: &[f32]) -> RetrievalResult {
        let mut best: Option<(&TextChunk, f32)> = None;

        for entry in self.index.entries() {
            let score = cosine_similarity(&entry.embedding, query_embedding);
            if score.is_nan() {
                continue;
            }
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((&entry.chunk, score));
            }
        }

        match best {
            Some((chunk, score)) if score >= self.threshold => RetrievalResult::Match(ScoredChunk {
                chunk: chunk.clone(),
                score,
            }),
            _ => RetrievalResult::NoMatch {
                best_score: best.map(|(_, score)| score),
            },
        }
    }
}

/// Cosine similarity of two vectors
///
/// Returns 0.0 when lengths differ or either vector has zero norm.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }

    dot / denom
}
