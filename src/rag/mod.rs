//! Retrieval over the source document
//!
//! The document is chunked and embedded once at startup into a read-only
//! [`DocumentIndex`]; each query is embedded with the same [`Embeds`]
//! implementation and matched against it by cosine similarity.

mod cache;
mod chunking;
mod embedder;
mod index;
mod retriever;

pub use cache::IndexCache;
pub use chunking::Chunker;
pub use embedder::{Embedder, Embeds};
pub use index::{DocumentIndex, DocumentIndexer, IndexedChunk, TextChunk, load_document};
pub use retriever::{RetrievalResult, Retriever, ScoredChunk, cosine_similarity};
