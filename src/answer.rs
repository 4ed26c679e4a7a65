//! Grounded answer generation

use std::sync::Arc;

use crate::llm::{Generates, Prompt};
use crate::rag::RetrievalResult;
use crate::{Error, Result};

const GROUNDED_SYSTEM: &str = "You answer questions about an insurance handbook. \
Use only the handbook excerpt provided as context. \
If the excerpt does not answer the question, say that the handbook does not cover it. \
Answer in one to three short sentences suitable for reading aloud.";

const FALLBACK_SYSTEM: &str = "You answer questions for users of an insurance handbook assistant. \
No relevant handbook passage was found for this question, and no excerpt is provided. \
Answer briefly from general knowledge, making clear the answer does not come from the handbook, \
or say that you cannot find relevant information. \
Answer in one to three short sentences suitable for reading aloud.";

/// Turns a query and its retrieval result into a spoken-length answer
pub struct AnswerGenerator {
    generator: Arc<dyn Generates>,
}

impl AnswerGenerator {
    #[must_use]
    pub fn new(generator: Arc<dyn Generates>) -> Self {
        Self { generator }
    }

    /// Build the prompt for `query`
    ///
    /// A matched chunk is supplied as the only context. Without a match the
    /// prompt carries the query alone.
    #[must_use]
    pub fn prompt(query: &str, retrieval: &RetrievalResult) -> Prompt {
        match retrieval.chunk() {
            Some(chunk) => Prompt {
                system: GROUNDED_SYSTEM.to_string(),
                user: format!("Context:\n{}\n\nQuestion: {query}", chunk.text),
            },
            None => Prompt {
                system: FALLBACK_SYSTEM.to_string(),
                user: format!("Question: {query}"),
            },
        }
    }

    /// Generate an answer
    ///
    /// # Errors
    ///
    /// Returns `Error::Generation` if the model fails or returns blank text
    pub async fn generate(&self, query: &str, retrieval: &RetrievalResult) -> Result<String> {
        let prompt = Self::prompt(query, retrieval);
        tracing::debug!(grounded = retrieval.is_match(), "generating answer");

        let answer = self
            .generator
            .generate(&prompt)
            .await
            .map_err(|e| match e {
                Error::Generation(_) => e,
                other => Error::Generation(other.to_string()),
            })?;

        let answer = answer.trim();
        if answer.is_empty() {
            return Err(Error::Generation("model returned no text".to_string()));
        }

        tracing::info!(answer, "answer generated");
        Ok(answer.to_string())
    }
}
