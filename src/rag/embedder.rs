//! Text embedding for document and query vectors

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::config::Config;
use crate::{Error, Result};

/// Inputs sent per embeddings request
const BATCH_SIZE: usize = 64;

/// Maps text to fixed-dimension vectors
///
/// Documents and queries must go through the same implementation so their
/// dimensions agree.
#[async_trait]
pub trait Embeds: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, preserving input order
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Identifies the model, for cache keys
    fn model_id(&self) -> &str {
        "unknown"
    }
}

/// Text embedder using an OpenAI-compatible embeddings API
#[derive(Debug, Clone)]
pub struct Embedder {
    client: reqwest::Client,
    api_key: SecretString,
    api_base: String,
    model: String,
}

impl Embedder {
    /// Create an embedder for `model` at `api_base`
    ///
    /// # Errors
    ///
    /// Returns error if API key is empty
    pub fn new(api_base: &str, api_key: SecretString, model: String) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("OpenAI API key required for embeddings".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            model,
        })
    }

    /// Build from the model section of `config`
    ///
    /// # Errors
    ///
    /// Returns error if no `OpenAI` key is configured
    pub fn from_config(config: &Config) -> Result<Self> {
        let key = config
            .api_keys
            .openai
            .clone()
            .ok_or_else(|| Error::Config("OPENAI_API_KEY not set (needed for embeddings)".to_string()))?;
        Self::new(&config.models.api_base, key, config.models.embedding_model.clone())
    }

    async fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        #[derive(serde::Serialize)]
        struct EmbeddingRequest<'a> {
            model: &'a str,
            input: &'a [&'a str],
        }

        #[derive(serde::Deserialize)]
        struct EmbeddingResponse {
            data: Vec<EmbeddingData>,
        }

        #[derive(serde::Deserialize)]
        struct EmbeddingData {
            embedding: Vec<f32>,
            index: usize,
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.api_base))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!("Embedding API error {status}: {body}")));
        }

        let mut result: EmbeddingResponse = response.json().await?;

        if result.data.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                result.data.len()
            )));
        }

        // Sort by index to maintain input order
        result.data.sort_by_key(|d| d.index);

        Ok(result.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Embeds for Embedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.request(&[text]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(BATCH_SIZE) {
            tracing::debug!(batch = batch.len(), done = out.len(), "embedding batch");
            out.extend(self.request(batch).await?);
        }
        Ok(out)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_api_key() {
        let result = Embedder::new(
            "https://api.openai.com/v1",
            SecretString::from(String::new()),
            "text-embedding-3-small".to_string(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn model_id_is_the_model_name() {
        let embedder = Embedder::new(
            "http://localhost:11434/v1/",
            SecretString::from("key".to_string()),
            "nomic-embed-text".to_string(),
        )
        .unwrap();
        assert_eq!(embedder.model_id(), "nomic-embed-text");
        assert_eq!(embedder.api_base, "http://localhost:11434/v1");
    }
}
