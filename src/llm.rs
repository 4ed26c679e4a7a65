//! Text generation through an OpenAI-compatible chat completions API

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::{Error, Result};

/// A system instruction and a user message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Generates text from a prompt
#[async_trait]
pub trait Generates: Send + Sync {
    /// Generate a completion for `prompt`
    async fn generate(&self, prompt: &Prompt) -> Result<String>;
}

/// Chat completions client
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    api_key: SecretString,
    api_base: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl ChatClient {
    /// Create a client for `model` at `api_base`
    ///
    /// # Errors
    ///
    /// Returns error if API key is empty
    pub fn new(api_base: &str, api_key: SecretString, model: String) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("OpenAI API key required for generation".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            model,
            max_tokens: 300,
            temperature: 0.2,
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
            .ok_or_else(|| Error::Config("OPENAI_API_KEY not set (needed for generation)".to_string()))?;

        Ok(Self::new(&config.models.api_base, key, config.models.llm_model.clone())?
            .with_max_tokens(config.models.max_tokens)
            .with_temperature(config.models.temperature))
    }

    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl Generates for ChatClient {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        tracing::debug!(model = %self.model, "requesting completion");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Generation(format!("chat API error {status}: {body}")));
        }

        let chat_response: ChatResponse = response.json().await?;
        first_content(chat_response)
    }
}

fn first_content(response: ChatResponse) -> Result<String> {
    let text = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .unwrap_or_default();

    if text.is_empty() {
        return Err(Error::Generation("model returned no text".to_string()));
    }
    Ok(text)
}
