//! Speech-to-text (STT) processing

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::audio::AudioBuffer;
use crate::config::{Config, SttBackend};
use crate::{Error, Result};

/// Converts recorded audio into text
///
/// Silence or noise may legitimately produce an empty transcript.
#[async_trait]
pub trait Transcribes: Send + Sync {
    /// Transcribe `audio`, returning trimmed text
    async fn transcribe(&self, audio: &AudioBuffer) -> Result<String>;
}

/// Response from OpenAI Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Response from Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

/// Transcribes speech to text over HTTP
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    backend: SttBackend,
    api_base: String,
}

impl SpeechToText {
    /// Create a new STT instance using an OpenAI-compatible Whisper endpoint
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_whisper(api_base: &str, api_key: SecretString, model: String) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("OpenAI API key required for Whisper".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            backend: SttBackend::Whisper,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Create a new STT instance using Deepgram
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_deepgram(api_key: SecretString, model: String) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("Deepgram API key required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            backend: SttBackend::Deepgram,
            api_base: "https://api.deepgram.com/v1".to_string(),
        })
    }

    /// Build the configured backend
    ///
    /// # Errors
    ///
    /// Returns error if the backend's API key is not configured
    pub fn from_config(config: &Config) -> Result<Self> {
        let models = &config.models;
        match models.stt_provider {
            SttBackend::Whisper => {
                let key = config
                    .api_keys
                    .openai
                    .clone()
                    .ok_or_else(|| Error::Config("OPENAI_API_KEY not set (needed for Whisper)".to_string()))?;
                Self::new_whisper(&models.api_base, key, models.stt_model.clone())
            }
            SttBackend::Deepgram => {
                let key = config
                    .api_keys
                    .deepgram
                    .clone()
                    .ok_or_else(|| Error::Config("DEEPGRAM_API_KEY not set".to_string()))?;
                Self::new_deepgram(key, models.stt_model.clone())
            }
        }
    }

    /// Transcribe using OpenAI Whisper
    async fn transcribe_whisper(&self, wav: Vec<u8>) -> Result<String> {
        tracing::debug!(audio_bytes = wav.len(), "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.api_base))
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Whisper request failed");
                e
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(Error::Stt(format!("Whisper API error {status}: {body}")));
        }

        let result: WhisperResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse response");
            e
        })?;

        Ok(result.text)
    }

    /// Transcribe using Deepgram
    async fn transcribe_deepgram(&self, wav: Vec<u8>) -> Result<String> {
        tracing::debug!(audio_bytes = wav.len(), "starting Deepgram transcription");

        let url = format!("{}/listen?model={}&punctuate=true", self.api_base, self.model);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.api_key.expose_secret()))
            .header("Content-Type", "audio/wav")
            .body(wav)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Deepgram request failed");
                e
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Deepgram API error");
            return Err(Error::Stt(format!("Deepgram API error {status}: {body}")));
        }

        let result: DeepgramResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse Deepgram response");
            e
        })?;

        Ok(first_transcript(result))
    }
}

#[async_trait]
impl Transcribes for SpeechToText {
    async fn transcribe(&self, audio: &AudioBuffer) -> Result<String> {
        let wav = audio.to_wav_bytes()?;

        let text = match self.backend {
            SttBackend::Whisper => self.transcribe_whisper(wav).await?,
            SttBackend::Deepgram => self.transcribe_deepgram(wav).await?,
        };

        let text = text.trim().to_string();
        tracing::info!(transcript = %text, "transcription complete");
        Ok(text)
    }
}

fn first_transcript(response: DeepgramResponse) -> String {
    response
        .results
        .channels
        .into_iter()
        .next()
        .and_then(|c| c.alternatives.into_iter().next())
        .map(|a| a.transcript)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_is_rejected() {
        let result = SpeechToText::new_whisper(
            "https://api.openai.com/v1",
            SecretString::from(String::new()),
            "whisper-1".to_string(),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn deepgram_transcript_is_first_alternative() {
        let response: DeepgramResponse = serde_json::from_str(
            r#"{"results":{"channels":[{"alternatives":[{"transcript":"is flood covered"},{"transcript":"is blood covered"}]}]}}"#,
        )
        .unwrap();
        assert_eq!(first_transcript(response), "is flood covered");

        let empty: DeepgramResponse = serde_json::from_str(r#"{"results":{"channels":[]}}"#).unwrap();
        assert_eq!(first_transcript(empty), "");
    }
}
