//! Text-to-speech (TTS) processing
//!
//! Both backends are asked for raw 16-bit PCM so no audio decoder is needed.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::audio::AudioBuffer;
use crate::config::{Config, TtsBackend};
use crate::{Error, Result};

/// Sample rate of `OpenAI` "pcm" responses
const OPENAI_PCM_RATE: u32 = 24000;

/// Sample rate requested from `ElevenLabs`
const ELEVENLABS_PCM_RATE: u32 = 16000;

/// Converts text into speech audio
#[async_trait]
pub trait Synthesizes: Send + Sync {
    /// Synthesize `text` to mono audio
    async fn synthesize(&self, text: &str) -> Result<AudioBuffer>;
}

/// Synthesizes speech from text over HTTP
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: SecretString,
    voice: String,
    speed: f32,
    model: String,
    backend: TtsBackend,
    api_base: String,
}

impl TextToSpeech {
    /// Create a new TTS instance using an OpenAI-compatible speech endpoint
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_openai(
        api_base: &str,
        api_key: SecretString,
        voice: String,
        speed: f32,
        model: String,
    ) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice,
            speed: speed.clamp(0.25, 4.0),
            model,
            backend: TtsBackend::OpenAI,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Create a new TTS instance using `ElevenLabs`
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_elevenlabs(api_key: SecretString, voice_id: String, model: String) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("ElevenLabs API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice: voice_id,
            speed: 1.0,
            model,
            backend: TtsBackend::ElevenLabs,
            api_base: "https://api.elevenlabs.io/v1".to_string(),
        })
    }

    /// Build the configured backend
    ///
    /// # Errors
    ///
    /// Returns error if the backend's API key is not configured
    pub fn from_config(config: &Config) -> Result<Self> {
        let models = &config.models;
        match models.tts_provider {
            TtsBackend::OpenAI => {
                let key = config
                    .api_keys
                    .openai
                    .clone()
                    .ok_or_else(|| Error::Config("OPENAI_API_KEY not set (needed for TTS)".to_string()))?;
                Self::new_openai(
                    &models.api_base,
                    key,
                    models.tts_voice.clone(),
                    models.tts_speed,
                    models.tts_model.clone(),
                )
            }
            TtsBackend::ElevenLabs => {
                let key = config
                    .api_keys
                    .elevenlabs
                    .clone()
                    .ok_or_else(|| Error::Config("ELEVENLABS_API_KEY not set".to_string()))?;
                Self::new_elevenlabs(key, models.tts_voice.clone(), models.tts_model.clone())
            }
        }
    }

    /// Synthesize using `OpenAI` TTS
    async fn synthesize_openai(&self, text: &str) -> Result<AudioBuffer> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
            response_format: &'a str,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
            response_format: "pcm",
        };

        let response = self
            .client
            .post(format!("{}/audio/speech", self.api_base))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("OpenAI TTS error {status}: {body}")));
        }

        let pcm = response.bytes().await?;
        Ok(AudioBuffer::from_pcm16_le(&pcm, OPENAI_PCM_RATE))
    }

    /// Synthesize using `ElevenLabs` TTS
    async fn synthesize_elevenlabs(&self, text: &str) -> Result<AudioBuffer> {
        #[derive(serde::Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        let url = format!(
            "{}/text-to-speech/{}?output_format=pcm_{ELEVENLABS_PCM_RATE}",
            self.api_base, self.voice
        );

        let request = ElevenLabsRequest {
            text,
            model_id: &self.model,
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("ElevenLabs TTS error {status}: {body}")));
        }

        let pcm = response.bytes().await?;
        Ok(AudioBuffer::from_pcm16_le(&pcm, ELEVENLABS_PCM_RATE))
    }
}

#[async_trait]
impl Synthesizes for TextToSpeech {
    async fn synthesize(&self, text: &str) -> Result<AudioBuffer> {
        if text.trim().is_empty() {
            return Err(Error::Tts("nothing to synthesize".to_string()));
        }

        tracing::debug!(chars = text.len(), backend = ?self.backend, "synthesizing speech");

        let audio = match self.backend {
            TtsBackend::OpenAI => self.synthesize_openai(text).await?,
            TtsBackend::ElevenLabs => self.synthesize_elevenlabs(text).await?,
        };

        if audio.is_empty() {
            return Err(Error::Tts("TTS returned no audio".to_string()));
        }
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_is_rejected() {
        let result = TextToSpeech::new_elevenlabs(
            SecretString::from(String::new()),
            "voice".to_string(),
            "eleven_turbo_v2".to_string(),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn speed_is_clamped() {
        let tts = TextToSpeech::new_openai(
            "https://api.openai.com/v1/",
            SecretString::from("sk-test".to_string()),
            "alloy".to_string(),
            9.0,
            "tts-1".to_string(),
        )
        .unwrap();
        assert!((tts.speed - 4.0).abs() < f32::EPSILON);
        assert_eq!(tts.api_base, "https://api.openai.com/v1");
    }
}
