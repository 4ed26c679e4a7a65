//! Configuration management for the handbook assistant
//!
//! Values are layered: defaults, then the TOML file, then environment
//! variables, then command-line overrides.

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::voice::{INLINE_MIN_WORDS, SAMPLE_RATE, WakeMatch};
use crate::{Error, Result};

/// Default similarity below which retrieval reports no match
pub const SIMILARITY_THRESHOLD: f32 = 0.4;

/// Default bound on consecutive capture/transcription attempts
pub const MAX_ATTEMPTS: u32 = 5;

/// Default activation phrase
pub const WAKE_WORD: &str = "hi";

/// Handbook assistant configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Source document (UTF-8 text or PDF)
    pub document_path: PathBuf,

    /// Directory for the index cache
    pub data_dir: PathBuf,

    /// Audio capture and artifacts
    pub audio: AudioConfig,

    /// Wake word gate
    pub wake: WakeConfig,

    /// Chunking and retrieval
    pub retrieval: RetrievalConfig,

    /// Session loop
    pub session: SessionConfig,

    /// Model backends
    pub models: ModelConfig,

    /// API keys
    pub api_keys: ApiKeys,
}

/// Audio configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Capture and artifact sample rate in Hz
    pub sample_rate: u32,

    /// Fixed-name WAV file for captured query audio
    pub query_audio_path: PathBuf,

    /// Fixed-name WAV file for synthesized answer audio
    pub response_audio_path: PathBuf,

    /// Write the WAV artifacts
    pub persist_audio: bool,

    /// Length of each wake word listening window
    pub wake_window: Duration,

    /// Length of the query recording window
    pub query_window: Duration,
}

/// Wake word configuration
#[derive(Debug, Clone)]
pub struct WakeConfig {
    pub wake_word: String,
    pub match_mode: WakeMatch,
    /// RMS below which a window is not transcribed; 0 disables the gate
    pub energy_threshold: f32,
    /// Answer a query spoken in the same breath as the wake word
    pub inline_queries: bool,
    /// Fewest trailing words taken as an inline query
    pub inline_min_words: usize,
}

/// Chunking and retrieval configuration
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub similarity_threshold: f32,
    /// Target chunk length in characters
    pub chunk_size: usize,
    /// Characters shared between neighbouring chunks
    pub chunk_overlap: usize,
    pub cache_index: bool,
}

/// Session loop configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub max_attempts: u32,
    pub turn_log: Option<PathBuf>,
}

/// Speech-to-text backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SttBackend {
    /// OpenAI-compatible Whisper endpoint
    #[default]
    Whisper,
    /// Deepgram listen API
    Deepgram,
}

/// Text-to-speech backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsBackend {
    /// OpenAI-compatible speech endpoint
    #[default]
    OpenAI,
    /// ElevenLabs text-to-speech
    ElevenLabs,
}

/// Model backend configuration
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Base URL of an OpenAI-compatible API (no trailing slash)
    pub api_base: String,
    pub stt_provider: SttBackend,
    /// STT model (e.g. "whisper-1", "nova-2")
    pub stt_model: String,
    /// Embedding model (e.g. "text-embedding-3-small")
    pub embedding_model: String,
    /// Chat model used for answers
    pub llm_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub tts_provider: TtsBackend,
    /// TTS model (e.g. "tts-1")
    pub tts_model: String,
    /// TTS voice identifier (`OpenAI` voice name or `ElevenLabs` voice id)
    pub tts_voice: String,
    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f32,
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (Whisper, embeddings, chat, TTS)
    pub openai: Option<SecretString>,

    /// `Deepgram` API key (optional STT)
    pub deepgram: Option<SecretString>,

    /// `ElevenLabs` API key (optional TTS)
    pub elevenlabs: Option<SecretString>,
}

/// Command-line overrides applied on top of file and environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Explicit config file path
    pub config_path: Option<PathBuf>,
    pub document: Option<PathBuf>,
    pub wake_word: Option<String>,
}

impl Config {
    /// Load configuration from the config file, environment and overrides
    ///
    /// # Errors
    ///
    /// Returns error if an explicit config file is broken or the resulting
    /// configuration is invalid
    pub fn load(overrides: &Overrides) -> Result<Self> {
        let fc = file::load_config_file(overrides.config_path.as_deref())?;
        let mut config = Self::from_sources(fc, |key| std::env::var(key).ok())?;

        if let Some(document) = &overrides.document {
            config.document_path.clone_from(document);
        }
        if let Some(wake_word) = &overrides.wake_word {
            config.wake.wake_word.clone_from(wake_word);
        }

        config.validate()?;
        Ok(config)
    }

    /// Merge a parsed config file with environment values (env > toml > default)
    ///
    /// `env` looks up a single environment variable.
    ///
    /// # Errors
    ///
    /// Returns error if a window length is not a representable duration
    pub fn from_sources<F>(fc: file::HandbookConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_keys = ApiKeys {
            openai: env("OPENAI_API_KEY")
                .or(fc.api_keys.openai)
                .map(SecretString::from),
            deepgram: env("DEEPGRAM_API_KEY")
                .or(fc.api_keys.deepgram)
                .map(SecretString::from),
            elevenlabs: env("ELEVENLABS_API_KEY")
                .or(fc.api_keys.elevenlabs)
                .map(SecretString::from),
        };

        let document_path = env("HANDBOOK_DOCUMENT")
            .or(fc.document)
            .map_or_else(|| PathBuf::from("Insurance_Handbook_20103.pdf"), PathBuf::from);

        let data_dir = env("HANDBOOK_DATA_DIR")
            .or(fc.data_dir)
            .map_or_else(default_data_dir, PathBuf::from);

        let audio = AudioConfig {
            sample_rate: fc.audio.sample_rate.unwrap_or(SAMPLE_RATE),
            query_audio_path: fc
                .audio
                .query_audio_path
                .map_or_else(|| PathBuf::from("user_input.wav"), PathBuf::from),
            response_audio_path: fc
                .audio
                .response_audio_path
                .map_or_else(|| PathBuf::from("response.wav"), PathBuf::from),
            persist_audio: fc.audio.persist_audio.unwrap_or(true),
            wake_window: secs("audio.wake_window_secs", fc.audio.wake_window_secs, 3.0)?,
            query_window: secs("audio.query_window_secs", fc.audio.query_window_secs, 5.0)?,
        };

        let wake = WakeConfig {
            wake_word: env("HANDBOOK_WAKE_WORD")
                .or(fc.wake.wake_word)
                .unwrap_or_else(|| WAKE_WORD.to_string()),
            match_mode: fc.wake.match_mode.unwrap_or_default(),
            energy_threshold: fc.wake.energy_threshold.unwrap_or(0.01),
            inline_queries: fc.wake.inline_queries.unwrap_or(false),
            inline_min_words: fc.wake.inline_min_words.unwrap_or(INLINE_MIN_WORDS),
        };

        let retrieval = RetrievalConfig {
            similarity_threshold: parse_env(&env, "HANDBOOK_SIMILARITY_THRESHOLD")
                .or(fc.retrieval.similarity_threshold)
                .unwrap_or(SIMILARITY_THRESHOLD),
            chunk_size: fc.retrieval.chunk_size.unwrap_or(500),
            chunk_overlap: fc.retrieval.chunk_overlap.unwrap_or(50),
            cache_index: fc.retrieval.cache_index.unwrap_or(true),
        };

        let session = SessionConfig {
            max_attempts: parse_env(&env, "HANDBOOK_MAX_ATTEMPTS")
                .or(fc.session.max_attempts)
                .unwrap_or(MAX_ATTEMPTS),
            turn_log: env("HANDBOOK_TURN_LOG")
                .or(fc.session.turn_log)
                .map(PathBuf::from),
        };

        let stt_provider = fc.models.stt_provider.unwrap_or_default();
        let default_stt_model = match stt_provider {
            SttBackend::Whisper => "whisper-1",
            SttBackend::Deepgram => "nova-2",
        };

        let tts_provider = fc.models.tts_provider.unwrap_or_default();
        let (default_tts_model, default_tts_voice) = match tts_provider {
            TtsBackend::OpenAI => ("tts-1", "alloy"),
            TtsBackend::ElevenLabs => ("eleven_monolingual_v1", "21m00Tcm4TlvDq8ikWAM"),
        };

        let models = ModelConfig {
            api_base: env("HANDBOOK_API_BASE")
                .or(fc.models.api_base)
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
            stt_provider,
            stt_model: env("HANDBOOK_STT_MODEL")
                .or(fc.models.stt_model)
                .unwrap_or_else(|| default_stt_model.to_string()),
            embedding_model: env("HANDBOOK_EMBEDDING_MODEL")
                .or(fc.models.embedding_model)
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            llm_model: env("HANDBOOK_LLM_MODEL")
                .or(fc.models.llm_model)
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            max_tokens: fc.models.max_tokens.unwrap_or(300),
            temperature: fc.models.temperature.unwrap_or(0.2),
            tts_provider,
            tts_model: fc
                .models
                .tts_model
                .unwrap_or_else(|| default_tts_model.to_string()),
            tts_voice: env("HANDBOOK_TTS_VOICE")
                .or(fc.models.tts_voice)
                .unwrap_or_else(|| default_tts_voice.to_string()),
            tts_speed: fc.models.tts_speed.unwrap_or(1.0),
        };

        Ok(Self {
            document_path,
            data_dir,
            audio,
            wake,
            retrieval,
            session,
            models,
            api_keys,
        })
    }

    /// Check invariants the pipeline relies on
    ///
    /// # Errors
    ///
    /// Returns error describing the first invalid setting
    pub fn validate(&self) -> Result<()> {
        if !self.wake.wake_word.chars().any(char::is_alphanumeric) {
            return Err(Error::Config(format!(
                "wake word {:?} must contain at least one letter or digit",
                self.wake.wake_word
            )));
        }
        if !(-1.0..=1.0).contains(&self.retrieval.similarity_threshold) {
            return Err(Error::Config(format!(
                "similarity threshold {} outside [-1, 1]",
                self.retrieval.similarity_threshold
            )));
        }
        if self.session.max_attempts == 0 {
            return Err(Error::Config("max attempts must be at least 1".to_string()));
        }
        if self.retrieval.chunk_size == 0 {
            return Err(Error::Config("chunk size must be positive".to_string()));
        }
        if self.retrieval.chunk_overlap >= self.retrieval.chunk_size {
            return Err(Error::Config(format!(
                "chunk overlap {} must be smaller than chunk size {}",
                self.retrieval.chunk_overlap, self.retrieval.chunk_size
            )));
        }
        if self.audio.sample_rate == 0 {
            return Err(Error::Config("sample rate must be positive".to_string()));
        }
        if self.audio.wake_window.is_zero() || self.audio.query_window.is_zero() {
            return Err(Error::Config("capture windows must be longer than zero".to_string()));
        }
        Ok(())
    }

    /// Directory the index cache lives in, created on demand
    #[must_use]
    pub fn index_cache_dir(&self) -> PathBuf {
        let dir = self.data_dir.join("index");
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::warn!(path = %dir.display(), error = %e, "failed to create index cache directory");
        }
        dir
    }

    /// Query audio artifact path, if artifacts are persisted
    #[must_use]
    pub fn query_audio_path(&self) -> Option<&Path> {
        self.audio
            .persist_audio
            .then_some(self.audio.query_audio_path.as_path())
    }

    /// Response audio artifact path, if artifacts are persisted
    #[must_use]
    pub fn response_audio_path(&self) -> Option<&Path> {
        self.audio
            .persist_audio
            .then_some(self.audio.response_audio_path.as_path())
    }
}

/// Default data directory: `~/.local/share/handbook-assistant` on Linux
fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".handbook-assistant"),
        |d| d.data_dir().join("handbook-assistant"),
    )
}

fn parse_env<T, F>(env: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    env(key).and_then(|v| v.trim().parse().ok())
}

fn secs(key: &str, value: Option<f64>, default: f64) -> Result<Duration> {
    let value = value.unwrap_or(default);
    Duration::try_from_secs_f64(value)
        .map_err(|e| Error::Config(format!("{key} = {value} is not a valid duration: {e}")))
}
