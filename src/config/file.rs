//! TOML configuration file loading
//!
//! Supports `~/.config/handbook-assistant/config.toml` as a persistent config
//! source. All fields are optional; the file is a partial overlay on top of
//! defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{SttBackend, TtsBackend};
use crate::Result;
use crate::voice::WakeMatch;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct HandbookConfigFile {
    /// Path to the source document (UTF-8 text or PDF)
    #[serde(default)]
    pub document: Option<String>,

    /// Directory for the index cache
    #[serde(default)]
    pub data_dir: Option<String>,

    /// Audio capture and artifact configuration
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Wake word configuration
    #[serde(default)]
    pub wake: WakeFileConfig,

    /// Chunking and retrieval configuration
    #[serde(default)]
    pub retrieval: RetrievalFileConfig,

    /// Session loop configuration
    #[serde(default)]
    pub session: SessionFileConfig,

    /// Model backends
    #[serde(default)]
    pub models: ModelsFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Audio configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Capture and artifact sample rate in Hz
    pub sample_rate: Option<u32>,

    /// Where captured query audio is written
    pub query_audio_path: Option<String>,

    /// Where synthesized answer audio is written
    pub response_audio_path: Option<String>,

    /// Write the WAV artifacts at all
    pub persist_audio: Option<bool>,

    /// Length of each wake word listening window
    pub wake_window_secs: Option<f64>,

    /// Length of the query recording window
    pub query_window_secs: Option<f64>,
}

/// Wake word configuration
#[derive(Debug, Default, Deserialize)]
pub struct WakeFileConfig {
    /// Activation phrase (e.g. "hi")
    pub wake_word: Option<String>,

    /// "word" or "substring"
    pub match_mode: Option<WakeMatch>,

    /// RMS below which a window is treated as silence
    pub energy_threshold: Option<f32>,

    /// Answer a query spoken together with the wake word
    pub inline_queries: Option<bool>,

    /// Fewest words after the wake word taken as an inline query
    pub inline_min_words: Option<usize>,
}

/// Chunking and retrieval configuration
#[derive(Debug, Default, Deserialize)]
pub struct RetrievalFileConfig {
    pub similarity_threshold: Option<f32>,
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
    pub cache_index: Option<bool>,
}

/// Session loop configuration
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    /// Bound on consecutive capture/transcription attempts
    pub max_attempts: Option<u32>,

    /// JSON-lines log of answered turns
    pub turn_log: Option<String>,
}

/// Model backend configuration
#[derive(Debug, Default, Deserialize)]
pub struct ModelsFileConfig {
    /// Base URL of an OpenAI-compatible API
    pub api_base: Option<String>,
    pub stt_provider: Option<SttBackend>,
    pub stt_model: Option<String>,
    pub embedding_model: Option<String>,
    pub llm_model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub tts_provider: Option<TtsBackend>,
    pub tts_model: Option<String>,
    pub tts_voice: Option<String>,
    pub tts_speed: Option<f32>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub deepgram: Option<String>,
    pub elevenlabs: Option<String>,
}

/// Load the TOML config file
///
/// An explicitly passed path must exist and parse. The default path is
/// optional: if it is missing or broken, defaults are used.
///
/// # Errors
///
/// Returns error if an explicit config file cannot be read or parsed
pub fn load_config_file(explicit: Option<&Path>) -> Result<HandbookConfigFile> {
    if let Some(path) = explicit {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "loaded config file");
        return Ok(config);
    }

    let Some(path) = config_file_path() else {
        return Ok(HandbookConfigFile::default());
    };

    if !path.exists() {
        return Ok(HandbookConfigFile::default());
    }

    let config = match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                HandbookConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            HandbookConfigFile::default()
        }
    };

    Ok(config)
}

/// Return the config file path: `~/.config/handbook-assistant/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("handbook-assistant").join("config.toml"))
}
