//! Error types for the handbook assistant

use std::fmt;

use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, Error>;

/// Startup phase that was running when a fatal error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupStep {
    /// Reading and validating configuration
    LoadingConfig,
    /// Reading the source document
    LoadingDocument,
    /// Constructing STT, embedding, LLM and TTS clients
    ConfiguringProviders,
    /// Splitting and embedding the document
    BuildingIndex,
    /// Opening the input device
    OpeningMicrophone,
    /// Opening the output device
    OpeningSpeaker,
}

impl fmt::Display for StartupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            Self::LoadingConfig => "loading configuration",
            Self::LoadingDocument => "loading source document",
            Self::ConfiguringProviders => "configuring model providers",
            Self::BuildingIndex => "building document index",
            Self::OpeningMicrophone => "opening microphone",
            Self::OpeningSpeaker => "opening speaker",
        };
        f.write_str(step)
    }
}

/// Errors that can occur in the assistant
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Source document missing, unreadable or empty
    #[error("document error: {0}")]
    Document(String),

    /// Audio device or codec error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Embedding error
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Document index construction error
    #[error("index error: {0}")]
    Index(String),

    /// Answer generation error
    #[error("generation error: {0}")]
    Generation(String),

    /// Fatal error raised while starting up
    #[error("startup failed while {step}: {source}")]
    Startup {
        step: StartupStep,
        #[source]
        source: Box<Error>,
    },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// WAV encoding/decoding error
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),
}

impl Error {
    /// Wrap this error as a fatal failure of `step`
    #[must_use]
    pub fn at_startup(self, step: StartupStep) -> Self {
        Self::Startup {
            step,
            source: Box::new(self),
        }
    }

    /// Startup step that failed, if this is a startup error
    #[must_use]
    pub const fn startup_step(&self) -> Option<StartupStep> {
        match self {
            Self::Startup { step, .. } => Some(*step),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_error_names_step() {
        let err = Error::Document("handbook.txt not found".to_string())
            .at_startup(StartupStep::LoadingDocument);

        assert_eq!(err.startup_step(), Some(StartupStep::LoadingDocument));
        assert_eq!(
            err.to_string(),
            "startup failed while loading source document: document error: handbook.txt not found"
        );
    }

    #[test]
    fn non_startup_error_has_no_step() {
        assert!(Error::Stt("timeout".to_string()).startup_step().is_none());
    }
}
