//! Spoken output: synthesize, persist, play

use std::path::PathBuf;
use std::sync::Arc;

use super::audio::AudioBuffer;
use super::playback::Plays;
use super::tts::Synthesizes;
use crate::Result;

/// Speaks text through a TTS backend and an output device
pub struct Speaker {
    tts: Arc<dyn Synthesizes>,
    player: Box<dyn Plays>,
    sample_rate: u32,
    response_path: Option<PathBuf>,
}

impl Speaker {
    /// Speaker whose response artifact is written at `sample_rate`
    #[must_use]
    pub fn new(tts: Arc<dyn Synthesizes>, player: Box<dyn Plays>, sample_rate: u32) -> Self {
        Self {
            tts,
            player,
            sample_rate,
            response_path: None,
        }
    }

    /// Also write each utterance to this WAV file
    #[must_use]
    pub fn with_response_path(mut self, path: Option<PathBuf>) -> Self {
        self.response_path = path;
        self
    }

    /// Synthesize `text` and play it at the backend's native rate
    ///
    /// The response artifact gets a copy resampled to `sample_rate`; failing
    /// to produce or write it is logged, not returned.
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or playback fails
    pub async fn speak(&mut self, text: &str) -> Result<AudioBuffer> {
        tracing::debug!(text, "speaking");

        let audio = self.tts.synthesize(text).await?;

        if let Some(path) = &self.response_path {
            let written = audio
                .clone()
                .resampled(self.sample_rate)
                .and_then(|artifact| artifact.write_wav(path));
            if let Err(e) = written {
                tracing::warn!(path = %path.display(), error = %e, "failed to write response audio");
            }
        }

        self.player.play(&audio).await?;
        Ok(audio)
    }

    /// Play pre-rendered audio
    ///
    /// # Errors
    ///
    /// Returns error if playback fails
    pub async fn play(&mut self, audio: &AudioBuffer) -> Result<()> {
        self.player.play(audio).await
    }
}
