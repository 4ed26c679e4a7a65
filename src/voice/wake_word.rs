//! Wake word gate
//!
//! Listens in short windows, transcribes each one and checks the transcript
//! for the activation phrase. Silent windows (by RMS) are skipped without a
//! round trip to the STT backend.

use std::time::Duration;

use serde::Deserialize;

use super::capture::Records;
use super::stt::Transcribes;

/// Default listening window
const WINDOW: Duration = Duration::from_secs(3);

/// Default bound on consecutive capture or transcription failures
const MAX_FAILURES: u32 = 5;

/// Default minimum words for a query spoken with the wake word
pub const INLINE_MIN_WORDS: usize = 3;

/// How a transcript is matched against the wake word
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WakeMatch {
    /// Wake word tokens must appear as consecutive whole words
    #[default]
    Word,
    /// Case-insensitive substring anywhere in the transcript
    Substring,
}

/// State of the wake word gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Waiting for the wake word
    Listening,
    /// Wake word heard, query capture unlocked
    Activated,
}

/// Outcome of one call to [`WakeWordGate::listen`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateEvent {
    /// Wake word heard; `trailing` is a query spoken in the same breath,
    /// present only when inline queries are enabled and it looks like one
    Activated { trailing: Option<String> },
    /// Too many consecutive failures; the user should be re-prompted
    Reprompt { failures: u32 },
}

/// Gates query capture behind a spoken activation phrase
#[derive(Debug, Clone)]
pub struct WakeWordGate {
    wake_word: String,
    tokens: Vec<String>,
    mode: WakeMatch,
    window: Duration,
    max_failures: u32,
    energy_threshold: f32,
    inline_min_words: Option<usize>,
    state: GateState,
}

impl WakeWordGate {
    /// Create a gate for `wake_word` (e.g. "hi")
    #[must_use]
    pub fn new(wake_word: &str) -> Self {
        let wake_word = wake_word.trim().to_lowercase();
        let tokens = words(&wake_word).into_iter().map(|w| w.text).collect();

        tracing::debug!(wake_word, "wake word gate initialized");

        Self {
            wake_word,
            tokens,
            mode: WakeMatch::default(),
            window: WINDOW,
            max_failures: MAX_FAILURES,
            energy_threshold: 0.0,
            inline_min_words: None,
            state: GateState::Listening,
        }
    }

    /// Length of each listening window
    #[must_use]
    pub const fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Consecutive failures tolerated before asking for a reprompt
    #[must_use]
    pub fn with_max_failures(mut self, max_failures: u32) -> Self {
        self.max_failures = max_failures.max(1);
        self
    }

    /// Skip transcription of windows quieter than `threshold` RMS
    #[must_use]
    pub const fn with_energy_threshold(mut self, threshold: f32) -> Self {
        self.energy_threshold = threshold;
        self
    }

    /// Accept a query spoken right after the wake word
    ///
    /// Only applies in word mode, and only to trailing text of at least
    /// `min_words` words. Anything shorter ("hi there") is treated as a
    /// greeting and the query is captured separately.
    #[must_use]
    pub fn with_inline_queries(mut self, min_words: usize) -> Self {
        self.inline_min_words = Some(min_words.max(1));
        self
    }

    #[must_use]
    pub const fn with_match_mode(mut self, mode: WakeMatch) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub const fn state(&self) -> GateState {
        self.state
    }

    #[must_use]
    pub fn wake_word(&self) -> &str {
        &self.wake_word
    }

    /// Return to listening after a turn
    pub fn reset(&mut self) {
        self.state = GateState::Listening;
    }

    /// Listen until the wake word is heard or failures pile up
    ///
    /// Windows that transcribe to something other than the wake word are not
    /// failures; only capture and transcription errors count, and a
    /// successful transcription clears the count.
    pub async fn listen(&mut self, recorder: &mut dyn Records, transcriber: &dyn Transcribes) -> GateEvent {
        self.state = GateState::Listening;
        let mut failures = 0;

        tracing::info!(wake_word = %self.wake_word, "listening for wake word");

        loop {
            let audio = match recorder.record(self.window).await {
                Ok(audio) => audio,
                Err(e) => {
                    failures += 1;
                    tracing::warn!(error = %e, failures, "wake window capture failed");
                    if failures >= self.max_failures {
                        return GateEvent::Reprompt { failures };
                    }
                    continue;
                }
            };

            let energy = audio.rms();
            if energy < self.energy_threshold {
                tracing::trace!(energy, "silent window");
                continue;
            }

            let transcript = match transcriber.transcribe(&audio).await {
                Ok(transcript) => transcript,
                Err(e) => {
                    failures += 1;
                    tracing::warn!(error = %e, failures, "wake window transcription failed");
                    if failures >= self.max_failures {
                        return GateEvent::Reprompt { failures };
                    }
                    continue;
                }
            };
            failures = 0;

            if let Some(trailing) = self.detect(&transcript) {
                tracing::info!(transcript = %transcript, "wake word detected");
                self.state = GateState::Activated;
                let trailing = self.inline_query(trailing);
                return GateEvent::Activated { trailing };
            }

            tracing::debug!(transcript = %transcript, "no wake word");
        }
    }

    /// Check a transcript for the wake word
    ///
    /// Returns the text following the wake word (possibly empty) on a match.
    #[must_use]
    pub fn detect(&self, transcript: &str) -> Option<String> {
        let rest = match self.mode {
            WakeMatch::Word => self.detect_words(transcript)?,
            WakeMatch::Substring => self.detect_substring(transcript)?,
        };
        Some(
            rest.trim_start_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
                .trim_end()
                .to_string(),
        )
    }

    /// Keep trailing text as a query only if inline queries allow it
    fn inline_query(&self, trailing: String) -> Option<String> {
        let min_words = self.inline_min_words?;
        if self.mode != WakeMatch::Word {
            return None;
        }

        let usable = trailing.chars().any(char::is_alphanumeric);
        (usable && words(&trailing).len() >= min_words).then_some(trailing)
    }

    fn detect_words<'a>(&self, transcript: &'a str) -> Option<&'a str> {
        if self.tokens.is_empty() {
            return None;
        }

        let spoken = words(transcript);
        let n = self.tokens.len();

        spoken
            .windows(n)
            .find(|window| window.iter().zip(&self.tokens).all(|(w, t)| w.text == *t))
            .map(|window| &transcript[window[n - 1].end..])
    }

    fn detect_substring<'a>(&self, transcript: &'a str) -> Option<&'a str> {
        let lower = transcript.to_lowercase();
        let pos = lower.find(&self.wake_word)?;

        // Lowercasing can change byte lengths outside ASCII
        let end = pos + self.wake_word.len();
        if lower.len() == transcript.len() && transcript.is_char_boundary(end) {
            Some(&transcript[end..])
        } else {
            Some("")
        }
    }
}

/// A lowercased word and the byte offset just past it
struct Word {
    text: String,
    end: usize,
}

fn words(text: &str) -> Vec<Word> {
    let mut out = Vec::new();
    let mut current = String::new();

    for (i, c) in text.char_indices() {
        if c.is_alphanumeric() || c == '\'' {
            current.extend(c.to_lowercase());
        } else if !current.is_empty() {
            out.push(Word {
                text: std::mem::take(&mut current),
                end: i,
            });
        }
    }
    if !current.is_empty() {
        out.push(Word {
            text: current,
            end: text.len(),
        });
    }

    out
}
