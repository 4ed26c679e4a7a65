//! Conversational session loop
//!
//! One turn: wait for the wake word, capture and transcribe the query,
//! retrieve, generate, speak. Per-turn failures end the turn with a spoken
//! notice; nothing inside a turn can stop the loop.

mod turn_log;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

pub use turn_log::TurnLog;

use crate::answer::AnswerGenerator;
use crate::config::MAX_ATTEMPTS;
use crate::rag::{RetrievalResult, Retriever};
use crate::voice::{GateEvent, GateState, Records, Speaker, Transcribes, WakeWordGate};

/// Spoken when no usable query was heard
pub const NOT_HEARD_NOTICE: &str = "Sorry, I didn't catch that. Say the wake word to try again.";

/// Spoken when the wake word gate gives up on repeated capture errors
pub const REPROMPT_NOTICE: &str =
    "I'm having trouble hearing you. Please check the microphone and say the wake word again.";

/// Spoken when the handbook search fails
pub const RETRIEVAL_FAILED_NOTICE: &str = "Sorry, I couldn't search the handbook just now.";

/// Spoken when no answer could be generated
pub const GENERATION_FAILED_NOTICE: &str = "Sorry, I couldn't come up with an answer. Please try again.";

/// Default query recording window
const QUERY_WINDOW: Duration = Duration::from_secs(5);

/// An answered query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationTurn {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub query: String,
    pub retrieval: RetrievalResult,
    pub answer: String,
}

impl ConversationTurn {
    #[must_use]
    pub fn new(query: String, retrieval: RetrievalResult, answer: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            query,
            retrieval,
            answer,
        }
    }
}

/// Why a turn ended without an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    /// No usable transcript within the attempt bound
    NotHeard { attempts: u32 },
    RetrievalFailed,
    GenerationFailed,
    PlaybackFailed,
}

/// How a turn ended
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Answered(ConversationTurn),
    Abandoned(AbandonReason),
    /// The wake word gate hit its failure bound
    Reprompted,
}

/// Drives wake word, capture, retrieval, generation and speech
pub struct SessionLoop {
    recorder: Box<dyn Records>,
    transcriber: Arc<dyn Transcribes>,
    gate: WakeWordGate,
    retriever: Retriever,
    answerer: AnswerGenerator,
    speaker: Speaker,
    max_attempts: u32,
    query_window: Duration,
    query_audio_path: Option<PathBuf>,
    turn_log: Option<TurnLog>,
}

impl SessionLoop {
    #[must_use]
    pub fn new(
        recorder: Box<dyn Records>,
        transcriber: Arc<dyn Transcribes>,
        gate: WakeWordGate,
        retriever: Retriever,
        answerer: AnswerGenerator,
        speaker: Speaker,
    ) -> Self {
        Self {
            recorder,
            transcriber,
            gate,
            retriever,
            answerer,
            speaker,
            max_attempts: MAX_ATTEMPTS,
            query_window: QUERY_WINDOW,
            query_audio_path: None,
            turn_log: None,
        }
    }

    /// Bound on capture/transcription attempts per query
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub const fn with_query_window(mut self, window: Duration) -> Self {
        self.query_window = window;
        self
    }

    /// Write each captured query to this WAV file
    #[must_use]
    pub fn with_query_audio_path(mut self, path: Option<PathBuf>) -> Self {
        self.query_audio_path = path;
        self
    }

    #[must_use]
    pub fn with_turn_log(mut self, log: Option<TurnLog>) -> Self {
        self.turn_log = log;
        self
    }

    #[must_use]
    pub const fn gate_state(&self) -> GateState {
        self.gate.state()
    }

    /// Run turns until `shutdown` resolves
    ///
    /// A turn in progress is dropped when shutdown fires.
    #[allow(clippy::future_not_send)]
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut answered = 0_u64;

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!(answered, "shutdown requested");
                    break;
                }
                outcome = self.run_turn() => {
                    if matches!(outcome, TurnOutcome::Answered(_)) {
                        answered += 1;
                    }
                }
            }
        }

        self.gate.reset();
    }

    /// Run turns until Ctrl-C
    #[allow(clippy::future_not_send)]
    pub async fn run(&mut self) {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await;
    }

    /// Run a single turn, always returning to wake word listening
    #[allow(clippy::future_not_send)]
    pub async fn run_turn(&mut self) -> TurnOutcome {
        let outcome = self.turn().await;
        self.gate.reset();

        match &outcome {
            TurnOutcome::Answered(turn) => tracing::info!(turn = %turn.id, "turn answered"),
            TurnOutcome::Abandoned(reason) => tracing::warn!(?reason, "turn abandoned"),
            TurnOutcome::Reprompted => tracing::warn!("wake word listening reprompted"),
        }

        outcome
    }

    #[allow(clippy::future_not_send)]
    async fn turn(&mut self) -> TurnOutcome {
        let event = self
            .gate
            .listen(self.recorder.as_mut(), self.transcriber.as_ref())
            .await;

        let query = match event {
            GateEvent::Reprompt { failures } => {
                tracing::warn!(failures, "wake word capture keeps failing");
                self.announce(REPROMPT_NOTICE).await;
                return TurnOutcome::Reprompted;
            }
            GateEvent::Activated {
                trailing: Some(query),
            } if is_usable(&query) => {
                tracing::info!(query = %query, "query spoken with wake word");
                query
            }
            GateEvent::Activated { .. } => match self.capture_query().await {
                Some(query) => query,
                None => {
                    self.announce(NOT_HEARD_NOTICE).await;
                    return TurnOutcome::Abandoned(AbandonReason::NotHeard {
                        attempts: self.max_attempts,
                    });
                }
            },
        };

        let retrieval = match self.retriever.search(&query).await {
            Ok(retrieval) => retrieval,
            Err(e) => {
                tracing::error!(error = %e, "retrieval failed");
                self.announce(RETRIEVAL_FAILED_NOTICE).await;
                return TurnOutcome::Abandoned(AbandonReason::RetrievalFailed);
            }
        };

        let answer = match self.answerer.generate(&query, &retrieval).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!(error = %e, "answer generation failed");
                self.announce(GENERATION_FAILED_NOTICE).await;
                return TurnOutcome::Abandoned(AbandonReason::GenerationFailed);
            }
        };

        let turn = ConversationTurn::new(query, retrieval, answer);

        if let Err(e) = self.speaker.speak(&turn.answer).await {
            tracing::error!(error = %e, "failed to speak answer");
            return TurnOutcome::Abandoned(AbandonReason::PlaybackFailed);
        }

        if let Some(log) = &self.turn_log {
            if let Err(e) = log.append(&turn) {
                tracing::warn!(path = %log.path().display(), error = %e, "failed to log turn");
            }
        }

        TurnOutcome::Answered(turn)
    }

    /// Record and transcribe until a usable query is heard
    ///
    /// Capture errors, transcription errors and blank transcripts each use
    /// up one attempt.
    #[allow(clippy::future_not_send)]
    async fn capture_query(&mut self) -> Option<String> {
        tracing::info!(window_ms = self.query_window.as_millis(), "listening for query");

        for attempt in 1..=self.max_attempts {
            let audio = match self.recorder.record(self.query_window).await {
                Ok(audio) => audio,
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "query capture failed");
                    continue;
                }
            };

            if let Some(path) = &self.query_audio_path {
                if let Err(e) = audio.write_wav(path) {
                    tracing::warn!(path = %path.display(), error = %e, "failed to write query audio");
                }
            }

            match self.transcriber.transcribe(&audio).await {
                Ok(text) if is_usable(&text) => {
                    tracing::info!(attempt, query = %text, "query heard");
                    return Some(text.trim().to_string());
                }
                Ok(text) => tracing::debug!(attempt, transcript = %text, "unusable transcript"),
                Err(e) => tracing::warn!(attempt, error = %e, "query transcription failed"),
            }
        }

        None
    }

    #[allow(clippy::future_not_send)]
    async fn announce(&mut self, notice: &str) {
        if let Err(e) = self.speaker.speak(notice).await {
            tracing::warn!(error = %e, notice, "failed to speak notice");
        }
    }
}

/// A transcript worth answering has at least one letter or digit
fn is_usable(transcript: &str) -> bool {
    transcript.chars().any(char::is_alphanumeric)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_noise_transcripts_are_unusable() {
        assert!(!is_usable(""));
        assert!(!is_usable("   "));
        assert!(!is_usable("..."));
        assert!(is_usable("Is flood covered?"));
    }
}
