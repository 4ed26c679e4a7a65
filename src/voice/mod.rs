//! Voice processing module
//!
//! Handles audio capture, wake word gating, speech-to-text, text-to-speech
//! and playback. Hardware and network backends sit behind the `Records`,
//! `Transcribes`, `Synthesizes` and `Plays` traits.

mod audio;
mod capture;
mod playback;
mod speaker;
mod stt;
mod tts;
mod wake_word;

pub use audio::{AudioBuffer, SAMPLE_RATE, calculate_energy, downmix, resample_audio, samples_to_wav};
pub use capture::{AudioCapture, Records};
pub use playback::{AudioPlayback, Plays, sine_tone};
pub use speaker::Speaker;
pub use stt::{SpeechToText, Transcribes};
pub use tts::{Synthesizes, TextToSpeech};
pub use wake_word::{GateEvent, GateState, INLINE_MIN_WORDS, WakeMatch, WakeWordGate};
