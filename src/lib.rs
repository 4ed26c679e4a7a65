//! Handbook Assistant - voice question answering over an insurance handbook
//!
//! This library provides the pieces of the assistant:
//! - Voice processing (capture, wake word gate, STT, TTS, playback)
//! - Retrieval (chunking, embedding, similarity search)
//! - Grounded answer generation
//! - The session loop tying them together
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    Session Loop                       │
//! │  Wake Word → Capture → STT → Retrieve → Answer → TTS  │
//! └──────────────────────────┬───────────────────────────┘
//!                            │
//! ┌──────────────────────────▼───────────────────────────┐
//! │                 Capability traits                     │
//! │  Records │ Transcribes │ Embeds │ Generates │ Plays   │
//! └──────────────────────────┬───────────────────────────┘
//!                            │
//! ┌──────────────────────────▼───────────────────────────┐
//! │        Backends (cpal, OpenAI-compatible APIs)        │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod answer;
pub mod config;
pub mod daemon;
pub mod error;
pub mod llm;
pub mod rag;
pub mod session;
pub mod voice;

pub use answer::AnswerGenerator;
pub use config::Config;
pub use daemon::Daemon;
pub use error::{Error, Result, StartupStep};
pub use llm::{ChatClient, Generates, Prompt};
pub use rag::{DocumentIndex, DocumentIndexer, RetrievalResult, Retriever};
pub use session::{ConversationTurn, SessionLoop, TurnOutcome};
