//! Daemon - the voice assistant service
//!
//! Builds everything the session needs once at startup (providers, document
//! index, audio devices) and then runs the session loop until interrupted.
//! Any failure here is fatal and names the startup step it happened in.

use std::sync::Arc;

use crate::answer::AnswerGenerator;
use crate::error::StartupStep;
use crate::llm::{ChatClient, Generates};
use crate::rag::{Chunker, DocumentIndex, DocumentIndexer, Embedder, Embeds, Retriever, load_document};
use crate::session::{SessionLoop, TurnLog};
use crate::voice::{
    AudioCapture, AudioPlayback, SpeechToText, Speaker, Synthesizes, TextToSpeech, Transcribes,
    WakeWordGate,
};
use crate::{Config, Error, Result};

/// Model backends shared by the session
pub struct Providers {
    pub transcriber: Arc<dyn Transcribes>,
    pub embedder: Arc<dyn Embeds>,
    pub generator: Arc<dyn Generates>,
    pub tts: Arc<dyn Synthesizes>,
}

impl Providers {
    /// Construct the configured STT, embedding, chat and TTS clients
    ///
    /// # Errors
    ///
    /// Returns error if a backend's API key is missing
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            transcriber: Arc::new(SpeechToText::from_config(config)?),
            embedder: Arc::new(Embedder::from_config(config)?),
            generator: Arc::new(ChatClient::from_config(config)?),
            tts: Arc::new(TextToSpeech::from_config(config)?),
        })
    }
}

/// Construct the embedding client on its own, for the text-mode commands
///
/// # Errors
///
/// Returns a startup error tagged `ConfiguringProviders`
pub fn configure_embedder(config: &Config) -> Result<Embedder> {
    Embedder::from_config(config).map_err(|e| e.at_startup(StartupStep::ConfiguringProviders))
}

/// Read the source document and build (or load) its index
///
/// # Errors
///
/// Returns a startup error tagged `LoadingDocument` or `BuildingIndex`
pub async fn build_index(config: &Config, embedder: Arc<dyn Embeds>) -> Result<DocumentIndex> {
    let text = load_document(&config.document_path)
        .map_err(|e| e.at_startup(StartupStep::LoadingDocument))?;

    let cache_dir = config
        .retrieval
        .cache_index
        .then(|| config.index_cache_dir());

    DocumentIndexer::new(
        embedder,
        Chunker::new(config.retrieval.chunk_size, config.retrieval.chunk_overlap),
    )
    .with_cache_dir(cache_dir)
    .build(&text)
    .await
    .map_err(|e| e.at_startup(StartupStep::BuildingIndex))
}

/// The handbook assistant - owns the session loop
pub struct Daemon {
    session: SessionLoop,
}

impl Daemon {
    /// Build providers, index and audio devices
    ///
    /// # Errors
    ///
    /// Returns `Error::Startup` naming the step that failed
    #[allow(clippy::future_not_send)]
    pub async fn new(config: Config) -> Result<Self> {
        // Fail fast on a missing document before touching the network
        if !config.document_path.is_file() {
            return Err(Error::Document(format!(
                "{} not found",
                config.document_path.display()
            ))
            .at_startup(StartupStep::LoadingDocument));
        }

        let providers = Providers::from_config(&config)
            .map_err(|e| e.at_startup(StartupStep::ConfiguringProviders))?;

        let index = build_index(&config, Arc::clone(&providers.embedder)).await?;
        tracing::info!(
            document = %config.document_path.display(),
            chunks = index.len(),
            "document index ready"
        );

        let capture = AudioCapture::new(config.audio.sample_rate)
            .map_err(|e| e.at_startup(StartupStep::OpeningMicrophone))?;
        let playback =
            AudioPlayback::new().map_err(|e| e.at_startup(StartupStep::OpeningSpeaker))?;

        let mut gate = WakeWordGate::new(&config.wake.wake_word)
            .with_match_mode(config.wake.match_mode)
            .with_window(config.audio.wake_window)
            .with_energy_threshold(config.wake.energy_threshold)
            .with_max_failures(config.session.max_attempts);
        if config.wake.inline_queries {
            gate = gate.with_inline_queries(config.wake.inline_min_words);
        }

        let retriever = Retriever::new(Arc::new(index), Arc::clone(&providers.embedder))
            .with_threshold(config.retrieval.similarity_threshold);

        let speaker = Speaker::new(providers.tts, Box::new(playback), config.audio.sample_rate)
            .with_response_path(config.response_audio_path().map(Into::into));

        let session = SessionLoop::new(
            Box::new(capture),
            providers.transcriber,
            gate,
            retriever,
            AnswerGenerator::new(providers.generator),
            speaker,
        )
        .with_max_attempts(config.session.max_attempts)
        .with_query_window(config.audio.query_window)
        .with_query_audio_path(config.query_audio_path().map(Into::into))
        .with_turn_log(config.session.turn_log.clone().map(TurnLog::new));

        tracing::info!(wake_word = %config.wake.wake_word, "assistant ready");

        Ok(Self { session })
    }

    /// Run the session until Ctrl-C
    #[allow(clippy::future_not_send)]
    pub async fn run(mut self) {
        self.session.run().await;
    }
}
