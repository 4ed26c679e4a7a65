//! Shared test utilities
//!
//! Scripted stand-ins for the microphone, speech and model backends so the
//! pipeline runs without audio hardware or network access.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use handbook_assistant::llm::{Generates, Prompt};
use handbook_assistant::rag::{Chunker, DocumentIndex, DocumentIndexer, Embeds, Retriever};
use handbook_assistant::session::{SessionLoop, TurnLog};
use handbook_assistant::voice::{
    AudioBuffer, Plays, Records, SAMPLE_RATE, Speaker, Synthesizes, Transcribes, WakeWordGate,
};
use handbook_assistant::{AnswerGenerator, Error, Result};

/// The two-sentence handbook used across tests
pub const FLOOD_DOC: &str =
    "Flood damage is covered under Section 4. Fire damage is covered under Section 7.";

/// A one-page PDF showing `text` in Helvetica
///
/// `text` must not contain parentheses or backslashes.
pub fn single_page_pdf(text: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET");
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
         /Resources << /Font << /F1 5 0 R >> >> /Contents 4 0 R >>"
            .to_string(),
        format!("<< /Length {} >>\nstream\n{content}\nendstream", content.len()),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_string(),
    ];

    let mut pdf = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
    }

    let xref = pdf.len();
    let mut table = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        table.push_str(&format!("{offset:010} 00000 n \n"));
    }
    table.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref}\n%%EOF\n",
        objects.len() + 1
    ));
    pdf.extend_from_slice(table.as_bytes());
    pdf
}

/// Words the keyword embedder knows, one dimension each
const VOCABULARY: [&str; 7] = ["flood", "fire", "damage", "covered", "section", "capital", "france"];

/// Bag-of-words embedder over a fixed vocabulary
#[derive(Default)]
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn vector(text: &str) -> Vec<f32> {
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();

        VOCABULARY
            .iter()
            .map(|term| if words.iter().any(|w| w == term) { 1.0 } else { 0.0 })
            .collect()
    }
}

#[async_trait]
impl Embeds for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::vector(text))
    }

    fn model_id(&self) -> &str {
        "keyword-test"
    }
}

/// Returns buffers at scripted RMS levels, then `default_level` forever
pub struct ScriptedRecorder {
    levels: VecDeque<f32>,
    default_level: f32,
    failing: bool,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedRecorder {
    /// Every recording is loud enough to pass the energy gate
    pub fn loud() -> Self {
        Self::with_levels(&[], 0.5)
    }

    pub fn with_levels(levels: &[f32], default_level: f32) -> Self {
        Self {
            levels: levels.iter().copied().collect(),
            default_level,
            failing: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every recording fails as if the device vanished
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::loud()
        }
    }
}

#[async_trait(?Send)]
impl Records for ScriptedRecorder {
    async fn record(&mut self, _duration: Duration) -> Result<AudioBuffer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(Error::Audio("device unplugged".to_string()));
        }
        let level = self.levels.pop_front().unwrap_or(self.default_level);
        Ok(AudioBuffer::new(vec![level; 1600], SAMPLE_RATE))
    }
}

/// Replays transcripts in order; `None` entries and an exhausted script fail
pub struct ScriptedTranscriber {
    script: Mutex<VecDeque<Option<String>>>,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedTranscriber {
    pub fn new(transcripts: &[&str]) -> Self {
        Self::from_script(transcripts.iter().map(|t| Some((*t).to_string())).collect())
    }

    pub fn from_script(script: Vec<Option<String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Transcribes for ScriptedTranscriber {
    async fn transcribe(&self, _audio: &AudioBuffer) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Some(text)) => Ok(text),
            Some(None) => Err(Error::Stt("scripted failure".to_string())),
            None => Err(Error::Stt("script exhausted".to_string())),
        }
    }
}

/// Captures every prompt and answers with a fixed reply
pub struct RecordingGenerator {
    reply: Option<String>,
    pub prompts: Arc<Mutex<Vec<Prompt>>>,
}

impl RecordingGenerator {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            prompts: Arc::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            prompts: Arc::default(),
        }
    }
}

#[async_trait]
impl Generates for RecordingGenerator {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.clone());
        self.reply
            .clone()
            .ok_or_else(|| Error::Generation("model unavailable".to_string()))
    }
}

/// Records spoken text and returns a short 24 kHz tone-free buffer
#[derive(Default)]
pub struct RecordingSynthesizer {
    pub spoken: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Synthesizes for RecordingSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<AudioBuffer> {
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(AudioBuffer::new(vec![0.1; 2400], 24000))
    }
}

/// Output device that plays nothing, noting the rate of each buffer
#[derive(Default)]
pub struct NullPlayer {
    pub fail: bool,
    pub plays: Arc<AtomicUsize>,
    pub rates: Arc<Mutex<Vec<u32>>>,
}

#[async_trait(?Send)]
impl Plays for NullPlayer {
    async fn play(&mut self, audio: &AudioBuffer) -> Result<()> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        self.rates.lock().unwrap().push(audio.sample_rate());
        if self.fail {
            return Err(Error::Audio("output device busy".to_string()));
        }
        Ok(())
    }
}

/// Index `text` with the keyword embedder, splitting per sentence
pub async fn keyword_index(text: &str, embedder: Arc<KeywordEmbedder>) -> DocumentIndex {
    DocumentIndexer::new(embedder, Chunker::new(45, 0))
        .build(text)
        .await
        .unwrap()
}

/// A session wired to scripted collaborators, plus handles to inspect them
pub struct Harness {
    pub session: SessionLoop,
    pub recorder_calls: Arc<AtomicUsize>,
    pub transcriber_calls: Arc<AtomicUsize>,
    pub prompts: Arc<Mutex<Vec<Prompt>>>,
    pub spoken: Arc<Mutex<Vec<String>>>,
    pub plays: Arc<AtomicUsize>,
}

/// Options for [`harness`]
pub struct HarnessOptions<'a> {
    pub recorder: ScriptedRecorder,
    pub transcriber: ScriptedTranscriber,
    pub generator: RecordingGenerator,
    pub player: NullPlayer,
    pub artifacts: Option<&'a Path>,
    /// Minimum words for an inline query; `None` keeps them disabled
    pub inline_min_words: Option<usize>,
}

impl HarnessOptions<'_> {
    pub fn new(transcripts: &[&str]) -> Self {
        Self {
            recorder: ScriptedRecorder::loud(),
            transcriber: ScriptedTranscriber::new(transcripts),
            generator: RecordingGenerator::replying("Yes, flood damage is covered under Section 4."),
            player: NullPlayer::default(),
            artifacts: None,
            inline_min_words: None,
        }
    }
}

/// Build a session over [`FLOOD_DOC`] with wake word "hi"
pub async fn harness(options: HarnessOptions<'_>) -> Harness {
    let embedder = Arc::new(KeywordEmbedder::default());
    let index = keyword_index(FLOOD_DOC, Arc::clone(&embedder)).await;

    let recorder_calls = Arc::clone(&options.recorder.calls);
    let transcriber_calls = Arc::clone(&options.transcriber.calls);
    let prompts = Arc::clone(&options.generator.prompts);
    let plays = Arc::clone(&options.player.plays);

    let synthesizer = RecordingSynthesizer::default();
    let spoken = Arc::clone(&synthesizer.spoken);

    let artifacts = options.artifacts;
    let speaker = Speaker::new(Arc::new(synthesizer), Box::new(options.player), SAMPLE_RATE)
        .with_response_path(artifacts.map(|dir| dir.join("response.wav")));

    let mut gate = WakeWordGate::new("hi");
    if let Some(min_words) = options.inline_min_words {
        gate = gate.with_inline_queries(min_words);
    }

    let session = SessionLoop::new(
        Box::new(options.recorder),
        Arc::new(options.transcriber),
        gate,
        Retriever::new(Arc::new(index), embedder),
        AnswerGenerator::new(Arc::new(options.generator)),
        speaker,
    )
    .with_query_audio_path(artifacts.map(|dir| dir.join("user_input.wav")))
    .with_turn_log(artifacts.map(|dir| TurnLog::new(dir.join("turns.jsonl"))));

    Harness {
        session,
        recorder_calls,
        transcriber_calls,
        prompts,
        spoken,
        plays,
    }
}
