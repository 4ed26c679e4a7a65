use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use handbook_assistant::config::Overrides;
use handbook_assistant::daemon::{build_index, configure_embedder};
use handbook_assistant::error::StartupStep;
use handbook_assistant::llm::ChatClient;
use handbook_assistant::rag::RetrievalResult;
use handbook_assistant::voice::{
    AudioCapture, AudioPlayback, Plays, Records, Speaker, TextToSpeech, sine_tone,
};
use handbook_assistant::{AnswerGenerator, Config, Daemon, Retriever};

/// Handbook - ask an insurance handbook questions by voice
#[derive(Parser)]
#[command(name = "handbook", version, about)]
struct Cli {
    /// Config file (default: ~/.config/handbook-assistant/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Source document to answer from
    #[arg(short, long, global = true)]
    document: Option<PathBuf>,

    /// Activation phrase
    #[arg(short, long, global = true)]
    wake_word: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Build the document index (or load it from cache) and report its size
    Index,
    /// Answer a typed question without the microphone
    Ask {
        /// The question
        question: String,
        /// Also speak the answer
        #[arg(long)]
        speak: bool,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,handbook_assistant=info",
        1 => "info,handbook_assistant=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let overrides = Overrides {
        config_path: cli.config,
        document: cli.document,
        wake_word: cli.wake_word,
    };

    let config = Config::load(&overrides).map_err(|e| e.at_startup(StartupStep::LoadingConfig))?;
    tracing::debug!(?config, "loaded configuration");

    match cli.command {
        Some(Command::Index) => index(&config).await,
        Some(Command::Ask { question, speak }) => ask(&config, &question, speak).await,
        Some(Command::TestMic { duration }) => test_mic(&config, duration).await,
        Some(Command::TestSpeaker) => test_speaker().await,
        Some(Command::TestTts { text }) => test_tts(&config, &text).await,
        None => {
            tracing::info!(
                document = %config.document_path.display(),
                wake_word = %config.wake.wake_word,
                "starting handbook assistant"
            );
            let daemon = Daemon::new(config).await?;
            daemon.run().await;
            Ok(())
        }
    }
}

/// Build the index and print what it holds
async fn index(config: &Config) -> anyhow::Result<()> {
    let embedder = configure_embedder(config)?;
    let index = build_index(config, Arc::new(embedder)).await?;

    println!("Document:  {}", config.document_path.display());
    println!("Chunks:    {}", index.len());
    println!("Dimension: {}", index.dimension());

    Ok(())
}

/// Text-mode turn: retrieve, generate and print
#[allow(clippy::future_not_send)]
async fn ask(config: &Config, question: &str, speak: bool) -> anyhow::Result<()> {
    let embedder = Arc::new(configure_embedder(config)?);
    let index = build_index(config, embedder.clone()).await?;

    let retriever = Retriever::new(Arc::new(index), embedder)
        .with_threshold(config.retrieval.similarity_threshold);
    let retrieval = retriever.search(question).await?;

    match &retrieval {
        RetrievalResult::Match(scored) => {
            println!("Matched chunk {} (score {:.3}):", scored.chunk.index, scored.score);
            println!("{}\n", scored.chunk.text);
        }
        RetrievalResult::NoMatch { best_score } => {
            let best = best_score.map_or_else(|| "n/a".to_string(), |s| format!("{s:.3}"));
            println!(
                "No chunk above threshold {:.2} (best {best})\n",
                retriever.threshold()
            );
        }
    }

    let chat = ChatClient::from_config(config)
        .map_err(|e| e.at_startup(StartupStep::ConfiguringProviders))?;
    let answerer = AnswerGenerator::new(Arc::new(chat));
    let answer = answerer.generate(question, &retrieval).await?;
    println!("{answer}");

    if speak {
        let tts = TextToSpeech::from_config(config)
            .map_err(|e| e.at_startup(StartupStep::ConfiguringProviders))?;
        let mut speaker = Speaker::new(
            Arc::new(tts),
            Box::new(AudioPlayback::new()?),
            config.audio.sample_rate,
        )
        .with_response_path(config.response_audio_path().map(Into::into));
        speaker.speak(&answer).await?;
    }

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(config: &Config, duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new(config.audio.sample_rate)?;

    println!("Sample rate: {} Hz", capture.sample_rate());
    println!("Wake gate threshold: {:.4}", config.wake.energy_threshold);
    println!("---");

    for i in 0..duration {
        let audio = capture.record(Duration::from_secs(1)).await?;
        let energy = audio.rms();
        let peak = audio.samples().iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed below the wake gate threshold, speech will be ignored.");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: arecord -l (to list devices)");
    println!("  3. Try: pavucontrol (to check levels)");

    Ok(())
}

/// Test speaker output with a sine wave
#[allow(clippy::future_not_send)]
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let mut playback = AudioPlayback::new()?;
    let tone = sine_tone(440.0, Duration::from_secs(2), 24000);

    println!(
        "Playing {} samples at {} Hz...",
        tone.samples().len(),
        tone.sample_rate()
    );
    playback.play(&tone).await?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// Test TTS output
#[allow(clippy::future_not_send)]
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let tts = TextToSpeech::from_config(config)
        .map_err(|e| e.at_startup(StartupStep::ConfiguringProviders))?;
    let mut speaker = Speaker::new(
        Arc::new(tts),
        Box::new(AudioPlayback::new()?),
        config.audio.sample_rate,
    )
    .with_response_path(config.response_audio_path().map(Into::into));

    println!("Synthesizing and playing...");
    let audio = speaker.speak(text).await?;
    println!(
        "Played {:.1}s of audio at {} Hz",
        audio.duration().as_secs_f32(),
        audio.sample_rate()
    );

    if let Some(path) = config.response_audio_path() {
        println!("Wrote {}", path.display());
    }

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}
