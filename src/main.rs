use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use murmur::agents::{
    AgentRegistry, FilesystemAgent, GeneralAgent, SpreadsheetAgent, WebSearchAgent,
};
use murmur::voice::{
    AudioCapture, AudioPlayback, DeepgramRecognizer, ElevenLabsSynthesizer, EnergyWakeGate,
    OpenAiSynthesizer, PlaybackSink, ResponseSynthesizer, SpeechRecognizer, WhisperRecognizer,
};
use murmur::{Config, Orchestrator};

/// Murmur - wake-word driven voice assistant
#[derive(Parser)]
#[command(name = "murmur", version, about)]
struct Cli {
    /// Wake phrase (overrides MURMUR_WAKE_PHRASE)
    #[arg(short, long, env = "MURMUR_WAKE_PHRASE")]
    wake_phrase: Option<String>,

    /// Workspace directory for file and spreadsheet agents
    #[arg(long, env = "MURMUR_WORKSPACE")]
    workspace: Option<std::path::PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
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
        0 => "info,murmur=info",
        1 => "info,murmur=debug",
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
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::TestTts { text } => test_tts(&text).await,
        };
    }

    let mut config = Config::load()?;
    if let Some(wake) = cli.wake_phrase {
        config.wake_phrase = wake.to_lowercase().trim().to_string();
    }
    if let Some(workspace) = cli.workspace {
        config.workspace_dir = workspace;
    }
    std::fs::create_dir_all(&config.workspace_dir)?;

    tracing::info!(
        wake_phrase = %config.wake_phrase,
        workspace = %config.workspace_dir.display(),
        "starting murmur"
    );

    let recognizer = build_recognizer(&config)?;
    let synthesizer = build_synthesizer(&config)?;
    let playback: Arc<dyn PlaybackSink> = Arc::new(AudioPlayback::new()?);
    let registry = Arc::new(build_registry(&config));
    let gate = Box::new(EnergyWakeGate::new(vec![config.wake_phrase.clone()]));

    let (frames_tx, frames_rx) = mpsc::channel(256);
    let shutdown = CancellationToken::new();

    let orchestrator = Orchestrator::new(
        config.wake_phrase.clone(),
        config.orchestrator.clone(),
        gate,
        recognizer,
        synthesizer,
        playback,
        registry,
        frames_rx,
        shutdown.clone(),
    );
    let orchestrator_handle = tokio::spawn(orchestrator.run());

    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown_signal.cancel();
        }
    });

    // The cpal stream is not Send, so capture polling stays on this task
    let mut capture = AudioCapture::new()?;
    capture.start()?;
    tracing::info!("murmur ready - say \"{}\"", config.wake_phrase);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            () = tokio::time::sleep(Duration::from_millis(20)) => {
                for frame in capture.take_frames() {
                    if frames_tx.send(frame).await.is_err() {
                        shutdown.cancel();
                        break;
                    }
                }
            }
        }
    }

    capture.stop();
    orchestrator_handle.await??;

    tracing::info!("murmur stopped");
    Ok(())
}

fn build_recognizer(config: &Config) -> anyhow::Result<Arc<dyn SpeechRecognizer>> {
    let recognizer: Arc<dyn SpeechRecognizer> = match config.voice.stt_provider.as_str() {
        "deepgram" => Arc::new(DeepgramRecognizer::new(
            config.api_keys.deepgram.clone().unwrap_or_default(),
            config.voice.stt_model.clone(),
        )?),
        _ => Arc::new(WhisperRecognizer::new(
            config.api_keys.openai.clone().unwrap_or_default(),
            config.voice.stt_model.clone(),
        )?),
    };
    Ok(recognizer)
}

fn build_synthesizer(config: &Config) -> anyhow::Result<Arc<dyn ResponseSynthesizer>> {
    let synthesizer: Arc<dyn ResponseSynthesizer> = match config.voice.tts_provider.as_str() {
        "elevenlabs" => Arc::new(ElevenLabsSynthesizer::new(
            config.api_keys.elevenlabs.clone().unwrap_or_default(),
            config.voice.tts_voice.clone(),
            config.voice.tts_model.clone(),
        )?),
        _ => Arc::new(OpenAiSynthesizer::new(
            config.api_keys.openai.clone().unwrap_or_default(),
            config.voice.tts_voice.clone(),
            config.voice.tts_speed,
            config.voice.tts_model.clone(),
        )?),
    };
    Ok(synthesizer)
}

fn build_registry(config: &Config) -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    registry.register(Box::new(FilesystemAgent::new(config.workspace_dir.clone())));
    registry.register(Box::new(SpreadsheetAgent::new(config.workspace_dir.clone())));

    if let Some(key) = &config.api_keys.brave {
        registry.register(Box::new(WebSearchAgent::new_brave(key.clone())));
    } else if let Some(key) = &config.api_keys.serper {
        registry.register(Box::new(WebSearchAgent::new_serper(key.clone())));
    } else {
        tracing::info!("no search API key configured, web search agent disabled");
    }

    registry.register(Box::new(GeneralAgent::new("Murmur")));
    registry
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;

    let sample_rate = capture.sample_rate();
    println!("Sample rate: {sample_rate} Hz");
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let frames = capture.take_frames();
        let samples: Vec<f32> = frames.iter().flat_map(|f| f.samples.clone()).collect();
        let energy = murmur::voice::wake::calculate_energy(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

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

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let playback = AudioPlayback::new()?;

    // Generate 2 seconds of 440Hz sine wave at 24kHz sample rate
    let sample_rate = 24000_i32;
    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let num_samples = (sample_rate as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);

    let cancel = CancellationToken::new();
    playback.play_samples(samples, &cancel).await?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// Test TTS output
async fn test_tts(text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load()?;
    let synthesizer = build_synthesizer(&config)?;

    println!("Synthesizing speech...");
    let mp3_data = synthesizer.synthesize(text).await?;
    println!("Got {} bytes of audio data", mp3_data.len());

    // Check MP3 header
    if mp3_data.len() > 3 {
        println!(
            "First 4 bytes: {:02x} {:02x} {:02x} {:02x}",
            mp3_data[0], mp3_data[1], mp3_data[2], mp3_data[3]
        );
    }

    println!("Playing audio...");
    let playback = AudioPlayback::new()?;
    let cancel = CancellationToken::new();
    playback.play(mp3_data, &cancel).await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}
