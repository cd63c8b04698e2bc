use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use dialoguer::Select;
use tracing_subscriber::EnvFilter;

use neon_assistant::voice::{
    self, AudioOutput, ClipWriter, CpalOutput, Microphone, PLAYBACK_SAMPLE_RATE, Speaker,
    TextToSpeech,
};
use neon_assistant::{
    Config, Event, Phase, Step, VideoClient, VideoConversationRequest, VoiceServices, VoiceSession,
};

/// Neon - Voice and video front-end for the Neon AI assistant
#[derive(Parser)]
#[command(name = "neon", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Talk to Neon turn by turn (default)
    Voice {
        /// Deliver replies as MP3 clips instead of playing them locally
        #[arg(long, requires = "clip_dir")]
        no_speaker: bool,

        /// Directory that receives reply clips
        #[arg(long, env = "NEON_CLIP_DIR")]
        clip_dir: Option<PathBuf>,
    },
    /// Start a face-to-face video conversation and print its link
    Video,
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
        #[arg(default_value = "Hello! I'm Neon, your AI knowledge assistant.")]
        text: String,
    },
}

/// Menu entries offered to the user
#[derive(Debug, Clone, Copy)]
enum Action {
    Record,
    Play,
    NewConversation,
    Quit,
}

impl Action {
    const fn label(self) -> &'static str {
        match self {
            Self::Record => "Start recording",
            Self::Play => "Play response",
            Self::NewConversation => "Start new conversation",
            Self::Quit => "Quit",
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,neon_assistant=info",
        1 => "info,neon_assistant=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!(error = %e, "no .env file loaded");
    }

    let code = match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    };

    voice::purge_deferred();
    code
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Command::Voice {
        no_speaker: false,
        clip_dir: None,
    }) {
        Command::Voice {
            no_speaker,
            clip_dir,
        } => voice_assistant(no_speaker, clip_dir).await,
        Command::Video => video_chat().await,
        Command::TestMic { duration } => test_mic(duration).await,
        Command::TestSpeaker => test_speaker().await,
        Command::TestTts { text } => test_tts(&text).await,
    }
}

/// Interactive voice loop; each menu choice is one event for the session
#[allow(clippy::future_not_send)]
async fn voice_assistant(no_speaker: bool, clip_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let config = Config::load()?;
    tracing::debug!(?config, "loaded configuration");

    let output: Box<dyn AudioOutput> = match clip_dir {
        Some(dir) if no_speaker => Box::new(ClipWriter::new(dir)?),
        _ => Box::new(Speaker::new()),
    };
    let input = Box::new(Microphone::new()?);

    let services = VoiceServices::from_config(&config, input, output)?;
    let mut session = VoiceSession::from_config(&config, services);

    println!("Neon Voice Assistant - speak with Neon using your microphone\n");

    loop {
        let actions = menu(&session);
        let labels: Vec<&str> = actions.iter().map(|a| a.label()).collect();

        let choice = Select::new()
            .with_prompt("What would you like to do?")
            .items(&labels)
            .default(0)
            .interact()?;

        match actions[choice] {
            Action::Record => {
                dispatch(&mut session, Event::Start).await;
                drive(&mut session).await;
            }
            Action::Play => {
                println!("Synthesizing response...");
                dispatch(&mut session, Event::Play).await;
            }
            Action::NewConversation => {
                dispatch(&mut session, Event::Reset).await;
            }
            Action::Quit => break,
        }

        render(&session);
    }

    Ok(())
}

/// Actions available in the current phase
fn menu(session: &VoiceSession) -> Vec<Action> {
    let mut actions = Vec::new();
    if !session.turn().processing() {
        actions.push(Action::Record);
    }
    if session.phase() == Phase::Replying {
        actions.push(Action::Play);
    }
    if session.turn().transcript().is_some() {
        actions.push(Action::NewConversation);
    }
    actions.push(Action::Quit);
    actions
}

/// Send `Continue` until the session waits for the user again
#[allow(clippy::future_not_send)]
async fn drive(session: &mut VoiceSession) {
    while session.is_pending() {
        match session.phase() {
            Phase::Recording => println!("Recording... Speak now!"),
            Phase::Transcribing => println!("Transcribing..."),
            Phase::AwaitingReply => println!("Processing your request..."),
            Phase::Idle | Phase::Replying => {}
        }

        if !dispatch(session, Event::Continue).await {
            break;
        }
    }
}

/// Handle one event and report the outcome; returns false on failure
#[allow(clippy::future_not_send)]
async fn dispatch(session: &mut VoiceSession, event: Event) -> bool {
    match session.handle(event).await {
        Ok(Step::NoAudio) => {
            println!("No audio was captured. Check your microphone and try again.");
            true
        }
        Ok(Step::Played) => {
            println!("Response played.");
            true
        }
        Ok(step) => {
            tracing::debug!(?event, ?step, "event handled");
            true
        }
        Err(e) => {
            println!("{}", e.user_message());
            false
        }
    }
}

fn render(session: &VoiceSession) {
    let turn = session.turn();
    if let Some(text) = turn.transcript() {
        println!("\nYou said: {text}");
    }
    if let Some(reply) = turn.reply() {
        println!("Neon responds: {reply}\n");
    }
}

/// Start a video conversation and print the join link
async fn video_chat() -> anyhow::Result<()> {
    let config = Config::load()?;
    let client = VideoClient::new(&config.video, config.api_keys.tavus.clone())?;
    let request = VideoConversationRequest::from_config(&config.video);

    println!("Connecting to Neon...");
    match client.start_conversation(&request).await {
        Ok(url) => {
            println!("Connection established!");
            println!("Enter the video conversation: {url}");
        }
        Err(e) => {
            println!("{}", e.user_message());
            println!("Failed to start conversation. Please try again.");
        }
    }

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut mic = Microphone::new()?;
    let captured = voice::capture(&mut mic, Duration::from_secs(duration)).await?;

    println!("---");
    match captured {
        Some(audio) => {
            let peak = audio.samples().iter().map(|s| s.abs()).fold(0.0f32, f32::max);
            println!(
                "Captured {:.1}s | RMS: {:.4} | Peak: {:.4}",
                audio.duration().as_secs_f32(),
                audio.rms(),
                peak
            );
            println!("\nIf RMS stayed near 0, check:");
            println!("  1. Is your mic plugged in?");
            println!("  2. Run: pactl info | grep 'Default Source'");
            println!("  3. Run: arecord -l (to list devices)");
        }
        None => println!("No audio frames arrived - is the input device muted or disconnected?"),
    }

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let output = CpalOutput::new()?;

    let frequency = 440.0_f32;
    let num_samples = PLAYBACK_SAMPLE_RATE * 2;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / PLAYBACK_SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    tokio::task::spawn_blocking(move || output.play_samples(samples)).await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Try: pavucontrol (to check output levels)");

    Ok(())
}

/// Test TTS output
async fn test_tts(text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load()?;
    let tts = TextToSpeech::from_config(&config)?;

    println!("Synthesizing speech...");
    let mp3_data = tts.speak(text).await?;
    println!("Got {} bytes of audio data", mp3_data.len());

    println!("Playing audio...");
    let mut speaker = Speaker::new();
    speaker.play(&mp3_data).await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}
