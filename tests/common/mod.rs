//! Shared test utilities
//!
//! Scripted stand-ins for the microphone and hosted services, plus a helper
//! that serves an axum router on an ephemeral local port.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use neon_assistant::config::NeonConfigFile;
use neon_assistant::voice::{
    AudioInput, ChatMessage, Dialogue, FrameReceiver, LanguageModel, OutputDevice, Recognizer,
    Speaker, SpeechToText, Synthesizer, TextToSpeech,
};
use neon_assistant::{Config, Error, Result, VoiceServices, VoiceSession};

pub const PERSONA: &str = "You are Neon, answering questions about the business.";
pub const QUESTION: &str = "What is the quarterly revenue?";
pub const ANSWER: &str = "Quarterly revenue was 4.2 million dollars.";

/// Generate sine wave audio samples
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub fn generate_sine_samples(
    sample_rate: u32,
    frequency: f32,
    duration_secs: f32,
    amplitude: f32,
) -> Vec<f32> {
    let num_samples = (sample_rate as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Counters and payloads observed by the scripted services
#[derive(Clone, Default)]
pub struct Probe {
    pub starts: Arc<AtomicUsize>,
    pub recognized: Arc<Mutex<Vec<PathBuf>>>,
    pub prompts: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
    pub synthesized: Arc<Mutex<Vec<String>>>,
    pub played: Arc<Mutex<Vec<(PathBuf, Vec<u8>)>>>,
}

impl Probe {
    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn recognized(&self) -> Vec<PathBuf> {
        self.recognized.lock().expect("lock").clone()
    }

    pub fn prompts(&self) -> Vec<Vec<ChatMessage>> {
        self.prompts.lock().expect("lock").clone()
    }

    pub fn synthesized(&self) -> Vec<String> {
        self.synthesized.lock().expect("lock").clone()
    }

    pub fn played(&self) -> Vec<(PathBuf, Vec<u8>)> {
        self.played.lock().expect("lock").clone()
    }
}

/// How each scripted service behaves
pub struct Script {
    /// Frames delivered on every capture; empty means silence
    pub frames: Vec<Vec<f32>>,
    pub deny_microphone: bool,
    pub transcript: std::result::Result<String, String>,
    pub reply: std::result::Result<Option<String>, String>,
    pub synthesis_fails: bool,
    /// The output device accepts the clip, then fails to play it
    pub playback_fails: bool,
    /// No output device can be opened at all
    pub output_unavailable: bool,
}

impl Default for Script {
    fn default() -> Self {
        let tone = generate_sine_samples(16000, 220.0, 0.25, 0.4);
        Self {
            frames: tone.chunks(1024).map(<[f32]>::to_vec).collect(),
            deny_microphone: false,
            transcript: Ok(QUESTION.to_string()),
            reply: Ok(Some(ANSWER.to_string())),
            synthesis_fails: false,
            playback_fails: false,
            output_unavailable: false,
        }
    }
}

/// Microphone that replays the same frames on every start, then closes
struct ScriptedInput {
    frames: Vec<Vec<f32>>,
    deny: bool,
    starts: Arc<AtomicUsize>,
}

impl AudioInput for ScriptedInput {
    fn start(&mut self) -> Result<FrameReceiver> {
        if self.deny {
            return Err(Error::Capture("microphone permission denied".to_string()));
        }
        self.starts.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::unbounded_channel();
        for frame in &self.frames {
            tx.send(frame.clone()).expect("receiver alive");
        }
        Ok(rx)
    }

    fn stop(&mut self) {}
}

struct ScriptedRecognizer {
    transcript: std::result::Result<String, String>,
    seen: Arc<Mutex<Vec<PathBuf>>>,
}

#[async_trait]
impl Recognizer for ScriptedRecognizer {
    async fn recognize(&self, wav_path: &Path) -> Result<String> {
        assert!(wav_path.exists(), "staged WAV must exist while recognizing");
        let reader = hound::WavReader::open(wav_path).expect("valid WAV");
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().bits_per_sample, 16);

        self.seen.lock().expect("lock").push(wav_path.to_path_buf());
        self.transcript.clone().map_err(Error::Transcription)
    }
}

struct ScriptedModel {
    reply: std::result::Result<Option<String>, String>,
    seen: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Option<String>> {
        self.seen.lock().expect("lock").push(messages.to_vec());
        self.reply.clone().map_err(Error::Dialogue)
    }
}

struct ScriptedSynthesizer {
    fails: bool,
    seen: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Synthesizer for ScriptedSynthesizer {
    async fn synthesize(&self, text: &str, _voice: &str) -> Result<Vec<u8>> {
        self.seen.lock().expect("lock").push(text.to_string());
        if self.fails {
            return Err(Error::Synthesis("quota exceeded".to_string()));
        }
        Ok(format!("mp3:{text}").into_bytes())
    }
}

/// Output device that reads back each staged clip instead of playing it
struct RecordingDevice {
    fails: bool,
    played: Arc<Mutex<Vec<(PathBuf, Vec<u8>)>>>,
}

impl OutputDevice for RecordingDevice {
    fn play_file(&self, path: &Path) -> Result<()> {
        let bytes = std::fs::read(path).map_err(|e| Error::Playback(e.to_string()))?;
        self.played
            .lock()
            .expect("lock")
            .push((path.to_path_buf(), bytes));

        if self.fails {
            return Err(Error::Playback("output stream underrun".to_string()));
        }
        Ok(())
    }
}

/// Build a session whose services follow `script`
pub fn scripted_session(script: Script) -> (VoiceSession, Probe) {
    let probe = Probe::default();

    let speaker = if script.output_unavailable {
        Speaker::with_opener(|| {
            Err(Error::Playback(
                "no suitable output config found".to_string(),
            ))
        })
    } else {
        Speaker::with_device(Arc::new(RecordingDevice {
            fails: script.playback_fails,
            played: Arc::clone(&probe.played),
        }))
    };

    let services = VoiceServices {
        input: Box::new(ScriptedInput {
            frames: script.frames,
            deny: script.deny_microphone,
            starts: Arc::clone(&probe.starts),
        }),
        stt: SpeechToText::new(Box::new(ScriptedRecognizer {
            transcript: script.transcript,
            seen: Arc::clone(&probe.recognized),
        })),
        dialogue: Dialogue::new(Box::new(ScriptedModel {
            reply: script.reply,
            seen: Arc::clone(&probe.prompts),
        })),
        tts: TextToSpeech::new(
            Box::new(ScriptedSynthesizer {
                fails: script.synthesis_fails,
                seen: Arc::clone(&probe.synthesized),
            }),
            "alloy",
        ),
        output: Box::new(speaker),
    };

    let session = VoiceSession::new(services, PERSONA, Duration::from_secs(1));
    (session, probe)
}

/// Config with test keys, pointing every hosted service at `base_url`
pub fn config_for(base_url: &str) -> Config {
    let base = base_url.to_string();
    Config::from_sources(NeonConfigFile::default(), move |key| match key {
        "OPENAI_API_KEY" => Some("sk-test".to_string()),
        "TAVUS_API_KEY" => Some("tavus-test".to_string()),
        "OPENAI_BASE_URL" | "NEON_VIDEO_API_URL" => Some(base.clone()),
        _ => None,
    })
    .expect("valid test config")
}

/// Serve `router` on an ephemeral local port and return its base URL
pub async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test listener");
    let addr = listener.local_addr().expect("listener address");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test server failed");
    });

    format!("http://{addr}")
}
