//! Voice conversation turn state machine
//!
//! The host re-invokes the session once per user interaction and once per
//! completed stage. Each invocation is an [`Event`]; the session runs at
//! most one stage per event and remembers where it stopped, so repeated
//! invocations never redo a finished stage or call a service twice.
//!
//! ```text
//! Idle ──Start──▶ Recording ──Continue──▶ Transcribing ──Continue──▶ AwaitingReply
//!  ▲                  │ (no audio)             │                          │
//!  │                  ▼                        ▼                       Continue
//!  └──── Reset ◀── Replying ◀──────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::Config;
use crate::voice::{
    AudioBuffer, AudioInput, AudioOutput, Dialogue, SpeechToText, TextToSpeech, capture,
};
use crate::{Error, Result};

/// Externally visible phase of the current turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing in progress
    Idle,
    /// Armed; the next `Continue` records
    Recording,
    /// Audio captured; the next `Continue` transcribes
    Transcribing,
    /// Transcript ready; the next `Continue` asks for a reply
    AwaitingReply,
    /// Reply ready for on-demand playback
    Replying,
}

/// User action or host re-invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Begin a new turn
    Start,
    /// Run the pending stage, if any
    Continue,
    /// Speak the current reply
    Play,
    /// Discard the current turn
    Reset,
}

/// Outcome of handling one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// A new turn was armed for recording
    Started,
    /// Nothing to do for this event in the current phase
    Ignored,
    /// Audio captured (sample count)
    Captured(usize),
    /// Capture finished without any audio; back to idle
    NoAudio,
    /// Transcript obtained
    Transcribed(String),
    /// Reply obtained
    Replied(String),
    /// Reply audio delivered
    Played,
    /// Turn discarded
    Reset,
}

/// One user-assistant exchange
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Turn {
    id: u64,
    recording: bool,
    processing: bool,
    transcript: Option<String>,
    reply: Option<String>,
    started_at: Option<DateTime<Utc>>,
}

impl Turn {
    fn begin(id: u64) -> Self {
        Self {
            id,
            recording: true,
            processing: true,
            transcript: None,
            reply: None,
            started_at: Some(Utc::now()),
        }
    }

    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub const fn recording(&self) -> bool {
        self.recording
    }

    #[must_use]
    pub const fn processing(&self) -> bool {
        self.processing
    }

    #[must_use]
    pub fn transcript(&self) -> Option<&str> {
        self.transcript.as_deref()
    }

    /// Only ever set once a transcript exists
    #[must_use]
    pub fn reply(&self) -> Option<&str> {
        self.reply.as_deref()
    }

    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Neither recording nor processing
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        !self.recording && !self.processing
    }

    fn settle(&mut self) {
        self.recording = false;
        self.processing = false;
    }
}

/// Internal state; carries the captured audio between stages
#[derive(Debug)]
enum State {
    Idle,
    Recording,
    Transcribing(AudioBuffer),
    AwaitingReply,
    Replying,
}

impl State {
    const fn phase(&self) -> Phase {
        match self {
            Self::Idle => Phase::Idle,
            Self::Recording => Phase::Recording,
            Self::Transcribing(_) => Phase::Transcribing,
            Self::AwaitingReply => Phase::AwaitingReply,
            Self::Replying => Phase::Replying,
        }
    }
}

/// Stage collaborators used by a session
pub struct VoiceServices {
    pub input: Box<dyn AudioInput>,
    pub stt: SpeechToText,
    pub dialogue: Dialogue,
    pub tts: TextToSpeech,
    pub output: Box<dyn AudioOutput>,
}

impl VoiceServices {
    /// Wire the hosted recognition, dialogue and synthesis services from config
    ///
    /// # Errors
    ///
    /// Returns error if a service client cannot be built
    pub fn from_config(
        config: &Config,
        input: Box<dyn AudioInput>,
        output: Box<dyn AudioOutput>,
    ) -> Result<Self> {
        Ok(Self {
            input,
            stt: SpeechToText::from_config(config)?,
            dialogue: Dialogue::from_config(config)?,
            tts: TextToSpeech::from_config(config)?,
            output,
        })
    }
}

/// Session-scoped voice conversation state
pub struct VoiceSession {
    id: Uuid,
    services: VoiceServices,
    persona: String,
    record_duration: Duration,
    state: State,
    turn: Turn,
    turns_started: u64,
}

impl VoiceSession {
    #[must_use]
    pub fn new(
        services: VoiceServices,
        persona: impl Into<String>,
        record_duration: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            services,
            persona: persona.into(),
            record_duration,
            state: State::Idle,
            turn: Turn::default(),
            turns_started: 0,
        }
    }

    /// Session using the persona and capture window from config
    #[must_use]
    pub fn from_config(config: &Config, services: VoiceServices) -> Self {
        Self::new(
            services,
            config.dialogue.system_prompt.clone(),
            config.voice.record_duration,
        )
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.state.phase()
    }

    #[must_use]
    pub const fn turn(&self) -> &Turn {
        &self.turn
    }

    /// Whether a stage is waiting for a `Continue`
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(
            self.state,
            State::Recording | State::Transcribing(_) | State::AwaitingReply
        )
    }

    /// Handle one event
    ///
    /// A stage failure returns the stage's error after moving the session
    /// to `Idle`. A dialogue failure keeps the transcript. Synthesis and
    /// playback failures leave the phase and the reply untouched.
    ///
    /// # Errors
    ///
    /// Returns the error of the stage run by this event
    pub async fn handle(&mut self, event: Event) -> Result<Step> {
        match event {
            Event::Start => Ok(self.start()),
            Event::Continue => self.advance().await,
            Event::Play => self.play().await,
            Event::Reset => Ok(self.reset()),
        }
    }

    /// Run `Continue` until the session waits for the user
    ///
    /// # Errors
    ///
    /// Returns the first stage error
    pub async fn run_pending(&mut self) -> Result<Vec<Step>> {
        let mut steps = Vec::new();
        while self.is_pending() {
            steps.push(self.advance().await?);
        }
        Ok(steps)
    }

    fn start(&mut self) -> Step {
        if self.turn.processing {
            tracing::debug!(turn = self.turn.id, "start ignored, turn in progress");
            return Step::Ignored;
        }

        self.turns_started += 1;
        self.turn = Turn::begin(self.turns_started);
        self.state = State::Recording;

        tracing::info!(session = %self.id, turn = self.turn.id, "turn started");
        Step::Started
    }

    async fn advance(&mut self) -> Result<Step> {
        // Any stage that fails leaves the session Idle
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Recording => self.run_capture().await,
            State::Transcribing(audio) => self.run_transcription(audio).await,
            State::AwaitingReply => self.run_dialogue().await,
            idle @ (State::Idle | State::Replying) => {
                self.state = idle;
                Ok(Step::Ignored)
            }
        }
    }

    async fn run_capture(&mut self) -> Result<Step> {
        let captured = capture(self.services.input.as_mut(), self.record_duration).await;
        self.turn.recording = false;

        match captured {
            Ok(Some(audio)) => {
                let samples = audio.len();
                tracing::debug!(turn = self.turn.id, samples, "audio captured");
                self.state = State::Transcribing(audio);
                Ok(Step::Captured(samples))
            }
            Ok(None) => {
                tracing::info!(turn = self.turn.id, "no audio captured");
                self.turn.settle();
                Ok(Step::NoAudio)
            }
            Err(e) => Err(self.abandon(e)),
        }
    }

    async fn run_transcription(&mut self, audio: AudioBuffer) -> Result<Step> {
        match self.services.stt.transcribe(audio).await {
            Ok(text) => {
                self.turn.transcript = Some(text.clone());
                self.state = State::AwaitingReply;
                Ok(Step::Transcribed(text))
            }
            Err(e) => Err(self.abandon(e)),
        }
    }

    async fn run_dialogue(&mut self) -> Result<Step> {
        let Some(transcript) = self.turn.transcript.clone() else {
            return Err(self.abandon(Error::Dialogue("no transcript to answer".to_string())));
        };

        match self.services.dialogue.respond(&transcript, &self.persona).await {
            Ok(reply) => {
                self.turn.reply = Some(reply.clone());
                self.turn.settle();
                self.state = State::Replying;
                tracing::info!(turn = self.turn.id, "reply ready");
                Ok(Step::Replied(reply))
            }
            Err(e) => {
                // Transcript stays visible so the user sees what was heard
                tracing::warn!(turn = self.turn.id, error = %e, "dialogue failed");
                self.turn.settle();
                Err(e)
            }
        }
    }

    async fn play(&mut self) -> Result<Step> {
        let reply = match (&self.state, self.turn.reply.as_deref()) {
            (State::Replying, Some(reply)) => reply.to_string(),
            _ => return Ok(Step::Ignored),
        };

        let audio = self.services.tts.speak(&reply).await?;
        self.services.output.play(&audio).await.map_err(|e| match e {
            Error::Playback(_) => e,
            other => Error::Playback(other.to_string()),
        })?;

        tracing::debug!(turn = self.turn.id, "reply played");
        Ok(Step::Played)
    }

    fn reset(&mut self) -> Step {
        self.state = State::Idle;
        self.turn = Turn::default();
        tracing::info!(session = %self.id, "conversation reset");
        Step::Reset
    }

    /// Drop partial results of a failed capture or transcription
    fn abandon(&mut self, e: Error) -> Error {
        tracing::warn!(turn = self.turn.id, error = %e, "turn abandoned");
        self.state = State::Idle;
        self.turn.transcript = None;
        self.turn.reply = None;
        self.turn.settle();
        e
    }
}
