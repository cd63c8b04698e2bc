//! Neon - Voice and video front-end for an AI knowledge assistant
//!
//! This library provides the core of the Neon assistant:
//! - A turn-based voice loop (record → transcribe → reply → speak)
//! - Hosted video-avatar conversations
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Host (CLI menu)                     │
//! │        Start  │  Continue  │  Play  │  Reset         │
//! └────────────────────┬────────────────────────────────┘
//!                      │ events
//! ┌────────────────────▼────────────────────────────────┐
//! │               Turn state machine                     │
//! │  Capture │ Speech-to-text │ Dialogue │ TTS/Playback  │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │     Hosted services (recognition, LLM, TTS, video)   │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod turn;
pub mod video;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result, Stage};
pub use turn::{Event, Phase, Step, Turn, VoiceServices, VoiceSession};
pub use video::{VideoClient, VideoConversationRequest};
