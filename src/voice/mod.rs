//! Voice processing module
//!
//! Each stage wraps one external service: capture (microphone),
//! recognition, dialogue, synthesis and playback. Audio is bridged to
//! services that need a file path through scoped temp files.

mod capture;
mod dialogue;
mod playback;
mod stt;
pub mod temp;
mod tts;

pub use capture::{AudioBuffer, AudioInput, FrameReceiver, Microphone, SAMPLE_RATE, capture};
pub use dialogue::{ChatMessage, Dialogue, LanguageModel, OpenAiChat};
pub use playback::{
    AudioOutput, ClipWriter, CpalOutput, OutputDevice, PLAYBACK_SAMPLE_RATE, Speaker,
};
pub use stt::{Recognizer, SpeechToText, WhisperRecognizer, pcm16_to_f32, to_pcm16, write_wav};
pub use temp::{TempAudioFile, purge_deferred};
pub use tts::{ElevenLabsSpeech, OpenAiSpeech, Synthesizer, TextToSpeech};
