//! Error types for the Neon assistant

use std::fmt;

use thiserror::Error;

/// Result type alias for Neon operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline stage an error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Capture,
    Transcription,
    Dialogue,
    Synthesis,
    Playback,
    Video,
}

impl Stage {
    /// Label shown to the user in front of a failure message
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Capture => "Recording error",
            Self::Transcription => "Transcription error",
            Self::Dialogue => "Response error",
            Self::Synthesis => "Speech synthesis error",
            Self::Playback => "Playback error",
            Self::Video => "Video conversation error",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Capture => "capture",
            Self::Transcription => "transcription",
            Self::Dialogue => "dialogue",
            Self::Synthesis => "synthesis",
            Self::Playback => "playback",
            Self::Video => "video",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in the Neon assistant
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Microphone could not be opened or the input stream failed
    #[error("capture error: {0}")]
    Capture(String),

    /// Recognition service or WAV staging failed
    #[error("transcription error: {0}")]
    Transcription(String),

    /// Language-model call failed or returned no reply
    #[error("dialogue error: {0}")]
    Dialogue(String),

    /// Speech synthesis failed
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Audio playback failed
    #[error("playback error: {0}")]
    Playback(String),

    /// Video conversation could not be started
    #[error("video error: {0}")]
    Video(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// WAV encoding error
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),
}

impl Error {
    /// Pipeline stage this error was raised by, if any
    #[must_use]
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::Capture(_) => Some(Stage::Capture),
            Self::Transcription(_) => Some(Stage::Transcription),
            Self::Dialogue(_) => Some(Stage::Dialogue),
            Self::Synthesis(_) => Some(Stage::Synthesis),
            Self::Playback(_) => Some(Stage::Playback),
            Self::Video(_) => Some(Stage::Video),
            _ => None,
        }
    }

    /// Stage-labelled message suitable for showing to the user
    #[must_use]
    pub fn user_message(&self) -> String {
        let (stage, msg) = match self {
            Self::Capture(msg) => (Stage::Capture, msg),
            Self::Transcription(msg) => (Stage::Transcription, msg),
            Self::Dialogue(msg) => (Stage::Dialogue, msg),
            Self::Synthesis(msg) => (Stage::Synthesis, msg),
            Self::Playback(msg) => (Stage::Playback, msg),
            Self::Video(msg) => (Stage::Video, msg),
            other => return format!("Error: {other}"),
        };
        format!("{}: {msg}", stage.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_labels_are_distinct() {
        let stages = [
            Stage::Capture,
            Stage::Transcription,
            Stage::Dialogue,
            Stage::Synthesis,
            Stage::Playback,
            Stage::Video,
        ];
        for (i, a) in stages.iter().enumerate() {
            for b in &stages[i + 1..] {
                assert_ne!(a.label(), b.label());
            }
        }
    }

    #[test]
    fn test_user_message_is_stage_labelled() {
        let err = Error::Dialogue("service unavailable".to_string());
        assert_eq!(err.stage(), Some(Stage::Dialogue));
        assert_eq!(err.user_message(), "Response error: service unavailable");

        let err = Error::Playback("no output device".to_string());
        assert_eq!(err.user_message(), "Playback error: no output device");

        let err = Error::Video("API error: 401".to_string());
        assert_eq!(err.user_message(), "Video conversation error: API error: 401");

        let err = Error::Config("missing key".to_string());
        assert_eq!(err.stage(), None);
        assert!(err.user_message().starts_with("Error: "));
    }
}
