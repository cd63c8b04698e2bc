//! TOML configuration file loading
//!
//! Supports `~/.config/neon/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct NeonConfigFile {
    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// Voice pipeline configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Language-model configuration
    #[serde(default)]
    pub dialogue: DialogueFileConfig,

    /// Video conversation configuration
    #[serde(default)]
    pub video: VideoFileConfig,

    /// Outbound HTTP configuration
    #[serde(default)]
    pub http: HttpFileConfig,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub tavus: Option<String>,
    pub elevenlabs: Option<String>,
}

/// Voice pipeline configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Capture window in seconds
    pub record_seconds: Option<u64>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// TTS provider ("openai" or "elevenlabs")
    pub tts_provider: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// TTS voice identifier (e.g. "alloy")
    pub tts_voice: Option<String>,

    /// TTS speed multiplier
    pub tts_speed: Option<f32>,
}

/// Language-model configuration
#[derive(Debug, Default, Deserialize)]
pub struct DialogueFileConfig {
    /// Model identifier (e.g. "gpt-3.5-turbo")
    pub model: Option<String>,

    /// System persona sent with every request
    pub system_prompt: Option<String>,
}

/// Video conversation configuration
#[derive(Debug, Default, Deserialize)]
pub struct VideoFileConfig {
    pub api_url: Option<String>,
    pub replica_id: Option<String>,
    pub persona_id: Option<String>,
    pub conversation_name: Option<String>,
    pub conversational_context: Option<String>,
    pub custom_greeting: Option<String>,
    pub max_call_duration: Option<u32>,
    pub enable_transcription: Option<bool>,
    pub language: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Outbound HTTP configuration
#[derive(Debug, Default, Deserialize)]
pub struct HttpFileConfig {
    /// Base URL of the OpenAI-compatible API
    pub openai_base_url: Option<String>,

    /// Per-request timeout for AI service calls
    pub request_timeout_secs: Option<u64>,
}

/// Load the TOML config file from the standard path
///
/// Returns `NeonConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> NeonConfigFile {
    config_file_path().map_or_else(NeonConfigFile::default, |path| load_from(&path))
}

/// Load a TOML config file from an explicit path
///
/// Missing or malformed files fall back to defaults with a warning.
pub fn load_from(path: &Path) -> NeonConfigFile {
    if !path.exists() {
        return NeonConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                NeonConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            NeonConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/neon/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("neon").join("config.toml"))
}
