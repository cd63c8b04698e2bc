//! Configuration management for the Neon assistant

pub mod file;

use std::time::Duration;

use secrecy::SecretString;

use crate::{Error, Result};

pub use file::NeonConfigFile;

/// Default persona sent as the system message of every dialogue request
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Project Neon - an advanced AI assistant that \
provides real-time access to enterprise knowledge systems, answers questions using connected \
databases (SQL, Postgres, Databricks), retrieves information from vector stores of unstructured \
data, and delivers responses in clear, conversational language.";

const DEFAULT_CONVERSATIONAL_CONTEXT: &str = "You are Project Neon - an advanced AI assistant that:
1. Provides real-time access to enterprise knowledge systems
2. Answers questions using connected databases (SQL, Postgres, Databricks)
3. Retrieves information from vector stores of unstructured data
4. Delivers responses in clear, conversational language";

const DEFAULT_GREETING: &str =
    "Hello! I'm Neon, your AI knowledge assistant. What would you like to know?";

/// Neon assistant configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// API keys
    pub api_keys: ApiKeys,

    /// Voice pipeline configuration
    pub voice: VoiceConfig,

    /// Language-model configuration
    pub dialogue: DialogueConfig,

    /// Video conversation configuration
    pub video: VideoConfig,

    /// Base URL of the OpenAI-compatible API
    pub openai_base_url: String,

    /// Per-request timeout for recognition, dialogue and synthesis calls
    pub request_timeout: Duration,
}

/// API keys for external services
#[derive(Debug, Clone)]
pub struct ApiKeys {
    /// `OpenAI` API key (recognition, dialogue, synthesis)
    pub openai: SecretString,

    /// Tavus API key (video conversations)
    pub tavus: Option<SecretString>,

    /// `ElevenLabs` API key (optional TTS)
    pub elevenlabs: Option<SecretString>,
}

/// Speech synthesis backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsProvider {
    OpenAi,
    ElevenLabs,
}

impl std::str::FromStr for TtsProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "elevenlabs" => Ok(Self::ElevenLabs),
            other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
        }
    }
}

/// Voice pipeline configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Maximum capture window per turn
    pub record_duration: Duration,

    /// STT model (e.g. "whisper-1")
    pub stt_model: String,

    /// TTS backend
    pub tts_provider: TtsProvider,

    /// TTS model (e.g. "tts-1")
    pub tts_model: String,

    /// TTS voice identifier
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f32,
}

/// Language-model configuration
#[derive(Debug, Clone)]
pub struct DialogueConfig {
    /// Model identifier for chat completions
    pub model: String,

    /// Fixed system persona
    pub system_prompt: String,
}

/// Video conversation configuration
#[derive(Debug, Clone)]
pub struct VideoConfig {
    pub api_url: String,
    pub replica_id: String,
    pub persona_id: String,
    pub conversation_name: String,
    pub conversational_context: String,
    pub custom_greeting: String,
    pub max_call_duration: u32,
    pub enable_transcription: bool,
    pub language: String,
    pub timeout: Duration,
}

impl Config {
    /// Load configuration from the environment and the TOML config file
    ///
    /// # Errors
    ///
    /// Returns error if a required credential is missing or a value is invalid
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Merge a parsed config file with environment lookups (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if a required credential is missing or a value is invalid
    pub fn from_sources<F>(fc: NeonConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let openai = env("OPENAI_API_KEY")
            .or(fc.api_keys.openai)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::Config("OPENAI_API_KEY is required".to_string()))?;

        let api_keys = ApiKeys {
            openai: SecretString::from(openai),
            tavus: env("TAVUS_API_KEY")
                .or(fc.api_keys.tavus)
                .filter(|k| !k.trim().is_empty())
                .map(SecretString::from),
            elevenlabs: env("ELEVENLABS_API_KEY")
                .or(fc.api_keys.elevenlabs)
                .filter(|k| !k.trim().is_empty())
                .map(SecretString::from),
        };

        let record_seconds = match env("NEON_RECORD_SECONDS") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|e| Error::Config(format!("invalid NEON_RECORD_SECONDS: {e}")))?,
            None => fc.voice.record_seconds.unwrap_or(5),
        };

        let tts_provider = env("NEON_TTS_PROVIDER")
            .or(fc.voice.tts_provider)
            .map_or(Ok(TtsProvider::OpenAi), |p| p.parse())?;

        if tts_provider == TtsProvider::ElevenLabs && api_keys.elevenlabs.is_none() {
            return Err(Error::Config(
                "ELEVENLABS_API_KEY is required for the elevenlabs TTS provider".to_string(),
            ));
        }

        let default_tts_model = match tts_provider {
            TtsProvider::OpenAi => "tts-1",
            TtsProvider::ElevenLabs => "eleven_monolingual_v1",
        };

        let voice = VoiceConfig {
            record_duration: Duration::from_secs(record_seconds),
            stt_model: env("NEON_STT_MODEL")
                .or(fc.voice.stt_model)
                .unwrap_or_else(|| "whisper-1".to_string()),
            tts_provider,
            tts_model: env("NEON_TTS_MODEL")
                .or(fc.voice.tts_model)
                .unwrap_or_else(|| default_tts_model.to_string()),
            tts_voice: env("NEON_TTS_VOICE")
                .or(fc.voice.tts_voice)
                .unwrap_or_else(|| "alloy".to_string()),
            tts_speed: fc.voice.tts_speed.unwrap_or(1.0).clamp(0.25, 4.0),
        };

        let dialogue = DialogueConfig {
            model: env("NEON_LLM_MODEL")
                .or(fc.dialogue.model)
                .unwrap_or_else(|| "gpt-3.5-turbo".to_string()),
            system_prompt: fc
                .dialogue
                .system_prompt
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        };

        let v = fc.video;
        let video = VideoConfig {
            api_url: env("NEON_VIDEO_API_URL")
                .or(v.api_url)
                .unwrap_or_else(|| "https://tavusapi.com/v2".to_string()),
            replica_id: v.replica_id.unwrap_or_else(|| "r79e1c033f".to_string()),
            persona_id: v.persona_id.unwrap_or_else(|| "p9a95912".to_string()),
            conversation_name: v
                .conversation_name
                .unwrap_or_else(|| "Project Neon Session".to_string()),
            conversational_context: v
                .conversational_context
                .unwrap_or_else(|| DEFAULT_CONVERSATIONAL_CONTEXT.to_string()),
            custom_greeting: v
                .custom_greeting
                .unwrap_or_else(|| DEFAULT_GREETING.to_string()),
            max_call_duration: v.max_call_duration.unwrap_or(1800),
            enable_transcription: v.enable_transcription.unwrap_or(true),
            language: v.language.unwrap_or_else(|| "english".to_string()),
            timeout: Duration::from_secs(v.timeout_secs.unwrap_or(10)),
        };

        let openai_base_url = env("OPENAI_BASE_URL")
            .or(fc.http.openai_base_url)
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            api_keys,
            voice,
            dialogue,
            video,
            openai_base_url,
            request_timeout: Duration::from_secs(fc.http.request_timeout_secs.unwrap_or(30)),
        })
    }
}
