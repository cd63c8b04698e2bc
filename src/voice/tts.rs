//! Text-to-speech (TTS) processing

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::config::{Config, TtsProvider};
use crate::{Error, Result};

/// A speech-synthesis service returning compressed (MP3) audio
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` with the given voice
    ///
    /// # Errors
    ///
    /// Returns error if the service call fails
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>>;
}

/// Turns reply text into speech audio
pub struct TextToSpeech {
    synthesizer: Box<dyn Synthesizer>,
    voice: String,
}

impl TextToSpeech {
    #[must_use]
    pub fn new(synthesizer: Box<dyn Synthesizer>, voice: impl Into<String>) -> Self {
        Self {
            synthesizer,
            voice: voice.into(),
        }
    }

    /// Synthesizer and voice selected by config
    ///
    /// # Errors
    ///
    /// Returns error if the provider's key is missing or the client cannot be built
    pub fn from_config(config: &Config) -> Result<Self> {
        let timeout = config.request_timeout;
        let synthesizer: Box<dyn Synthesizer> = match config.voice.tts_provider {
            TtsProvider::OpenAi => Box::new(OpenAiSpeech::new(
                config.api_keys.openai.clone(),
                config.voice.tts_model.clone(),
                config.voice.tts_speed,
                config.openai_base_url.as_str(),
                timeout,
            )?),
            TtsProvider::ElevenLabs => {
                let api_key = config.api_keys.elevenlabs.clone().ok_or_else(|| {
                    Error::Config("ElevenLabs API key required for TTS".to_string())
                })?;
                Box::new(ElevenLabsSpeech::new(
                    api_key,
                    config.voice.tts_model.clone(),
                    timeout,
                )?)
            }
        };

        Ok(Self::new(synthesizer, config.voice.tts_voice.clone()))
    }

    /// Synthesize `text`; every call reaches the service, nothing is cached
    ///
    /// # Returns
    ///
    /// Audio bytes (MP3 format)
    ///
    /// # Errors
    ///
    /// Returns `Error::Synthesis` if the text is empty or synthesis fails
    pub async fn speak(&self, text: &str) -> Result<Vec<u8>> {
        if text.trim().is_empty() {
            return Err(Error::Synthesis("nothing to speak".to_string()));
        }

        let audio = self
            .synthesizer
            .synthesize(text, &self.voice)
            .await
            .map_err(|e| match e {
                Error::Synthesis(_) => e,
                other => Error::Synthesis(other.to_string()),
            })?;

        if audio.is_empty() {
            return Err(Error::Synthesis("service returned no audio".to_string()));
        }

        tracing::debug!(audio_bytes = audio.len(), voice = %self.voice, "speech synthesized");
        Ok(audio)
    }
}

/// `OpenAI` speech synthesis
pub struct OpenAiSpeech {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    speed: f32,
    base_url: String,
}

impl OpenAiSpeech {
    /// Create a new `OpenAI` synthesizer
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(
        api_key: SecretString,
        model: String,
        speed: f32,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            api_key,
            model,
            speed,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl Synthesizer for OpenAiSpeech {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice,
            speed: self.speed,
        };

        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!("OpenAI TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}

/// `ElevenLabs` speech synthesis; the voice identifier is an `ElevenLabs` voice id
pub struct ElevenLabsSpeech {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
}

impl ElevenLabsSpeech {
    /// Create a new `ElevenLabs` synthesizer
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(api_key: SecretString, model: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl Synthesizer for ElevenLabsSpeech {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        let url = format!("https://api.elevenlabs.io/v1/text-to-speech/{voice}");

        let request = ElevenLabsRequest {
            text,
            model_id: &self.model,
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!(
                "ElevenLabs TTS error {status}: {body}"
            )));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}
