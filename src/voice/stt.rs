//! Speech-to-text (STT) processing

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};

use super::capture::AudioBuffer;
use super::temp::TempAudioFile;
use crate::config::Config;
use crate::{Error, Result};

/// Full-scale value used when quantizing to 16-bit PCM
const PCM_SCALE: f32 = 32767.0;

/// Response from an OpenAI-compatible transcription API
#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// A speech-recognition service that reads a mono 16-bit WAV file
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Recognize speech in the WAV file at `wav_path`
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or the service fails
    async fn recognize(&self, wav_path: &Path) -> Result<String>;
}

/// Scale `[-1.0, 1.0]` samples to signed 16-bit PCM
///
/// Values at the boundary clip to ±32767.
#[must_use]
pub fn to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&sample| {
            #[allow(clippy::cast_possible_truncation)]
            let value = (sample * PCM_SCALE).clamp(-PCM_SCALE, PCM_SCALE) as i16;
            value
        })
        .collect()
}

/// Inverse of [`to_pcm16`] for a single sample
#[must_use]
pub fn pcm16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / PCM_SCALE
}

/// Write `audio` as a mono 16-bit PCM WAV file
///
/// # Errors
///
/// Returns error if WAV encoding or the file write fails
pub fn write_wav(path: &Path, audio: &AudioBuffer) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: audio.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    for sample in to_pcm16(audio.samples()) {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    Ok(())
}

/// Transcribes captured waveforms through a recognition service
pub struct SpeechToText {
    recognizer: Box<dyn Recognizer>,
}

impl SpeechToText {
    #[must_use]
    pub fn new(recognizer: Box<dyn Recognizer>) -> Self {
        Self { recognizer }
    }

    /// Whisper recognition configured from `config`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn from_config(config: &Config) -> Result<Self> {
        let recognizer = WhisperRecognizer::new(
            config.api_keys.openai.clone(),
            config.voice.stt_model.clone(),
            config.openai_base_url.as_str(),
            config.request_timeout,
        )?;
        Ok(Self::new(Box::new(recognizer)))
    }

    /// Transcribe a captured waveform
    ///
    /// The waveform is staged as a temporary WAV file which is removed on
    /// every exit path. The buffer is consumed.
    ///
    /// # Errors
    ///
    /// Returns `Error::Transcription` if staging, recognition, or
    /// extraction fails, or if nothing was recognized
    pub async fn transcribe(&self, audio: AudioBuffer) -> Result<String> {
        tracing::debug!(
            samples = audio.len(),
            duration_ms = u64::try_from(audio.duration().as_millis()).unwrap_or(u64::MAX),
            "starting transcription"
        );

        let staged = TempAudioFile::create(".wav").map_err(into_transcription)?;
        write_wav(staged.path(), &audio).map_err(into_transcription)?;
        drop(audio);

        let text = self
            .recognizer
            .recognize(staged.path())
            .await
            .map_err(into_transcription)?;
        staged.close();

        let text = text.trim();
        if text.is_empty() {
            return Err(Error::Transcription("no speech recognized".to_string()));
        }

        tracing::info!(transcript = %text, "transcription complete");
        Ok(text.to_string())
    }
}

fn into_transcription(e: Error) -> Error {
    match e {
        Error::Transcription(_) => e,
        other => Error::Transcription(other.to_string()),
    }
}

/// `OpenAI` Whisper recognition over HTTP
pub struct WhisperRecognizer {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl WhisperRecognizer {
    /// Create a new Whisper recognizer
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(
        api_key: SecretString,
        model: String,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl Recognizer for WhisperRecognizer {
    async fn recognize(&self, wav_path: &Path) -> Result<String> {
        let audio = tokio::fs::read(wav_path).await?;
        tracing::debug!(audio_bytes = audio.len(), "starting Whisper transcription");

        let form = Form::new()
            .part(
                "file",
                Part::bytes(audio)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Transcription(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Whisper request failed");
                e
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(Error::Transcription(format!(
                "Whisper API error {status}: {body}"
            )));
        }

        let result: TranscriptionResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse response");
            e
        })?;

        Ok(result.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_boundaries_clip() {
        assert_eq!(to_pcm16(&[1.0, -1.0, 0.0]), vec![32767, -32767, 0]);
    }

    #[test]
    fn test_pcm_roundtrip_within_one_step() {
        let step = 1.0 / PCM_SCALE;
        #[allow(clippy::cast_precision_loss)]
        let samples: Vec<f32> = (-1000..=1000).map(|i| i as f32 / 1000.0).collect();

        for (original, pcm) in samples.iter().zip(to_pcm16(&samples)) {
            let decoded = pcm16_to_f32(pcm);
            assert!(
                (decoded - original).abs() <= step,
                "{original} decoded as {decoded}"
            );
        }
    }

    #[test]
    fn test_write_wav_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        let audio = AudioBuffer::new(vec![0.0, 0.5, -0.5], 16000);

        write_wav(&path, &audio).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.len(), 3);
    }
}
