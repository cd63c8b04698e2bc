//! Audio capture from microphone

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use tokio::sync::mpsc;

use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Receiving end of a real-time frame stream
pub type FrameReceiver = mpsc::UnboundedReceiver<Vec<f32>>;

/// Mono waveform captured for one turn
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Wrap samples recorded at `sample_rate`
    #[must_use]
    pub const fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playing time of the buffer
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    /// Root-mean-square energy
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_squares: f32 = self.samples.iter().map(|s| s * s).sum();
        (sum_squares / self.samples.len() as f32).sqrt()
    }
}

/// A real-time audio input that delivers frames over a channel
///
/// The stream is considered closed when every sender is dropped.
pub trait AudioInput {
    /// Start streaming frames
    ///
    /// # Errors
    ///
    /// Returns error if the device cannot be opened (missing device,
    /// permission denied)
    fn start(&mut self) -> Result<FrameReceiver>;

    /// Stop streaming and release the device
    fn stop(&mut self);

    /// Transport failure reported by the stream since `start`, if any
    fn take_error(&mut self) -> Option<String> {
        None
    }
}

/// Record from `input` for at most `max_duration`
///
/// Frames are concatenated in arrival order. Returns `Ok(None)` when no
/// frames arrived (silence, disconnected input, stream never started);
/// device and transport failures are `Error::Capture`.
///
/// # Errors
///
/// Returns `Error::Capture` if the input cannot start or reports a stream error
pub async fn capture(
    input: &mut dyn AudioInput,
    max_duration: Duration,
) -> Result<Option<AudioBuffer>> {
    let mut frames = input.start().map_err(|e| match e {
        Error::Capture(_) => e,
        other => Error::Capture(other.to_string()),
    })?;

    let deadline = tokio::time::Instant::now() + max_duration;
    let mut samples: Vec<f32> = Vec::new();
    let mut frame_count = 0usize;

    loop {
        match tokio::time::timeout_at(deadline, frames.recv()).await {
            Ok(Some(frame)) => {
                frame_count += 1;
                samples.extend_from_slice(&frame);
            }
            Ok(None) => {
                tracing::debug!("input stream closed");
                break;
            }
            Err(_) => break,
        }
    }

    input.stop();

    if let Some(err) = input.take_error() {
        tracing::error!(error = %err, "audio stream failed during capture");
        return Err(Error::Capture(err));
    }

    tracing::debug!(frames = frame_count, samples = samples.len(), "capture finished");

    if frame_count == 0 {
        return Ok(None);
    }

    Ok(Some(AudioBuffer::new(samples, SAMPLE_RATE)))
}

/// Captures audio from the default input device
pub struct Microphone {
    config: StreamConfig,
    stream: Option<Stream>,
    stream_error: Arc<Mutex<Option<String>>>,
}

impl Microphone {
    /// Open the default input device at 16kHz mono
    ///
    /// # Errors
    ///
    /// Returns `Error::Capture` if no suitable input device is available
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Capture("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Capture(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Capture("no suitable audio config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            channels = config.channels,
            "microphone initialized"
        );

        Ok(Self {
            config,
            stream: None,
            stream_error: Arc::new(Mutex::new(None)),
        })
    }
}

impl AudioInput for Microphone {
    fn start(&mut self) -> Result<FrameReceiver> {
        self.stop();

        let (tx, rx) = mpsc::unbounded_channel();
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Capture("no input device".to_string()))?;

        if let Ok(mut slot) = self.stream_error.lock() {
            *slot = None;
        }
        let error_slot = Arc::clone(&self.stream_error);

        let stream = device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // Receiver gone means capture already finished
                    let _ = tx.send(data.to_vec());
                },
                move |err| {
                    tracing::error!(error = %err, "audio capture error");
                    if let Ok(mut slot) = error_slot.lock() {
                        slot.get_or_insert_with(|| err.to_string());
                    }
                },
                None,
            )
            .map_err(|e| Error::Capture(e.to_string()))?;

        stream.play().map_err(|e| Error::Capture(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(rx)
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }

    fn take_error(&mut self) -> Option<String> {
        self.stream_error.lock().ok().and_then(|mut slot| slot.take())
    }
}
