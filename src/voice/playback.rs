//! Audio playback of synthesized speech

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use super::temp::TempAudioFile;
use crate::{Error, Result};

/// Sample rate for playback (matches common TTS output)
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Input frames per resampler pass
const RESAMPLE_CHUNK: usize = 1024;

/// Destination for synthesized MP3 audio
#[async_trait]
pub trait AudioOutput: Send {
    /// Render `mp3` and return once it has been delivered
    ///
    /// # Errors
    ///
    /// Returns `Error::Playback` if the audio cannot be rendered
    async fn play(&mut self, mp3: &[u8]) -> Result<()>;
}

/// A local audio device that plays staged MP3 files
pub trait OutputDevice: Send + Sync {
    /// Play the MP3 file at `path`, returning once playback has finished
    ///
    /// # Errors
    ///
    /// Returns `Error::Playback` if decoding or the output stream fails
    fn play_file(&self, path: &Path) -> Result<()>;
}

/// Default output device via cpal
pub struct CpalOutput {
    config: StreamConfig,
}

impl CpalOutput {
    /// Open the default output device
    ///
    /// # Errors
    ///
    /// Returns `Error::Playback` if no suitable output device is available
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Playback("no output device available".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Playback(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                        && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
                })
            })
            .ok_or_else(|| Error::Playback("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self { config })
    }

    /// Play raw samples at [`PLAYBACK_SAMPLE_RATE`], blocking until done
    ///
    /// # Errors
    ///
    /// Returns `Error::Playback` if the output stream fails
    pub fn play_samples(&self, samples: Vec<f32>) -> Result<()> {
        play_samples_blocking(&self.config, samples)
    }
}

impl OutputDevice for CpalOutput {
    fn play_file(&self, path: &Path) -> Result<()> {
        let samples = decode_mp3_file(path)?;
        play_samples_blocking(&self.config, samples)
    }
}

/// Opens the device a [`Speaker`] plays on
type DeviceOpener = Box<dyn Fn() -> Result<Arc<dyn OutputDevice>> + Send + Sync>;

/// Plays replies on a local device, blocking the turn until playback ends
///
/// The device is opened on first use, so a missing or unsuitable output
/// only fails `play`. Each clip is staged in a temp `.mp3` file that is
/// removed afterwards.
pub struct Speaker {
    open: DeviceOpener,
    device: Option<Arc<dyn OutputDevice>>,
}

impl Speaker {
    /// Speaker on the default output device
    #[must_use]
    pub fn new() -> Self {
        Self::with_opener(|| Ok(Arc::new(CpalOutput::new()?) as Arc<dyn OutputDevice>))
    }

    #[must_use]
    pub fn with_device(device: Arc<dyn OutputDevice>) -> Self {
        Self {
            open: Box::new(move || Ok(Arc::clone(&device))),
            device: None,
        }
    }

    /// Speaker that calls `open` until a device is available
    #[must_use]
    pub fn with_opener<F>(open: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn OutputDevice>> + Send + Sync + 'static,
    {
        Self {
            open: Box::new(open),
            device: None,
        }
    }

    fn device(&mut self) -> Result<Arc<dyn OutputDevice>> {
        if let Some(device) = &self.device {
            return Ok(Arc::clone(device));
        }

        let device = (self.open)().map_err(into_playback)?;
        self.device = Some(Arc::clone(&device));
        Ok(device)
    }
}

impl Default for Speaker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioOutput for Speaker {
    async fn play(&mut self, mp3: &[u8]) -> Result<()> {
        let device = self.device()?;

        let staged = TempAudioFile::create(".mp3").map_err(into_playback)?;
        tokio::fs::write(staged.path(), mp3)
            .await
            .map_err(|e| Error::Playback(e.to_string()))?;

        let path = staged.path().to_path_buf();
        let result = tokio::task::spawn_blocking(move || device.play_file(&path))
            .await
            .map_err(|e| Error::Playback(format!("playback task failed: {e}")))?;

        staged.close();
        result.map_err(into_playback)
    }
}

/// Hands MP3 clips to a client by writing them into a directory it serves
///
/// Only the clip of the latest `play` is kept; it is replaced by the next
/// one and removed when the writer is dropped.
pub struct ClipWriter {
    dir: PathBuf,
    current: Option<TempAudioFile>,
}

impl ClipWriter {
    /// Write clips into `dir`, creating it if needed
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, current: None })
    }

    /// Path of the clip the client should play
    #[must_use]
    pub fn last_clip(&self) -> Option<&Path> {
        self.current.as_ref().map(TempAudioFile::path)
    }
}

#[async_trait]
impl AudioOutput for ClipWriter {
    async fn play(&mut self, mp3: &[u8]) -> Result<()> {
        let clip = TempAudioFile::create_in(&self.dir, ".mp3").map_err(into_playback)?;
        tokio::fs::write(clip.path(), mp3)
            .await
            .map_err(|e| Error::Playback(format!("failed to write clip: {e}")))?;

        tracing::info!(path = %clip.path().display(), bytes = mp3.len(), "reply clip ready");

        // Dropping the previous clip removes it
        self.current = Some(clip);
        Ok(())
    }
}

fn into_playback(e: Error) -> Error {
    match e {
        Error::Playback(_) => e,
        other => Error::Playback(other.to_string()),
    }
}

/// Play samples in a blocking manner
fn play_samples_blocking(config: &StreamConfig, samples: Vec<f32>) -> Result<()> {
    if samples.is_empty() {
        return Ok(());
    }

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Playback("no output device".to_string()))?;

    let channels = usize::from(config.channels);
    let sample_count = samples.len();

    let samples = Arc::new(samples);
    let position = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicBool::new(false));

    let samples_clone = Arc::clone(&samples);
    let position_clone = Arc::clone(&position);
    let finished_clone = Arc::clone(&finished);

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let pos = position_clone.load(Ordering::Relaxed);
                    let sample = samples_clone.get(pos).copied().unwrap_or_else(|| {
                        finished_clone.store(true, Ordering::Release);
                        0.0
                    });

                    for out in frame.iter_mut() {
                        *out = sample;
                    }

                    if pos < samples_clone.len() {
                        position_clone.store(pos + 1, Ordering::Relaxed);
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Playback(e.to_string()))?;

    stream.play().map_err(|e| Error::Playback(e.to_string()))?;

    // Wait for playback to finish
    let duration_ms = (sample_count as u64 * 1000) / u64::from(PLAYBACK_SAMPLE_RATE);
    let start = Instant::now();
    let timeout = Duration::from_millis(duration_ms + 500);

    while !finished.load(Ordering::Acquire) {
        if start.elapsed() > timeout {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    // Small delay to ensure audio finishes
    std::thread::sleep(Duration::from_millis(100));

    drop(stream);
    tracing::debug!(samples = sample_count, "playback complete");

    Ok(())
}

/// Decode an MP3 file to mono samples at [`PLAYBACK_SAMPLE_RATE`]
fn decode_mp3_file(path: &Path) -> Result<Vec<f32>> {
    let data = std::fs::read(path).map_err(|e| Error::Playback(e.to_string()))?;
    let (samples, sample_rate) = decode_mp3(&data)?;
    resample(&samples, sample_rate, PLAYBACK_SAMPLE_RATE)
}

/// Decode MP3 bytes to mono f32 samples, returning the stream's sample rate
fn decode_mp3(mp3_data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = PLAYBACK_SAMPLE_RATE;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if let Ok(rate) = u32::try_from(frame.sample_rate) {
                    sample_rate = rate;
                }

                // Convert i16 samples to f32 and handle stereo to mono
                if frame.channels == 2 {
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right =
                            f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Playback(format!("MP3 decode error: {e}"))),
        }
    }

    Ok((samples, sample_rate))
}

/// Resample mono audio using rubato
///
/// The trailing partial chunk is processed too and the resampler's delay
/// is trimmed, so the output covers the whole input.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn resample(samples: &[f32], from: u32, to: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    if from == to || from == 0 || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler =
        FftFixedIn::<f64>::new(from as usize, to as usize, RESAMPLE_CHUNK, 2, 1)
            .map_err(|e| Error::Playback(format!("resampler init failed: {e}")))?;

    let input: Vec<f64> = samples.iter().map(|&s| f64::from(s)).collect();
    let expected = (samples.len() as f64 * f64::from(to) / f64::from(from)).round() as usize;
    let delay = resampler.output_delay();

    let mut output = Vec::with_capacity(expected + delay);
    let mut chunks = input.chunks_exact(RESAMPLE_CHUNK);
    for chunk in &mut chunks {
        let result = resampler
            .process(&[chunk], None)
            .map_err(|e| Error::Playback(format!("resample failed: {e}")))?;
        output.extend_from_slice(&result[0]);
    }

    let rest = chunks.remainder();
    if !rest.is_empty() {
        let result = resampler
            .process_partial(Some(&[rest][..]), None)
            .map_err(|e| Error::Playback(format!("resample failed: {e}")))?;
        output.extend_from_slice(&result[0]);
    }

    // Flush the delay line
    while output.len() < expected + delay {
        let result = resampler
            .process_partial::<&[f64]>(None, None)
            .map_err(|e| Error::Playback(format!("resample failed: {e}")))?;
        if result[0].is_empty() {
            break;
        }
        output.extend_from_slice(&result[0]);
    }

    Ok(output
        .into_iter()
        .skip(delay)
        .take(expected)
        .map(|s| s as f32)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_empty_is_silence() {
        let (samples, rate) = decode_mp3(&[]).unwrap();
        assert!(samples.is_empty());
        assert_eq!(rate, PLAYBACK_SAMPLE_RATE);
    }

    #[test]
    fn test_resample_identity() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(resample(&samples, 24000, 24000).unwrap(), samples);
    }

    #[test]
    fn test_resample_short_clip_keeps_length() {
        let samples = vec![0.0, 1.0, 0.0, -1.0];
        let out = resample(&samples, 12000, 24000).unwrap();
        assert_eq!(out.len(), 8);
    }

    #[test]
    fn test_resample_keeps_tail_of_long_clip() {
        // Not a multiple of the chunk size
        let samples = vec![0.5_f32; 44_100 + 300];
        let out = resample(&samples, 44_100, 24_000).unwrap();

        assert_eq!(out.len(), 24_163);
        let mid = out[out.len() / 2];
        assert!((mid - 0.5).abs() < 0.01, "mid sample was {mid}");
    }

    #[test]
    fn test_resample_preserves_tone_energy() {
        #[allow(clippy::cast_precision_loss)]
        let samples: Vec<f32> = (0..48_000)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 48_000.0).sin() * 0.5)
            .collect();
        let out = resample(&samples, 48_000, 24_000).unwrap();
        assert_eq!(out.len(), 24_000);

        #[allow(clippy::cast_precision_loss)]
        let rms = {
            let middle = &out[2_000..22_000];
            (middle.iter().map(|s| s * s).sum::<f32>() / middle.len() as f32).sqrt()
        };
        assert!((rms - 0.5 / 2.0_f32.sqrt()).abs() < 0.02, "rms was {rms}");
    }

    #[tokio::test]
    async fn test_clip_writer_keeps_only_latest_clip() {
        let dir = tempfile::tempdir().unwrap();
        let clips = dir.path().join("clips");
        let mut writer = ClipWriter::new(&clips).unwrap();

        writer.play(b"first").await.unwrap();
        let first = writer.last_clip().unwrap().to_path_buf();
        assert_eq!(std::fs::read(&first).unwrap(), b"first");

        writer.play(b"second").await.unwrap();
        let second = writer.last_clip().unwrap().to_path_buf();

        assert_ne!(first, second);
        assert!(!first.exists());
        assert_eq!(std::fs::read(&second).unwrap(), b"second");
        assert!(second.extension().is_some_and(|e| e == "mp3"));
        assert!(second.starts_with(&clips));

        drop(writer);
        assert!(!second.exists());
        assert_eq!(std::fs::read_dir(&clips).unwrap().count(), 0);
    }

    struct Unplugged;

    impl OutputDevice for Unplugged {
        fn play_file(&self, _path: &Path) -> Result<()> {
            Err(Error::Io(std::io::Error::other("device unplugged")))
        }
    }

    #[tokio::test]
    async fn test_speaker_opens_device_on_first_play() {
        let opens = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&opens);
        let mut speaker = Speaker::with_opener(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(Error::Playback("no suitable output config found".to_string()))
            } else {
                Ok(Arc::new(Unplugged) as Arc<dyn OutputDevice>)
            }
        });
        assert_eq!(opens.load(Ordering::SeqCst), 0);

        let err = speaker.play(b"clip").await.unwrap_err();
        assert!(matches!(err, Error::Playback(msg) if msg.contains("output config")));

        // Retried on the next play; device errors become playback errors
        let err = speaker.play(b"clip").await.unwrap_err();
        assert!(matches!(err, Error::Playback(msg) if msg.contains("unplugged")));

        speaker.play(b"clip").await.unwrap_err();
        assert_eq!(opens.load(Ordering::SeqCst), 2);
    }
}
