//! Voice pipeline integration tests
//!
//! Tests voice components without requiring audio hardware

use std::time::Duration;

use tokio_test::assert_ok;

use neon_assistant::voice::{
    self, AudioBuffer, AudioInput, FrameReceiver, SAMPLE_RATE, TempAudioFile, pcm16_to_f32,
    to_pcm16, write_wav,
};

mod common;

use common::generate_sine_samples;

/// Input whose stream opens but never delivers a frame
struct DeadMicrophone {
    sender: Option<tokio::sync::mpsc::UnboundedSender<Vec<f32>>>,
}

impl AudioInput for DeadMicrophone {
    fn start(&mut self) -> neon_assistant::Result<FrameReceiver> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        self.sender = Some(tx);
        Ok(rx)
    }

    fn stop(&mut self) {
        self.sender = None;
    }
}

#[test]
fn test_wav_roundtrip_preserves_speech() {
    let samples = generate_sine_samples(SAMPLE_RATE, 440.0, 0.5, 0.8);
    let audio = AudioBuffer::new(samples.clone(), SAMPLE_RATE);

    let staged = TempAudioFile::create(".wav").unwrap();
    write_wav(staged.path(), &audio).unwrap();

    let mut reader = hound::WavReader::open(staged.path()).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(spec.sample_format, hound::SampleFormat::Int);

    let decoded: Vec<f32> = reader
        .samples::<i16>()
        .map(|s| pcm16_to_f32(s.unwrap()))
        .collect();
    assert_eq!(decoded.len(), samples.len());

    let step = 1.0 / 32767.0;
    for (original, decoded) in samples.iter().zip(&decoded) {
        assert!((original - decoded).abs() <= step);
    }
}

#[test]
fn test_pcm_clips_out_of_range_samples() {
    assert_eq!(to_pcm16(&[1.5, -1.5]), vec![32767, -32767]);
    assert_eq!(to_pcm16(&[]), Vec::<i16>::new());
}

#[test]
fn test_silence_has_zero_energy() {
    let audio = AudioBuffer::new(vec![0.0; 16000], SAMPLE_RATE);
    assert!(audio.rms().abs() < f32::EPSILON);
    assert_eq!(audio.duration(), Duration::from_secs(1));
}

#[tokio::test]
async fn test_capture_without_frames_is_none() {
    let mut mic = DeadMicrophone { sender: None };
    let captured = assert_ok!(voice::capture(&mut mic, Duration::from_millis(50)).await);

    assert!(captured.is_none());
    // Capture stops the input when the window closes
    assert!(mic.sender.is_none());
}

#[test]
fn test_temp_files_are_unique_and_removed() {
    let first = TempAudioFile::create(".mp3").unwrap();
    let second = TempAudioFile::create(".mp3").unwrap();
    let (a, b) = (first.path().to_path_buf(), second.path().to_path_buf());

    assert_ne!(a, b);
    assert!(a.exists() && b.exists());
    assert!(a.to_string_lossy().ends_with(".mp3"));

    first.close();
    drop(second);
    assert!(!a.exists());
    assert!(!b.exists());
}
