//! Audio decoding, resampling, effects and final mixdown.
//!
//! Everything here is synchronous and CPU-bound; callers run it on
//! `spawn_blocking`. Internally all audio is interleaved `f32` stereo at
//! [`SAMPLE_RATE`].

pub mod decode;
pub mod effects;
pub mod mixer;
pub mod resample;

pub use mixer::{MixOptions, Mixer};

use crate::error::RemixError;
use crate::songwriter::SectionLabel;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Output sample rate for every mix.
pub const SAMPLE_RATE: u32 = 44_100;
pub const CHANNELS: u16 = 2;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot decode {path}: {message}")]
    Decode { path: PathBuf, message: String },

    #[error("resampling failed: {0}")]
    Resample(String),

    #[error("nothing to mix")]
    Empty,

    #[error("cannot write {path}: {message}")]
    Write { path: PathBuf, message: String },
}

impl From<AudioError> for RemixError {
    fn from(e: AudioError) -> Self {
        RemixError::Mix(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Vocal,
    Instrumental,
}

/// Where a segment sits on the song timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Spans the whole song (single vocal take, or a looped bed).
    Whole,
    Intro,
    Section { index: usize, label: SectionLabel },
    Outro,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    pub kind: SegmentKind,
    pub path: PathBuf,
    pub duration_seconds: f64,
    pub slot: Slot,
}

/// Interleaved PCM samples.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmBuffer {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.frames() as f64 / self.sample_rate as f64
        }
    }
}

/// Decode a file and bring it to stereo at [`SAMPLE_RATE`].
pub fn load(path: &Path) -> Result<PcmBuffer, AudioError> {
    let decoded = decode::decode_file(path)?;
    let stereo = resample::to_stereo(decoded);
    resample::resample(stereo, SAMPLE_RATE)
}

/// Playback length of an audio file in seconds.
pub fn probe_duration(path: &Path) -> Result<f64, AudioError> {
    Ok(decode::decode_file(path)?.duration_seconds())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Write a 16-bit sine WAV fixture.
    pub(crate) fn write_sine_wav(path: &Path, seconds: f32, sample_rate: u32, channels: u16) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        let frames = (seconds * sample_rate as f32) as usize;
        for i in 0..frames {
            let t = i as f32 / sample_rate as f32;
            let v = (t * 440.0 * std::f32::consts::TAU).sin() * 0.4;
            for _ in 0..channels {
                writer.write_sample((v * i16::MAX as f32) as i16).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_load_normalizes_rate_and_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        write_sine_wav(&path, 1.0, 22_050, 1);

        let pcm = load(&path).unwrap();
        assert_eq!(pcm.sample_rate, SAMPLE_RATE);
        assert_eq!(pcm.channels, CHANNELS);
        assert!((pcm.duration_seconds() - 1.0).abs() < 0.05);
        assert!((probe_duration(&path).unwrap() - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_audio_error_maps_to_mix() {
        let err: RemixError = AudioError::Empty.into();
        assert!(matches!(err, RemixError::Mix(ref m) if m == "nothing to mix"));
    }
}
