//! Channel layout and sample-rate conversion.

use super::{AudioError, CHANNELS, PcmBuffer};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::debug;

/// Mono is duplicated; more than two channels keep the first two.
pub fn to_stereo(buf: PcmBuffer) -> PcmBuffer {
    match buf.channels {
        2 => buf,
        1 => PcmBuffer {
            samples: buf.samples.iter().flat_map(|&s| [s, s]).collect(),
            sample_rate: buf.sample_rate,
            channels: CHANNELS,
        },
        n => {
            let n = n as usize;
            PcmBuffer {
                samples: buf
                    .samples
                    .chunks_exact(n)
                    .flat_map(|frame| [frame[0], frame[1]])
                    .collect(),
                sample_rate: buf.sample_rate,
                channels: CHANNELS,
            }
        }
    }
}

pub fn resample(buf: PcmBuffer, target_rate: u32) -> Result<PcmBuffer, AudioError> {
    if buf.sample_rate == target_rate {
        return Ok(buf);
    }
    let channels = buf.channels as usize;
    let frames = buf.frames();
    if frames == 0 || channels == 0 {
        return Ok(PcmBuffer {
            samples: Vec::new(),
            sample_rate: target_rate,
            channels: buf.channels,
        });
    }
    debug!(from = buf.sample_rate, to = target_rate, frames, "resampling");

    let planar = deinterleave(&buf.samples, channels);
    let mut resampler = FastFixedIn::<f32>::new(
        target_rate as f64 / buf.sample_rate as f64,
        1.0,
        PolynomialDegree::Septic,
        frames,
        channels,
    )
    .map_err(|e| AudioError::Resample(e.to_string()))?;

    let out = resampler
        .process(&planar, None)
        .map_err(|e| AudioError::Resample(e.to_string()))?;

    Ok(PcmBuffer {
        samples: interleave(&out),
        sample_rate: target_rate,
        channels: buf.channels,
    })
}

fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let mut planar = vec![Vec::with_capacity(samples.len() / channels); channels];
    for frame in samples.chunks_exact(channels) {
        for (ch, &s) in frame.iter().enumerate() {
            planar[ch].push(s);
        }
    }
    planar
}

fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = planar.first() else {
        return Vec::new();
    };
    let frames = first.len();
    let mut out = Vec::with_capacity(frames * planar.len());
    for i in 0..frames {
        for ch in planar {
            out.push(ch[i]);
        }
    }
    out
}
