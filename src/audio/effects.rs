//! Sample-level effects on interleaved stereo buffers.
//!
//! Every effect keeps the buffer length unchanged.

use super::{CHANNELS, SAMPLE_RATE};

const CH: usize = CHANNELS as usize;

/// Section character for effect and volume choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Intro,
    Verse,
    Chorus,
    Bridge,
    Outro,
}

pub fn db_to_gain(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

pub fn apply_gain(samples: &mut [f32], db: f32) {
    let g = db_to_gain(db);
    for s in samples.iter_mut() {
        *s *= g;
    }
}

fn frames(samples: &[f32]) -> usize {
    samples.len() / CH
}

/// Comb-filter reverb: four decaying taps mixed against the dry signal.
pub fn reverb(samples: &mut [f32], room_size: f32, wet_mix: f32) {
    let n = frames(samples);
    let base_delay = (room_size * 0.05 * SAMPLE_RATE as f32) as usize;
    let decay = 0.3 + room_size * 0.4;
    let dry = samples.to_vec();
    let mut wet = dry.clone();

    for (i, mult) in [1.0f32, 1.3, 1.7, 2.1].iter().enumerate() {
        let delay = (base_delay as f32 * mult) as usize;
        if delay == 0 || delay >= n {
            continue;
        }
        let g = decay.powi(i as i32 + 1);
        for f in delay..n {
            for c in 0..CH {
                wet[f * CH + c] += dry[(f - delay) * CH + c] * g;
            }
        }
    }

    for (s, (d, w)) in samples.iter_mut().zip(dry.iter().zip(wet.iter())) {
        *s = d * (1.0 - wet_mix) + w * wet_mix;
    }
}

/// LFO-modulated short delay, scaled down to avoid clipping.
pub fn chorus(samples: &mut [f32], depth: f32, lfo_hz: f32) {
    let n = frames(samples);
    let max_delay = 0.020 * depth;
    let dry = samples.to_vec();
    for f in 0..n {
        let t = f as f32 / SAMPLE_RATE as f32;
        let offset = ((t * lfo_hz * std::f32::consts::TAU).sin() * max_delay * SAMPLE_RATE as f32)
            as isize;
        let src = f as isize - offset;
        for c in 0..CH {
            let mut v = dry[f * CH + c];
            if src >= 0 && (src as usize) < n {
                v += dry[src as usize * CH + c] * 0.5;
            }
            samples[f * CH + c] = v * 0.7;
        }
    }
}

/// Feedback echo.
pub fn delay(samples: &mut [f32], delay_ms: u32, feedback: f32, mix: f32) {
    let n = frames(samples);
    let d = (delay_ms as usize * SAMPLE_RATE as usize) / 1000;
    if d == 0 || d >= n {
        return;
    }
    let dry = samples.to_vec();
    let mut echoed = dry.clone();
    for f in d..n {
        for c in 0..CH {
            echoed[f * CH + c] += echoed[(f - d) * CH + c] * feedback;
        }
    }
    for (s, (dr, e)) in samples.iter_mut().zip(dry.iter().zip(echoed.iter())) {
        *s = dr * (1.0 - mix) + e * mix;
    }
}

/// Shift pitch by reading faster or slower with linear interpolation. The
/// tail past the source end is silent.
pub fn pitch_shift(samples: &[f32], semitones: f32) -> Vec<f32> {
    let n = frames(samples);
    let ratio = 2f32.powf(semitones / 12.0);
    let mut out = vec![0.0; samples.len()];
    for f in 0..n {
        let pos = f as f32 * ratio;
        let i = pos as usize;
        if i + 1 >= n {
            break;
        }
        let frac = pos - i as f32;
        for c in 0..CH {
            let a = samples[i * CH + c];
            let b = samples[(i + 1) * CH + c];
            out[f * CH + c] = a + (b - a) * frac;
        }
    }
    out
}

fn overlay_into(dst: &mut [f32], src: &[f32]) {
    for (d, s) in dst.iter_mut().zip(src.iter()) {
        *d += s;
    }
}

/// Lead boosted with quieter pitch-shifted copies: full harmonies on chorus
/// and bridge, a single quiet fifth on verses.
pub fn vocal_layers(samples: &mut [f32], kind: SectionKind, num_harmonies: usize) {
    let lead = samples.to_vec();
    apply_gain(samples, 2.0);

    let layers: &[(f32, f32)] = match kind {
        SectionKind::Chorus | SectionKind::Bridge => {
            &[(3.0, -6.0), (5.0, -8.0), (-3.0, -7.0), (7.0, -9.0)]
        }
        SectionKind::Verse => &[(5.0, -10.0)],
        SectionKind::Intro | SectionKind::Outro => &[],
    };
    let take = match kind {
        SectionKind::Verse => num_harmonies.min(1),
        _ => num_harmonies,
    };
    for &(interval, volume_db) in layers.iter().take(take) {
        let mut harmony = pitch_shift(&lead, interval);
        apply_gain(&mut harmony, volume_db);
        overlay_into(samples, &harmony);
    }
}

pub fn section_effects(samples: &mut [f32], kind: SectionKind) {
    match kind {
        SectionKind::Intro => reverb(samples, 0.3, 0.2),
        SectionKind::Verse => reverb(samples, 0.4, 0.25),
        SectionKind::Chorus => {
            reverb(samples, 0.6, 0.35);
            chorus(samples, 0.25, 1.5);
        }
        SectionKind::Bridge => {
            reverb(samples, 0.5, 0.3);
            delay(samples, 250, 0.3, 0.2);
        }
        SectionKind::Outro => reverb(samples, 0.7, 0.4),
    }
}

pub fn dynamic_volume(samples: &mut [f32], kind: SectionKind) {
    let db = match kind {
        SectionKind::Intro => -3.0,
        SectionKind::Verse => -2.0,
        SectionKind::Chorus => 2.0,
        SectionKind::Bridge => 0.0,
        SectionKind::Outro => -4.0,
    };
    apply_gain(samples, db);
}

pub fn fade_in(samples: &mut [f32], fade_frames: usize) {
    let n = frames(samples).min(fade_frames);
    for f in 0..n {
        let g = f as f32 / fade_frames as f32;
        for c in 0..CH {
            samples[f * CH + c] *= g;
        }
    }
}

pub fn fade_out(samples: &mut [f32], fade_frames: usize) {
    let total = frames(samples);
    let n = total.min(fade_frames);
    for k in 0..n {
        let f = total - n + k;
        let g = (n - k) as f32 / n as f32;
        for c in 0..CH {
            samples[f * CH + c] *= g;
        }
    }
}

/// Repeat or cut a buffer to exactly `target_frames`.
pub fn loop_to(samples: &[f32], target_frames: usize) -> Vec<f32> {
    if samples.is_empty() {
        return vec![0.0; target_frames * CH];
    }
    samples
        .iter()
        .copied()
        .cycle()
        .take(target_frames * CH)
        .collect()
}

pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
}

/// Scale toward `target_dbfs` RMS without letting the peak exceed `peak_limit`.
/// Silence is left alone.
pub fn normalize(samples: &mut [f32], target_dbfs: f32, peak_limit: f32) {
    let current = rms(samples);
    if current <= f32::EPSILON {
        return;
    }
    let mut gain = db_to_gain(target_dbfs) / current;
    let p = peak(samples);
    if p * gain > peak_limit {
        gain = peak_limit / p;
    }
    for s in samples.iter_mut() {
        *s *= gain;
    }
}
