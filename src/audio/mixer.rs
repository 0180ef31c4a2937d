//! Final mixdown: place segments on a timeline, apply effects, normalize and
//! write a 16-bit stereo WAV.

use super::effects::{self, SectionKind};
use super::{AudioError, AudioSegment, CHANNELS, SAMPLE_RATE, SegmentKind, Slot};
use crate::songwriter::SectionLabel;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

const CH: usize = CHANNELS as usize;
const TAIL_SECONDS: f32 = 2.0;
const INTRO_FADE_SECONDS: f32 = 1.0;
const PEAK_LIMIT: f32 = 0.98;
const HARMONY_LAYERS: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixOptions {
    pub target_rms_dbfs: f32,
    pub vocal_gain_db: f32,
    pub instrumental_gain_db: f32,
    /// Reverb/chorus/delay and per-section volume on vocal sections.
    pub section_effects: bool,
    /// Pitch-shifted harmony layers on vocal sections.
    #[serde(skip)]
    pub harmonies: bool,
}

impl Default for MixOptions {
    fn default() -> Self {
        Self {
            target_rms_dbfs: -16.0,
            vocal_gain_db: 3.0,
            instrumental_gain_db: -3.0,
            section_effects: true,
            harmonies: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MixReport {
    pub duration_seconds: f64,
}

pub struct Mixer {
    options: MixOptions,
}

fn section_kind(label: SectionLabel) -> SectionKind {
    match label {
        SectionLabel::Verse => SectionKind::Verse,
        SectionLabel::Chorus => SectionKind::Chorus,
        SectionLabel::Bridge => SectionKind::Bridge,
    }
}

fn seconds_to_frames(seconds: f32) -> usize {
    (seconds * SAMPLE_RATE as f32) as usize
}

fn overlay_at(dst: &mut Vec<f32>, src: &[f32], start_frame: usize) {
    let start = start_frame * CH;
    if dst.len() < start + src.len() {
        dst.resize(start + src.len(), 0.0);
    }
    for (d, s) in dst[start..].iter_mut().zip(src.iter()) {
        *d += s;
    }
}

impl Mixer {
    pub fn new(options: MixOptions) -> Self {
        Self { options }
    }

    pub fn mix(&self, segments: &[AudioSegment], out_path: &Path) -> Result<MixReport, AudioError> {
        let mut vocals: Vec<(&AudioSegment, Vec<f32>)> = Vec::new();
        let mut intro: Option<Vec<f32>> = None;
        let mut outro: Option<Vec<f32>> = None;
        let mut bed: Option<Vec<f32>> = None;
        let mut section_beds: Vec<(usize, Vec<f32>)> = Vec::new();

        for seg in segments {
            let pcm = super::load(&seg.path)?;
            match (seg.kind, seg.slot) {
                (SegmentKind::Vocal, _) => vocals.push((seg, pcm.samples)),
                (SegmentKind::Instrumental, Slot::Intro) => intro = Some(pcm.samples),
                (SegmentKind::Instrumental, Slot::Outro) => outro = Some(pcm.samples),
                (SegmentKind::Instrumental, Slot::Whole) => bed = Some(pcm.samples),
                (SegmentKind::Instrumental, Slot::Section { index, .. }) => {
                    section_beds.push((index, pcm.samples))
                }
            }
        }
        vocals.sort_by_key(|(seg, _)| match seg.slot {
            Slot::Section { index, .. } => index,
            _ => 0,
        });

        let mut timeline: Vec<f32> = Vec::new();
        let intro_frames = intro.as_ref().map_or(0, |s| s.len() / CH);
        if let Some(mut intro) = intro {
            effects::apply_gain(&mut intro, self.options.instrumental_gain_db);
            effects::fade_in(&mut intro, seconds_to_frames(INTRO_FADE_SECONDS));
            if self.options.section_effects {
                effects::section_effects(&mut intro, SectionKind::Intro);
            }
            overlay_at(&mut timeline, &intro, 0);
        }

        // Vocal sections back to back after the intro.
        let mut cursor = intro_frames;
        let mut placed: Vec<(usize, usize, usize)> = Vec::new();
        for (seg, mut samples) in vocals {
            if let Slot::Section { index, label } = seg.slot {
                let kind = section_kind(label);
                if self.options.section_effects {
                    effects::dynamic_volume(&mut samples, kind);
                    if self.options.harmonies {
                        effects::vocal_layers(&mut samples, kind, HARMONY_LAYERS);
                    }
                    effects::section_effects(&mut samples, kind);
                }
                placed.push((index, cursor, samples.len() / CH));
            }
            effects::apply_gain(&mut samples, self.options.vocal_gain_db);
            let frames = samples.len() / CH;
            overlay_at(&mut timeline, &samples, cursor);
            cursor += frames;
        }
        let vocal_end = cursor;

        for (index, mut samples) in section_beds {
            let Some(&(_, start, len)) = placed.iter().find(|(i, _, _)| *i == index) else {
                warn!(index, "no vocal for section instrumental, dropping it");
                continue;
            };
            effects::apply_gain(&mut samples, self.options.instrumental_gain_db);
            let fitted = effects::loop_to(&samples, len);
            overlay_at(&mut timeline, &fitted, start);
        }

        if let Some(mut samples) = bed {
            let len = vocal_end - intro_frames + seconds_to_frames(TAIL_SECONDS);
            effects::apply_gain(&mut samples, self.options.instrumental_gain_db);
            let mut fitted = effects::loop_to(&samples, len);
            effects::fade_out(&mut fitted, seconds_to_frames(TAIL_SECONDS));
            overlay_at(&mut timeline, &fitted, intro_frames);
        }

        if let Some(mut samples) = outro {
            effects::apply_gain(&mut samples, self.options.instrumental_gain_db);
            if self.options.section_effects {
                effects::section_effects(&mut samples, SectionKind::Outro);
            }
            let end = timeline.len() / CH;
            overlay_at(&mut timeline, &samples, end);
        }

        if timeline.is_empty() {
            return Err(AudioError::Empty);
        }

        effects::normalize(&mut timeline, self.options.target_rms_dbfs, PEAK_LIMIT);
        write_wav(out_path, &timeline)?;

        let duration_seconds = (timeline.len() / CH) as f64 / SAMPLE_RATE as f64;
        info!(path = %out_path.display(), duration_seconds, "mix written");
        Ok(MixReport { duration_seconds })
    }
}

fn write_wav(path: &Path, samples: &[f32]) -> Result<(), AudioError> {
    let write_err = |e: hound::Error| AudioError::Write {
        path: path.to_path_buf(),
        message: e.to_string(),
    };
    let spec = hound::WavSpec {
        channels: CHANNELS,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(write_err)?;
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(v).map_err(write_err)?;
    }
    writer.finalize().map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::tests::write_sine_wav;
    use std::path::PathBuf;

    fn seg(kind: SegmentKind, path: PathBuf, slot: Slot) -> AudioSegment {
        AudioSegment {
            kind,
            path,
            duration_seconds: 0.0,
            slot,
        }
    }

    fn wav_seconds(path: &Path) -> f64 {
        let reader = hound::WavReader::open(path).unwrap();
        reader.duration() as f64 / reader.spec().sample_rate as f64
    }

    #[test]
    fn test_single_vocal_keeps_duration() {
        let dir = tempfile::tempdir().unwrap();
        let vocal = dir.path().join("v.wav");
        write_sine_wav(&vocal, 1.5, 24_000, 1);
        let out = dir.path().join("out.wav");

        let report = Mixer::new(MixOptions::default())
            .mix(&[seg(SegmentKind::Vocal, vocal, Slot::Whole)], &out)
            .unwrap();
        assert!((report.duration_seconds - 1.5).abs() < 0.05);
        assert!((wav_seconds(&out) - 1.5).abs() < 0.05);

        let spec = hound::WavReader::open(&out).unwrap().spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 44_100);
        assert_eq!(spec.bits_per_sample, 16);
    }

    #[test]
    fn test_bed_extends_past_vocals() {
        let dir = tempfile::tempdir().unwrap();
        let vocal = dir.path().join("v.wav");
        let bed = dir.path().join("bed.wav");
        write_sine_wav(&vocal, 1.0, 44_100, 2);
        write_sine_wav(&bed, 0.4, 44_100, 2);
        let out = dir.path().join("out.wav");

        let report = Mixer::new(MixOptions::default())
            .mix(
                &[
                    seg(SegmentKind::Vocal, vocal, Slot::Whole),
                    seg(SegmentKind::Instrumental, bed, Slot::Whole),
                ],
                &out,
            )
            .unwrap();
        assert!((report.duration_seconds - 3.0).abs() < 0.01);
    }

    #[test]
    fn test_sections_with_intro_outro_and_harmonies() {
        let dir = tempfile::tempdir().unwrap();
        let p = |name: &str, secs: f32| {
            let path = dir.path().join(name);
            write_sine_wav(&path, secs, 44_100, 1);
            path
        };
        let verse = Slot::Section {
            index: 0,
            label: SectionLabel::Verse,
        };
        let chorus = Slot::Section {
            index: 1,
            label: SectionLabel::Chorus,
        };
        let segments = vec![
            seg(SegmentKind::Vocal, p("v1.wav", 0.5), chorus),
            seg(SegmentKind::Vocal, p("v0.wav", 0.5), verse),
            seg(SegmentKind::Instrumental, p("i0.wav", 0.2), verse),
            seg(SegmentKind::Instrumental, p("i1.wav", 0.2), chorus),
            seg(SegmentKind::Instrumental, p("intro.wav", 0.25), Slot::Intro),
            seg(SegmentKind::Instrumental, p("outro.wav", 0.25), Slot::Outro),
        ];
        let out = dir.path().join("out.wav");
        let options = MixOptions {
            harmonies: true,
            ..MixOptions::default()
        };
        let report = Mixer::new(options).mix(&segments, &out).unwrap();
        assert!((report.duration_seconds - 1.5).abs() < 0.01);
    }

    #[test]
    fn test_mix_errors() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.wav");
        let mixer = Mixer::new(MixOptions::default());
        assert!(matches!(mixer.mix(&[], &out), Err(AudioError::Empty)));

        let corrupt = dir.path().join("corrupt.wav");
        std::fs::write(&corrupt, b"definitely not audio").unwrap();
        let err = mixer
            .mix(&[seg(SegmentKind::Vocal, corrupt, Slot::Whole)], &out)
            .unwrap_err();
        assert!(matches!(err, AudioError::Decode { .. }));
        assert!(!out.exists());
    }
}
