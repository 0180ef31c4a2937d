//! Audio synthesis backends, one per mode.
//!
//! - fast: TTS vocals per section, no instrumental
//! - quick: fast vocals plus one MusicGen bed for the whole song
//! - full: vocals and an instrumental per section, plus intro/outro
//! - suno: one hosted call that returns a finished song, bypassing the mixer

pub mod replicate;
pub mod tts;

pub use replicate::ReplicateClient;
pub use tts::HttpSpeechClient;

use crate::audio::{self, AudioSegment, SegmentKind, Slot};
use crate::error::{RemixError, Result};
use crate::songwriter::SongDraft;
use crate::voice::VoiceProfile;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_STYLE: &str = "pop";
const BED_MIN_SECONDS: u32 = 10;
const BED_MAX_SECONDS: u32 = 30;
const SECTION_BED_MIN_SECONDS: u32 = 5;
const INTRO_OUTRO_SECONDS: u32 = 8;
const SONG_LYRICS_LIMIT: usize = 400;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Fast,
    Quick,
    Full,
    Suno,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Fast => "fast",
            Mode::Quick => "quick",
            Mode::Full => "full",
            Mode::Suno => "suno",
        }
    }

    /// Next mode to try when this one fails.
    pub fn cheaper(&self) -> Option<Mode> {
        match self {
            Mode::Full => Some(Mode::Quick),
            Mode::Suno => Some(Mode::Quick),
            Mode::Quick => Some(Mode::Fast),
            Mode::Fast => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(Mode::Fast),
            "quick" => Ok(Mode::Quick),
            "full" => Ok(Mode::Full),
            "suno" => Ok(Mode::Suno),
            other => anyhow::bail!("unknown mode '{other}' (expected fast, quick, full or suno)"),
        }
    }
}

/// Text to speech.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Encoded audio for `text` spoken with `voice`.
    async fn speak(&self, text: &str, voice: &VoiceProfile) -> Result<Vec<u8>>;
}

/// Hosted music generation.
#[async_trait]
pub trait MusicProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Instrumental of roughly `duration_secs`.
    async fn instrumental(&self, prompt: &str, duration_secs: u32) -> Result<Vec<u8>>;

    /// Finished, sung song for the given lyrics.
    async fn song(&self, prompt: &str, lyrics: &str) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum SynthOutput {
    /// Segments for the mixer.
    Segments(Vec<AudioSegment>),
    /// A finished file; no mixing needed.
    Mixed(PathBuf),
}

/// Everything a backend needs for one request.
pub struct SynthJob<'a> {
    pub draft: &'a SongDraft,
    pub voice: &'a VoiceProfile,
    pub style: Option<&'a str>,
    pub artist: &'a str,
    /// Directory for `{token}_*` segment files.
    pub workdir: &'a Path,
    pub token: &'a str,
    /// Final output path without extension, for backends that skip mixing.
    pub final_stem: &'a Path,
}

impl SynthJob<'_> {
    fn style(&self) -> &str {
        self.style
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_STYLE)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SynthBudgets {
    pub quick: Duration,
    pub full: Duration,
}

pub enum Synthesizer {
    Fast {
        speech: Arc<dyn SpeechProvider>,
    },
    Quick {
        speech: Arc<dyn SpeechProvider>,
        music: Arc<dyn MusicProvider>,
        budget: Duration,
    },
    Full {
        speech: Arc<dyn SpeechProvider>,
        music: Arc<dyn MusicProvider>,
        budget: Duration,
    },
    Suno {
        music: Arc<dyn MusicProvider>,
        budget: Duration,
    },
}

impl Synthesizer {
    pub fn new(
        mode: Mode,
        speech: Arc<dyn SpeechProvider>,
        music: Arc<dyn MusicProvider>,
        budgets: SynthBudgets,
    ) -> Self {
        match mode {
            Mode::Fast => Synthesizer::Fast { speech },
            Mode::Quick => Synthesizer::Quick {
                speech,
                music,
                budget: budgets.quick,
            },
            Mode::Full => Synthesizer::Full {
                speech,
                music,
                budget: budgets.full,
            },
            Mode::Suno => Synthesizer::Suno {
                music,
                budget: budgets.full,
            },
        }
    }

    pub fn mode(&self) -> Mode {
        match self {
            Synthesizer::Fast { .. } => Mode::Fast,
            Synthesizer::Quick { .. } => Mode::Quick,
            Synthesizer::Full { .. } => Mode::Full,
            Synthesizer::Suno { .. } => Mode::Suno,
        }
    }

    pub async fn synthesize(&self, job: &SynthJob<'_>) -> Result<SynthOutput> {
        info!(
            mode = %self.mode(),
            sections = job.draft.sections.len(),
            voice = %job.voice.voice_id,
            "synthesizing"
        );
        match self {
            Synthesizer::Fast { speech } => {
                let segments = vocal_sections(speech.as_ref(), job).await?;
                Ok(SynthOutput::Segments(segments))
            }
            Synthesizer::Quick {
                speech,
                music,
                budget,
            } => {
                within(*budget, async {
                    let mut segments = vocal_sections(speech.as_ref(), job).await?;
                    let vocal_seconds: f64 = segments.iter().map(|s| s.duration_seconds).sum();
                    let duration = (vocal_seconds.round() as u32 + 2)
                        .clamp(BED_MIN_SECONDS, BED_MAX_SECONDS);
                    let prompt = format!(
                        "{} instrumental, {} mood, melodic, background music for song titled {}",
                        job.style(),
                        job.draft.mood,
                        job.draft.title
                    );
                    let music = music.as_ref();
                    let bed =
                        instrumental(music, job, "bed", Slot::Whole, &prompt, duration).await?;
                    segments.push(bed);
                    Ok(SynthOutput::Segments(segments))
                })
                .await
            }
            Synthesizer::Full {
                speech,
                music,
                budget,
            } => {
                within(*budget, async {
                    let music = music.as_ref();
                    let mut segments = vocal_sections(speech.as_ref(), job).await?;
                    let vocal_lengths: Vec<(Slot, f64)> =
                        segments.iter().map(|s| (s.slot, s.duration_seconds)).collect();

                    let intro_prompt = format!(
                        "{} instrumental intro, {} mood, building anticipation",
                        job.style(),
                        job.draft.mood
                    );
                    let intro = instrumental(
                        music,
                        job,
                        "intro",
                        Slot::Intro,
                        &intro_prompt,
                        INTRO_OUTRO_SECONDS,
                    )
                    .await?;
                    segments.push(intro);

                    for (slot, seconds) in vocal_lengths {
                        let Slot::Section { index, label } = slot else {
                            continue;
                        };
                        let duration = (seconds.ceil() as u32 + 1)
                            .clamp(SECTION_BED_MIN_SECONDS, BED_MAX_SECONDS);
                        let prompt = format!(
                            "{} instrumental {} section, {} mood, melodic, for song titled {}",
                            job.style(),
                            label,
                            job.draft.mood,
                            job.draft.title
                        );
                        let name = format!("inst_{index}");
                        let bed = instrumental(music, job, &name, slot, &prompt, duration).await?;
                        segments.push(bed);
                    }

                    let outro_prompt = format!(
                        "{} instrumental outro, {} mood, gentle fade",
                        job.style(),
                        job.draft.mood
                    );
                    let outro = instrumental(
                        music,
                        job,
                        "outro",
                        Slot::Outro,
                        &outro_prompt,
                        INTRO_OUTRO_SECONDS,
                    )
                    .await?;
                    segments.push(outro);
                    Ok(SynthOutput::Segments(segments))
                })
                .await
            }
            Synthesizer::Suno { music, budget } => {
                within(*budget, async {
                    let prompt = format!(
                        "{}, professional production, catchy melody, inspired by {}",
                        job.style(),
                        job.artist
                    );
                    let lyrics = truncate_lyrics(&job.draft.labeled_text(), SONG_LYRICS_LIMIT);
                    debug!(provider = music.name(), chars = lyrics.len(), "requesting full song");
                    let bytes = music.song(&prompt, &lyrics).await?;
                    let path = job.final_stem.with_extension(sniff_extension(&bytes));
                    tokio::fs::write(&path, &bytes).await.map_err(|e| {
                        RemixError::Synthesis(format!("write {}: {e}", path.display()))
                    })?;
                    Ok(SynthOutput::Mixed(path))
                })
                .await
            }
        }
    }
}

/// Request one instrumental clip and store it as a segment.
async fn instrumental(
    music: &dyn MusicProvider,
    job: &SynthJob<'_>,
    name: &str,
    slot: Slot,
    prompt: &str,
    duration_secs: u32,
) -> Result<AudioSegment> {
    debug!(provider = music.name(), name, duration_secs, "requesting instrumental");
    let bytes = music.instrumental(prompt, duration_secs).await?;
    write_segment(job, name, SegmentKind::Instrumental, slot, &bytes).await
}

async fn within<T>(budget: Duration, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(budget, fut)
        .await
        .map_err(|_| RemixError::Synthesis(format!("timed out after {}s", budget.as_secs())))?
}

async fn vocal_sections(
    speech: &dyn SpeechProvider,
    job: &SynthJob<'_>,
) -> Result<Vec<AudioSegment>> {
    let mut segments = Vec::with_capacity(job.draft.sections.len());
    for (index, section) in job.draft.sections.iter().enumerate() {
        debug!(provider = speech.name(), index, label = %section.label, "speaking section");
        let bytes = speech.speak(&section.text, job.voice).await?;
        let slot = Slot::Section {
            index,
            label: section.label,
        };
        let name = format!("vocal_{index}");
        segments.push(write_segment(job, &name, SegmentKind::Vocal, slot, &bytes).await?);
    }
    Ok(segments)
}

/// Store provider audio as `{token}_{name}.{ext}` and measure it.
async fn write_segment(
    job: &SynthJob<'_>,
    name: &str,
    kind: SegmentKind,
    slot: Slot,
    bytes: &[u8],
) -> Result<AudioSegment> {
    if bytes.is_empty() {
        return Err(RemixError::Synthesis(format!("provider returned no audio for {name}")));
    }
    let path = job
        .workdir
        .join(format!("{}_{}.{}", job.token, name, sniff_extension(bytes)));
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| RemixError::Synthesis(format!("write {}: {e}", path.display())))?;

    let probe_path = path.clone();
    let duration_seconds = tokio::task::spawn_blocking(move || audio::probe_duration(&probe_path))
        .await
        .map_err(|e| RemixError::Synthesis(format!("probe task failed: {e}")))?
        .map_err(|e| RemixError::Synthesis(format!("unreadable audio from provider: {e}")))?;

    Ok(AudioSegment {
        kind,
        path,
        duration_seconds,
        slot,
    })
}

/// File extension from the leading bytes of encoded audio.
pub fn sniff_extension(bytes: &[u8]) -> &'static str {
    match bytes {
        [b'R', b'I', b'F', b'F', ..] => "wav",
        [b'I', b'D', b'3', ..] => "mp3",
        [0xFF, b, ..] if b & 0xE0 == 0xE0 => "mp3",
        [b'f', b'L', b'a', b'C', ..] => "flac",
        [b'O', b'g', b'g', b'S', ..] => "ogg",
        _ => "bin",
    }
}

/// Cut lyrics to at most `limit` bytes, on a line boundary when possible.
pub fn truncate_lyrics(lyrics: &str, limit: usize) -> String {
    if lyrics.len() <= limit {
        return lyrics.to_string();
    }
    let mut end = limit;
    while !lyrics.is_char_boundary(end) {
        end -= 1;
    }
    let head = &lyrics[..end];
    match head.rfind('\n') {
        Some(nl) if nl > 0 => head[..nl].trim_end().to_string(),
        _ => head.trim_end().to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::songwriter::{Section, SectionLabel};
    use crate::themes::Mood;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 16-bit mono WAV bytes.
    pub(crate) fn wav_bytes(seconds: f32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut w = hound::WavWriter::new(&mut cursor, spec).unwrap();
            let frames = (seconds * 22_050.0) as usize;
            for i in 0..frames {
                let v = ((i as f32 / 22_050.0) * 330.0 * std::f32::consts::TAU).sin() * 0.3;
                w.write_sample((v * i16::MAX as f32) as i16).unwrap();
            }
            w.finalize().unwrap();
        }
        cursor.into_inner()
    }

    pub(crate) struct FakeSpeech {
        pub seconds: f32,
        pub calls: AtomicUsize,
    }

    impl FakeSpeech {
        pub(crate) fn new(seconds: f32) -> Self {
            Self {
                seconds,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SpeechProvider for FakeSpeech {
        fn name(&self) -> &str {
            "fake-tts"
        }

        async fn speak(&self, _text: &str, _voice: &VoiceProfile) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(wav_bytes(self.seconds))
        }
    }

    #[derive(Default)]
    pub(crate) struct FakeMusic {
        pub durations: Mutex<Vec<u32>>,
        pub lyrics: Mutex<Vec<String>>,
        pub fail: bool,
    }

    #[async_trait]
    impl MusicProvider for FakeMusic {
        fn name(&self) -> &str {
            "fake-music"
        }

        async fn instrumental(&self, _prompt: &str, duration_secs: u32) -> Result<Vec<u8>> {
            if self.fail {
                return Err(RemixError::Synthesis("quota exceeded".to_string()));
            }
            self.durations.lock().unwrap().push(duration_secs);
            Ok(wav_bytes(0.5))
        }

        async fn song(&self, _prompt: &str, lyrics: &str) -> Result<Vec<u8>> {
            if self.fail {
                return Err(RemixError::Synthesis("quota exceeded".to_string()));
            }
            self.lyrics.lock().unwrap().push(lyrics.to_string());
            let mut bytes = b"ID3".to_vec();
            bytes.extend_from_slice(&[0u8; 64]);
            Ok(bytes)
        }
    }

    fn draft() -> SongDraft {
        SongDraft {
            title: "Other Side".to_string(),
            mood: Mood::Melancholic,
            sections: vec![
                Section {
                    label: SectionLabel::Verse,
                    text: "hello again".to_string(),
                },
                Section {
                    label: SectionLabel::Chorus,
                    text: "from the other side".to_string(),
                },
            ],
        }
    }

    fn voice() -> VoiceProfile {
        VoiceProfile {
            voice_id: "en-US-JennyNeural".to_string(),
            rate: -15,
            pitch: -4,
        }
    }

    fn budgets() -> SynthBudgets {
        SynthBudgets {
            quick: Duration::from_secs(30),
            full: Duration::from_secs(30),
        }
    }

    async fn run(mode: Mode, music: Arc<FakeMusic>, dir: &Path) -> Result<SynthOutput> {
        let synth = Synthesizer::new(mode, Arc::new(FakeSpeech::new(1.0)), music, budgets());
        let draft = draft();
        let voice = voice();
        let stem = dir.join("final");
        let job = SynthJob {
            draft: &draft,
            voice: &voice,
            style: Some("acoustic"),
            artist: "Adele",
            workdir: dir,
            token: "abc123",
            final_stem: &stem,
        };
        synth.synthesize(&job).await
    }

    #[test]
    fn test_mode_parse_and_fallback_chain() {
        assert_eq!("QUICK".parse::<Mode>().unwrap(), Mode::Quick);
        assert!("loud".parse::<Mode>().is_err());
        assert_eq!(Mode::Full.cheaper(), Some(Mode::Quick));
        assert_eq!(Mode::Suno.cheaper(), Some(Mode::Quick));
        assert_eq!(Mode::Quick.cheaper(), Some(Mode::Fast));
        assert_eq!(Mode::Fast.cheaper(), None);
    }

    #[tokio::test]
    async fn test_fast_renders_one_vocal_per_section() {
        let dir = tempfile::tempdir().unwrap();
        let out = run(Mode::Fast, Arc::new(FakeMusic::default()), dir.path())
            .await
            .unwrap();
        let SynthOutput::Segments(segments) = out else {
            panic!("expected segments");
        };
        assert_eq!(segments.len(), 2);
        assert!(segments.iter().all(|s| s.kind == SegmentKind::Vocal));
        assert_eq!(segments[0].path, dir.path().join("abc123_vocal_0.wav"));
        assert!((segments[0].duration_seconds - 1.0).abs() < 0.01);
        assert!(matches!(
            segments[1].slot,
            Slot::Section {
                index: 1,
                label: SectionLabel::Chorus
            }
        ));
    }

    #[tokio::test]
    async fn test_quick_bed_duration_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let music = Arc::new(FakeMusic::default());
        let out = run(Mode::Quick, music.clone(), dir.path()).await.unwrap();
        let SynthOutput::Segments(segments) = out else {
            panic!("expected segments");
        };
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[2].slot, Slot::Whole);
        // 2s of vocals + 2 = 4, clamped up to 10
        assert_eq!(*music.durations.lock().unwrap(), vec![10]);
    }

    #[tokio::test]
    async fn test_full_adds_intro_sections_and_outro() {
        let dir = tempfile::tempdir().unwrap();
        let music = Arc::new(FakeMusic::default());
        let out = run(Mode::Full, music.clone(), dir.path()).await.unwrap();
        let SynthOutput::Segments(segments) = out else {
            panic!("expected segments");
        };
        let slots: Vec<Slot> = segments
            .iter()
            .filter(|s| s.kind == SegmentKind::Instrumental)
            .map(|s| s.slot)
            .collect();
        assert_eq!(slots.first(), Some(&Slot::Intro));
        assert_eq!(slots.last(), Some(&Slot::Outro));
        assert_eq!(slots.len(), 4);
        assert_eq!(*music.durations.lock().unwrap(), vec![8, 5, 5, 8]);
    }

    #[tokio::test]
    async fn test_suno_writes_finished_file() {
        let dir = tempfile::tempdir().unwrap();
        let music = Arc::new(FakeMusic::default());
        let out = run(Mode::Suno, music.clone(), dir.path()).await.unwrap();
        assert_eq!(out, SynthOutput::Mixed(dir.path().join("final.mp3")));
        assert!(dir.path().join("final.mp3").exists());
        assert!(music.lyrics.lock().unwrap()[0].starts_with("[Verse]\nhello again"));
    }

    #[tokio::test]
    async fn test_provider_failure_is_synthesis_error() {
        let dir = tempfile::tempdir().unwrap();
        let music = Arc::new(FakeMusic {
            fail: true,
            ..Default::default()
        });
        let err = run(Mode::Quick, music, dir.path()).await.unwrap_err();
        assert!(matches!(err, RemixError::Synthesis(ref m) if m == "quota exceeded"));
    }

    #[test]
    fn test_sniff_extension() {
        assert_eq!(sniff_extension(&wav_bytes(0.01)), "wav");
        assert_eq!(sniff_extension(b"ID3\x04rest"), "mp3");
        assert_eq!(sniff_extension(&[0xFF, 0xFB, 0x90]), "mp3");
        assert_eq!(sniff_extension(b"??"), "bin");
    }

    #[test]
    fn test_truncate_lyrics_on_line_boundary() {
        let lyrics = "first line\nsecond line\nthird line";
        assert_eq!(truncate_lyrics(lyrics, 100), lyrics);
        assert_eq!(truncate_lyrics(lyrics, 25), "first line\nsecond line");
        assert_eq!(truncate_lyrics("no newlines here", 5), "no ne");
    }
}
