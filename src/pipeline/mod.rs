//! Request orchestration: lyrics, themes, songwriting, voice, synthesis, mix.
//!
//! Stages run strictly in order on the caller's task. Blocking work (SQLite,
//! mixing) goes through `spawn_blocking`.

use crate::audio::{MixOptions, Mixer};
use crate::config::Config;
use crate::error::{RemixError, Result, Stage};
use crate::input::{Gender, TrackRequest};
use crate::lyrics::{GeniusClient, LyricsBundle, LyricsProvider, LyricsRetriever};
use crate::songwriter::{AnthropicProvider, LlmProvider, SongDraft, Songwriter};
use crate::storage::{self, RemixRecord, StorageHandle};
use crate::synth::{
    HttpSpeechClient, Mode, MusicProvider, ReplicateClient, SpeechProvider, SynthBudgets, SynthJob,
    SynthOutput, Synthesizer,
};
use crate::themes::{self, Mood};
use crate::voice;
use anyhow::Context;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RemixMetadata {
    pub title: String,
    pub artist: String,
    pub mood: Mood,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemixResult {
    pub final_audio_path: PathBuf,
    pub metadata: RemixMetadata,
    /// Reused the file of an earlier identical request.
    pub cached: bool,
}

/// Knobs the pipeline reads per request.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub mode: Mode,
    pub fallback: bool,
    pub use_cache: bool,
    pub gender_override: Option<Gender>,
    pub artist_genders: HashMap<String, Gender>,
    pub output_dir: PathBuf,
    /// No database means no lyrics cache, no result cache, no history.
    pub cache_db: Option<PathBuf>,
    pub budgets: SynthBudgets,
    pub mix: MixOptions,
}

impl PipelineSettings {
    pub fn from_config(cfg: &Config, mode: Mode) -> Self {
        Self {
            mode,
            fallback: cfg.pipeline.fallback,
            use_cache: cfg.pipeline.use_cache,
            gender_override: cfg.pipeline.gender_override,
            artist_genders: cfg.voice.artist_genders.clone(),
            output_dir: cfg.paths.output_dir.clone(),
            cache_db: Some(cfg.cache_db_path()),
            budgets: SynthBudgets {
                quick: Duration::from_secs(cfg.replicate.quick_timeout_secs),
                full: Duration::from_secs(cfg.replicate.full_timeout_secs),
            },
            mix: cfg.mix.clone(),
        }
    }
}

pub struct Pipeline {
    retriever: LyricsRetriever,
    songwriter: Songwriter,
    speech: Arc<dyn SpeechProvider>,
    music: Arc<dyn MusicProvider>,
    storage: Option<StorageHandle>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        lyrics: Arc<dyn LyricsProvider>,
        songwriter: Songwriter,
        speech: Arc<dyn SpeechProvider>,
        music: Arc<dyn MusicProvider>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            retriever: LyricsRetriever::new(lyrics),
            songwriter,
            speech,
            music,
            storage: settings.cache_db.clone().map(StorageHandle::new),
            settings,
        }
    }

    /// Real HTTP providers, configured from `cfg`.
    pub fn from_config(cfg: &Config, mode: Mode) -> anyhow::Result<Self> {
        let genius = GeniusClient::new(
            cfg.genius.access_token.clone(),
            cfg.genius.base_url.clone(),
            Duration::from_secs(cfg.genius.timeout_secs),
            cfg.genius.max_attempts,
        )
        .context("genius client")?;

        let llm_timeout = Duration::from_secs(cfg.llm.timeout_secs);
        let llm = AnthropicProvider::new(
            cfg.llm.api_key.clone(),
            cfg.llm.base_url.clone(),
            cfg.llm.model.clone(),
            llm_timeout,
        )
        .context("anthropic client")?;

        let speech = HttpSpeechClient::new(
            cfg.tts.endpoint.clone(),
            cfg.tts.api_key.clone(),
            Duration::from_secs(cfg.tts.timeout_secs),
        )
        .context("tts client")?;

        let music = ReplicateClient::new(
            cfg.replicate.api_token.clone(),
            cfg.replicate.base_url.clone(),
            cfg.replicate.musicgen_version.clone(),
            cfg.replicate.song_model.clone(),
            Duration::from_secs(cfg.replicate.poll_interval_secs),
        )
        .context("replicate client")?;

        let llm: Arc<dyn LlmProvider> = Arc::new(llm);
        Ok(Self::new(
            Arc::new(genius),
            Songwriter::new(llm, cfg.llm.max_tokens, llm_timeout),
            Arc::new(speech),
            Arc::new(music),
            PipelineSettings::from_config(cfg, mode),
        ))
    }

    pub fn mode(&self) -> Mode {
        self.settings.mode
    }

    pub async fn remix(&self, request: &TrackRequest) -> Result<RemixResult> {
        info!(
            title = %request.title,
            artist = %request.artist,
            mode = %self.settings.mode,
            scope = request.scope.as_str(),
            "remix requested"
        );

        let key = self.cache_key(request, self.settings.mode);
        if self.settings.use_cache
            && let Some(hit) = self.cached_result(&key).await
        {
            return Ok(hit);
        }

        tokio::fs::create_dir_all(&self.settings.output_dir)
            .await
            .map_err(|e| {
                RemixError::Synthesis(format!(
                    "create output dir {}: {e}",
                    self.settings.output_dir.display()
                ))
            })?;

        let token = temp_token(&key);
        let result = self.run(request, &token).await;
        remove_temp_files(&self.settings.output_dir, &token).await;
        result
    }

    /// Lyrics for `request`, from the cache when possible.
    pub async fn lyrics(&self, request: &TrackRequest) -> Result<LyricsBundle> {
        let query_key = lyrics_key(request);

        if self.settings.use_cache
            && let Some(storage) = self.storage.clone()
        {
            let key = query_key.clone();
            match blocking(move || storage.get_lyrics(&key)).await {
                Ok(Some(json)) => match serde_json::from_str::<LyricsBundle>(&json) {
                    Ok(bundle) => {
                        info!(title = %bundle.title, "lyrics cache hit");
                        return Ok(bundle);
                    }
                    Err(e) => warn!("ignoring unreadable cached lyrics: {e}"),
                },
                Ok(None) => {}
                Err(e) => warn!("lyrics cache lookup failed: {e:#}"),
            }
        }

        let bundle = self.retriever.retrieve(request).await?;

        if let Some(storage) = self.storage.clone() {
            match serde_json::to_string(&bundle) {
                Ok(json) => {
                    let now = storage::now_unix();
                    if let Err(e) =
                        blocking(move || storage.cache_lyrics(&query_key, &json, now)).await
                    {
                        warn!("lyrics cache write failed: {e:#}");
                    }
                }
                Err(e) => warn!("serialize lyrics bundle: {e}"),
            }
        }
        Ok(bundle)
    }

    async fn run(&self, request: &TrackRequest, token: &str) -> Result<RemixResult> {
        let bundle = self.lyrics(request).await?;

        let profile = themes::extract(&bundle.raw_lyrics);
        info!(mood = %profile.mood, themes = ?profile.themes, "themes extracted");

        let draft = self
            .songwriter
            .write(&bundle, &profile, request.style_hint.as_deref())
            .await?;

        let gender = voice::resolve_gender(
            request,
            self.settings.gender_override,
            &self.settings.artist_genders,
        );
        let voice = voice::select_voice(draft.mood, gender);
        info!(
            gender = gender.as_str(),
            voice = %voice.voice_id,
            rate = voice.rate,
            pitch = voice.pitch,
            "voice selected"
        );

        let (output, mode, key) = self.synthesize(request, &draft, &voice, token).await?;

        // Everything is staged under the request token and renamed into place,
        // so concurrent identical requests never write the same file.
        let staged = match output {
            SynthOutput::Mixed(path) => path,
            SynthOutput::Segments(segments) => {
                let staged = self.settings.output_dir.join(format!("{token}_final.wav"));
                let mut options = self.settings.mix.clone();
                options.harmonies = mode == Mode::Full;
                let target = staged.clone();
                tokio::task::spawn_blocking(move || Mixer::new(options).mix(&segments, &target))
                    .await
                    .map_err(|e| RemixError::Mix(format!("mix task failed: {e}")))??;
                staged
            }
        };
        let final_audio_path = publish(&staged, &self.settings.output_dir, &key).await?;

        self.record(&key, &final_audio_path, request, &draft, mode).await;

        Ok(RemixResult {
            final_audio_path,
            metadata: RemixMetadata {
                title: draft.title,
                artist: request.artist.clone(),
                mood: draft.mood,
            },
            cached: false,
        })
    }

    /// Run the configured backend, stepping down to cheaper modes on
    /// synthesis failure when fallback is enabled.
    async fn synthesize(
        &self,
        request: &TrackRequest,
        draft: &SongDraft,
        voice: &voice::VoiceProfile,
        token: &str,
    ) -> Result<(SynthOutput, Mode, String)> {
        let mut mode = self.settings.mode;
        loop {
            let key = self.cache_key(request, mode);
            let final_stem = self.settings.output_dir.join(format!("{token}_final"));
            let synthesizer = Synthesizer::new(
                mode,
                self.speech.clone(),
                self.music.clone(),
                self.settings.budgets,
            );
            let job = SynthJob {
                draft,
                voice,
                style: request.style_hint.as_deref(),
                artist: &request.artist,
                workdir: &self.settings.output_dir,
                token,
                final_stem: &final_stem,
            };

            let err = match synthesizer.synthesize(&job).await {
                Ok(output) => return Ok((output, mode, key)),
                Err(e) => e,
            };
            let next = mode.cheaper().filter(|_| self.settings.fallback);
            let Some(next) = next.filter(|_| err.stage() == Stage::Synthesis) else {
                return Err(err);
            };
            warn!(from = %mode, to = %next, "synthesis failed, falling back: {err}");
            remove_temp_files(&self.settings.output_dir, token).await;
            mode = next;
        }
    }

    async fn cached_result(&self, key: &str) -> Option<RemixResult> {
        let storage = self.storage.clone()?;
        let lookup_key = key.to_string();
        let record = match blocking(move || storage.get_remix(&lookup_key)).await {
            Ok(record) => record?,
            Err(e) => {
                warn!("remix cache lookup failed: {e:#}");
                return None;
            }
        };
        if !record.path.exists() {
            debug!(path = %record.path.display(), "cached remix file is gone");
            return None;
        }
        info!(path = %record.path.display(), "remix cache hit");
        Some(RemixResult {
            metadata: RemixMetadata {
                title: record.title,
                artist: record.artist,
                mood: Mood::parse(&record.mood).unwrap_or_default(),
            },
            final_audio_path: record.path,
            cached: true,
        })
    }

    async fn record(
        &self,
        key: &str,
        path: &Path,
        request: &TrackRequest,
        draft: &SongDraft,
        mode: Mode,
    ) {
        let Some(storage) = self.storage.clone() else {
            return;
        };
        let record = RemixRecord {
            cache_key: key.to_string(),
            path: path.to_path_buf(),
            title: draft.title.clone(),
            artist: request.artist.clone(),
            mood: draft.mood.as_str().to_string(),
            mode: mode.as_str().to_string(),
            created_at: storage::now_unix(),
        };
        if let Err(e) = blocking(move || storage.record_remix(&record)).await {
            warn!("recording remix failed: {e:#}");
        }
    }

    fn cache_key(&self, request: &TrackRequest, mode: Mode) -> String {
        let gender = self
            .settings
            .gender_override
            .or(request.gender_hint)
            .map(|g| g.as_str())
            .unwrap_or_default();
        cache_key(request, gender, mode)
    }
}

/// Hex SHA-1 of everything that shapes the output.
pub fn cache_key(request: &TrackRequest, gender: &str, mode: Mode) -> String {
    let raw = format!(
        "{}|{}|{}|{}|{}|{}",
        request.scope.as_str(),
        request.artist.trim(),
        request.title.trim(),
        request.style_hint.as_deref().unwrap_or_default().trim(),
        gender,
        mode.as_str()
    )
    .to_lowercase();
    hex::encode(Sha1::digest(raw.as_bytes()))
}

fn lyrics_key(request: &TrackRequest) -> String {
    let raw = format!(
        "{}|{}|{}",
        request.scope.as_str(),
        request.artist.trim(),
        request.title.trim()
    )
    .to_lowercase();
    hex::encode(Sha1::digest(raw.as_bytes()))
}

/// Move a staged output onto `{key}.{ext}`, keeping the staged extension.
async fn publish(staged: &Path, dir: &Path, key: &str) -> Result<PathBuf> {
    let ext = staged.extension().and_then(|e| e.to_str()).unwrap_or("wav");
    let target = dir.join(format!("{key}.{ext}"));
    tokio::fs::rename(staged, &target).await.map_err(|e| {
        RemixError::Mix(format!("move {} into place: {e}", staged.display()))
    })?;
    Ok(target)
}

/// Cache-key prefix plus a random suffix, so concurrent runs never share files.
fn temp_token(key: &str) -> String {
    let prefix = key.get(..8).unwrap_or(key);
    format!("{prefix}{:08x}", rand::random::<u32>())
}

async fn remove_temp_files(dir: &Path, token: &str) {
    let prefix = format!("{token}_");
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), "list temp files: {e}");
            return;
        }
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.file_name().to_string_lossy().starts_with(&prefix)
            && let Err(e) = tokio::fs::remove_file(entry.path()).await
        {
            warn!(path = %entry.path().display(), "remove temp file: {e}");
        }
    }
}

async fn blocking<T, F>(f: F) -> anyhow::Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await.context("storage task failed")?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::parse_request;
    use crate::lyrics::tests::{FakeLyrics, hit};
    use crate::songwriter::tests::FakeLlm;
    use crate::synth::tests::{FakeMusic, FakeSpeech};
    use std::sync::atomic::Ordering;

    const HELLO: &str = "Hello, it's me\n\
        I was wondering if after all these years you'd like to meet\n\
        To go over everything\nThey say that time's supposed to heal ya\n\
        But I ain't done much healing\nHello from the other side\n\
        I must have called a thousand times\nTo tell you I'm sorry for everything that I've done";

    const REPLY: &str = "TITLE: Other Side of the Line\n\n\
        Verse 1\nI called again from a quiet room\nThe years went by too soon\n\n\
        Chorus\nHello from the other side\nI'm sorry for the tears I cried";

    struct Rig {
        lyrics: Arc<FakeLyrics>,
        llm: Arc<FakeLlm>,
        speech: Arc<FakeSpeech>,
        music: Arc<FakeMusic>,
        out: tempfile::TempDir,
        db: tempfile::TempDir,
    }

    impl Rig {
        fn new(lyrics: FakeLyrics, reply: &str, music: FakeMusic) -> Self {
            Self {
                lyrics: Arc::new(lyrics),
                llm: Arc::new(FakeLlm::new(reply)),
                speech: Arc::new(FakeSpeech::new(0.5)),
                music: Arc::new(music),
                out: tempfile::tempdir().unwrap(),
                db: tempfile::tempdir().unwrap(),
            }
        }

        fn pipeline(&self, mode: Mode) -> Pipeline {
            let settings = PipelineSettings {
                mode,
                fallback: true,
                use_cache: true,
                gender_override: None,
                artist_genders: HashMap::new(),
                output_dir: self.out.path().to_path_buf(),
                cache_db: Some(self.db.path().join("cache.sqlite3")),
                budgets: SynthBudgets {
                    quick: Duration::from_secs(30),
                    full: Duration::from_secs(30),
                },
                mix: MixOptions::default(),
            };
            Pipeline::new(
                self.lyrics.clone(),
                Songwriter::new(self.llm.clone(), 1500, Duration::from_secs(5)),
                self.speech.clone(),
                self.music.clone(),
                settings,
            )
        }

        fn output_files(&self) -> Vec<String> {
            let mut names: Vec<String> = std::fs::read_dir(self.out.path())
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            names
        }
    }

    fn adele() -> FakeLyrics {
        FakeLyrics {
            hits: vec![hit("Hello", "Adele", Some(HELLO))],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_fast_remix_writes_final_wav() {
        let rig = Rig::new(adele(), REPLY, FakeMusic::default());
        let request = parse_request("Hello by Adele (acoustic, melancholic, female)").unwrap();

        let result = rig.pipeline(Mode::Fast).remix(&request).await.unwrap();

        assert!(!result.cached);
        assert_eq!(result.metadata.mood, Mood::Melancholic);
        assert_eq!(result.metadata.title, "Other Side of the Line");
        assert_eq!(result.metadata.artist, "Adele");
        assert_eq!(result.final_audio_path.extension().unwrap(), "wav");
        let size = std::fs::metadata(&result.final_audio_path).unwrap().len();
        assert!(size > 0);

        // only the final file survives; segment files are cleaned up
        let key = cache_key(&request, "female", Mode::Fast);
        assert_eq!(rig.output_files(), vec![format!("{key}.wav")]);
        assert_eq!(rig.speech.calls.load(Ordering::SeqCst), 2);
        assert!(rig.llm.prompts.lock().unwrap()[0].contains("Hello"));
    }

    #[tokio::test]
    async fn test_missing_lyrics_stops_before_generation() {
        let rig = Rig::new(FakeLyrics::default(), REPLY, FakeMusic::default());
        let request = TrackRequest::new("Nonexistent Song", "Nobody");

        let err = rig.pipeline(Mode::Fast).remix(&request).await.unwrap_err();

        assert!(matches!(err, RemixError::NotFound(_)));
        assert_eq!(err.stage(), Stage::Lyrics);
        assert_eq!(rig.llm.calls.load(Ordering::SeqCst), 0);
        assert_eq!(rig.speech.calls.load(Ordering::SeqCst), 0);
        assert!(rig.output_files().is_empty());
    }

    #[tokio::test]
    async fn test_empty_reply_writes_no_audio() {
        let rig = Rig::new(adele(), "", FakeMusic::default());
        let request = TrackRequest::new("Hello", "Adele");

        let err = rig.pipeline(Mode::Fast).remix(&request).await.unwrap_err();

        assert!(matches!(err, RemixError::Generation(_)));
        assert_eq!(rig.speech.calls.load(Ordering::SeqCst), 0);
        assert!(rig.output_files().is_empty());
    }

    #[tokio::test]
    async fn test_repeat_request_hits_cache() {
        let rig = Rig::new(adele(), REPLY, FakeMusic::default());
        let request = TrackRequest::new("Hello", "Adele").with_style("acoustic");

        let first = rig.pipeline(Mode::Fast).remix(&request).await.unwrap();
        let second = rig.pipeline(Mode::Fast).remix(&request).await.unwrap();

        assert!(second.cached);
        assert_eq!(second.final_audio_path, first.final_audio_path);
        assert_eq!(second.metadata, first.metadata);
        assert_eq!(rig.llm.calls.load(Ordering::SeqCst), 1);
        assert_eq!(rig.lyrics.searched.lock().unwrap().len(), 1);

        // a deleted file forces a fresh run, with lyrics served from cache
        std::fs::remove_file(&first.final_audio_path).unwrap();
        let third = rig.pipeline(Mode::Fast).remix(&request).await.unwrap();
        assert!(!third.cached);
        assert_eq!(rig.llm.calls.load(Ordering::SeqCst), 2);
        assert_eq!(rig.lyrics.searched.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_backend_falls_back_to_cheaper_mode() {
        let music = FakeMusic {
            fail: true,
            ..Default::default()
        };
        let rig = Rig::new(adele(), REPLY, music);
        let request = TrackRequest::new("Hello", "Adele");

        let result = rig.pipeline(Mode::Quick).remix(&request).await.unwrap();

        let key = cache_key(&request, "", Mode::Fast);
        assert_eq!(result.final_audio_path, rig.out.path().join(format!("{key}.wav")));
        assert_eq!(rig.output_files(), vec![format!("{key}.wav")]);

        let history = StorageHandle::new(rig.db.path().join("cache.sqlite3"))
            .history(10)
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].mode, "fast");
    }

    #[tokio::test]
    async fn test_no_fallback_surfaces_synthesis_error() {
        let music = FakeMusic {
            fail: true,
            ..Default::default()
        };
        let rig = Rig::new(adele(), REPLY, music);
        let mut pipeline = rig.pipeline(Mode::Suno);
        pipeline.settings.fallback = false;

        let err = pipeline
            .remix(&TrackRequest::new("Hello", "Adele"))
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Stage::Synthesis);
        assert!(rig.output_files().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_identical_requests_publish_whole_files() {
        let rig = Rig::new(adele(), REPLY, FakeMusic::default());
        let request = TrackRequest::new("Hello", "Adele");
        let mut a = rig.pipeline(Mode::Fast);
        let mut b = rig.pipeline(Mode::Fast);
        a.settings.use_cache = false;
        b.settings.use_cache = false;

        let (ra, rb) = tokio::join!(a.remix(&request), b.remix(&request));
        let (ra, rb) = (ra.unwrap(), rb.unwrap());

        assert_eq!(ra.final_audio_path, rb.final_audio_path);
        let key = cache_key(&request, "", Mode::Fast);
        assert_eq!(rig.output_files(), vec![format!("{key}.wav")]);
        let reader = hound::WavReader::open(&ra.final_audio_path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert!(reader.duration() > 0);
    }

    #[tokio::test]
    async fn test_publish_keeps_staged_extension() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join("abc_final.mp3");
        std::fs::write(&staged, b"ID3 song").unwrap();

        let published = publish(&staged, dir.path(), "deadbeef").await.unwrap();
        assert_eq!(published, dir.path().join("deadbeef.mp3"));
        assert!(!staged.exists());

        let err = publish(&staged, dir.path(), "deadbeef").await.unwrap_err();
        assert_eq!(err.stage(), Stage::Mix);
    }

    #[test]
    fn test_cache_key_is_case_insensitive_and_mode_specific() {
        let a = TrackRequest::new("Hello", "Adele").with_style("Acoustic");
        let b = TrackRequest::new("hello ", "ADELE").with_style("acoustic");
        assert_eq!(cache_key(&a, "", Mode::Fast), cache_key(&b, "", Mode::Fast));
        assert_ne!(cache_key(&a, "", Mode::Fast), cache_key(&a, "", Mode::Full));
        assert_ne!(cache_key(&a, "", Mode::Fast), cache_key(&a, "male", Mode::Fast));
        assert_eq!(cache_key(&a, "", Mode::Fast).len(), 40);

        let token = temp_token(&cache_key(&a, "", Mode::Fast));
        assert_eq!(token.len(), 16);
        assert!(token.starts_with(&cache_key(&a, "", Mode::Fast)[..8]));
    }
}
