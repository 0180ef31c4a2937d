use super::*;

pub const GENIUS_MAX_ATTEMPTS: u32 = 3;
pub const GENIUS_TIMEOUT_SECS: u64 = 15;

pub const LLM_MODEL: &str = "claude-sonnet-4-20250514";
pub const LLM_MAX_TOKENS: u32 = 1500;
pub const LLM_TIMEOUT_SECS: u64 = 60;

/// Local openai-edge-tts style server.
pub const TTS_ENDPOINT: &str = "http://localhost:5050/v1/audio/speech";
pub const TTS_TIMEOUT_SECS: u64 = 60;

pub const REPLICATE_QUICK_TIMEOUT_SECS: u64 = 180;
pub const REPLICATE_FULL_TIMEOUT_SECS: u64 = 600;
pub const REPLICATE_POLL_INTERVAL_SECS: u64 = 2;

pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "remixer", "remixer")
}

pub fn data_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.data_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join("remixer"))
}

/// Config written on first run.
pub fn defaults() -> Config {
    let data_dir = data_dir();
    Config {
        paths: PathsConfig {
            output_dir: data_dir.join("output"),
            data_dir,
        },
        pipeline: PipelineConfig::default(),
        genius: GeniusConfig::default(),
        llm: LlmConfig::default(),
        tts: TtsConfig::default(),
        replicate: ReplicateConfig::default(),
        voice: VoiceConfig::default(),
        mix: MixOptions::default(),
    }
}
