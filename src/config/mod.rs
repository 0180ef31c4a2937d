use crate::audio::MixOptions;
use crate::input::Gender;
use crate::lyrics::GeniusClient;
use crate::songwriter::AnthropicProvider;
use crate::synth::{Mode, ReplicateClient};
use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub mod defaults;

const ENV_GENIUS_TOKEN: &str = "GENIUS_ACCESS_TOKEN";
const ENV_ANTHROPIC_KEY: &str = "ANTHROPIC_API_KEY";
const ENV_REPLICATE_TOKEN: &str = "REPLICATE_API_TOKEN";
const ENV_TTS_ENDPOINT: &str = "REMIXER_TTS_ENDPOINT";
const ENV_TTS_KEY: &str = "REMIXER_TTS_API_KEY";
const ENV_MODE: &str = "REMIXER_MODE";
const ENV_OUTPUT_DIR: &str = "REMIXER_OUTPUT_DIR";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub pipeline: PipelineConfig,
    pub genius: GeniusConfig,
    pub llm: LlmConfig,
    pub tts: TtsConfig,
    pub replicate: ReplicateConfig,
    pub voice: VoiceConfig,
    pub mix: MixOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// SQLite cache location.
    pub data_dir: PathBuf,
    /// Final remixes and in-flight segment files.
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub mode: Mode,
    /// Forces the vocal gender regardless of hints.
    pub gender_override: Option<Gender>,
    /// Retry a failed synthesis in a cheaper mode.
    pub fallback: bool,
    pub use_cache: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeniusConfig {
    pub access_token: String,
    pub base_url: String,
    /// Page fetch attempts before giving up.
    pub max_attempts: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicateConfig {
    pub api_token: String,
    pub base_url: String,
    pub musicgen_version: String,
    pub song_model: String,
    pub quick_timeout_secs: u64,
    pub full_timeout_secs: u64,
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct VoiceConfig {
    /// Artist name -> vocal gender, checked before first-name heuristics.
    pub artist_genders: HashMap<String, Gender>,
}

impl Default for Config {
    fn default() -> Self {
        defaults::defaults()
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let data_dir = defaults::data_dir();
        Self {
            output_dir: data_dir.join("output"),
            data_dir,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Fast,
            gender_override: None,
            fallback: true,
            use_cache: true,
        }
    }
}

impl Default for GeniusConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            base_url: GeniusClient::DEFAULT_BASE_URL.to_string(),
            max_attempts: defaults::GENIUS_MAX_ATTEMPTS,
            timeout_secs: defaults::GENIUS_TIMEOUT_SECS,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: AnthropicProvider::DEFAULT_BASE_URL.to_string(),
            model: defaults::LLM_MODEL.to_string(),
            max_tokens: defaults::LLM_MAX_TOKENS,
            timeout_secs: defaults::LLM_TIMEOUT_SECS,
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::TTS_ENDPOINT.to_string(),
            api_key: None,
            timeout_secs: defaults::TTS_TIMEOUT_SECS,
        }
    }
}

impl Default for ReplicateConfig {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            base_url: ReplicateClient::DEFAULT_BASE_URL.to_string(),
            musicgen_version: ReplicateClient::DEFAULT_MUSICGEN_VERSION.to_string(),
            song_model: ReplicateClient::DEFAULT_SONG_MODEL.to_string(),
            quick_timeout_secs: defaults::REPLICATE_QUICK_TIMEOUT_SECS,
            full_timeout_secs: defaults::REPLICATE_FULL_TIMEOUT_SECS,
            poll_interval_secs: defaults::REPLICATE_POLL_INTERVAL_SECS,
        }
    }
}

impl Config {
    pub fn cache_db_path(&self) -> PathBuf {
        self.paths.data_dir.join("cache.sqlite3")
    }

    /// Overlay process environment variables.
    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup`; blank values are ignored.
    pub fn apply_env_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<()> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_GENIUS_TOKEN) {
            self.genius.access_token = v;
        }
        if let Some(v) = get(ENV_ANTHROPIC_KEY) {
            self.llm.api_key = v;
        }
        if let Some(v) = get(ENV_REPLICATE_TOKEN) {
            self.replicate.api_token = v;
        }
        if let Some(v) = get(ENV_TTS_ENDPOINT) {
            self.tts.endpoint = v;
        }
        if let Some(v) = get(ENV_TTS_KEY) {
            self.tts.api_key = Some(v);
        }
        if let Some(v) = get(ENV_MODE) {
            self.pipeline.mode = v.parse().with_context(|| format!("{ENV_MODE}={v}"))?;
        }
        if let Some(v) = get(ENV_OUTPUT_DIR) {
            self.paths.output_dir = PathBuf::from(v);
        }
        Ok(())
    }
}

pub fn save(cfg: &Config, override_path: Option<&Path>) -> anyhow::Result<()> {
    let path = match override_path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };
    write_config(&path, cfg)
}

fn write_config(path: &Path, cfg: &Config) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;
    }
    let raw = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(path, raw).with_context(|| format!("write {}", path.display()))?;
    // The file holds API credentials.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }
    Ok(())
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    let proj = defaults::project_dirs().context("ProjectDirs unavailable")?;
    Ok(proj.config_dir().join("config.toml"))
}

/// Read the config file, writing defaults on first run. No env overlay, so
/// the result is safe to `save` back.
pub fn load_file(override_path: Option<&Path>) -> anyhow::Result<Config> {
    let path = match override_path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };

    if !path.exists() {
        let cfg = defaults::defaults();
        write_config(&path, &cfg).context("write default config")?;
        return Ok(cfg);
    }

    let raw = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let cfg = toml::from_str::<Config>(&raw).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

/// Config file plus environment overrides.
pub fn load(override_path: Option<&Path>) -> anyhow::Result<Config> {
    let mut cfg = load_file(override_path)?;
    cfg.apply_env().context("apply environment overrides")?;
    Ok(cfg)
}
