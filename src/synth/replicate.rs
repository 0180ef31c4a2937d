//! Replicate predictions API client (MusicGen instrumentals, MiniMax songs).
//!
//! API Documentation: https://replicate.com/docs/reference/http

use super::MusicProvider;
use super::tts::status_error;
use crate::error::{RemixError, Result};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

impl Prediction {
    fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "failed" | "canceled")
    }
}

#[derive(Debug, Clone)]
pub struct ReplicateClient {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
    musicgen_version: String,
    song_model: String,
    poll_interval: Duration,
}

impl ReplicateClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.replicate.com";
    pub const DEFAULT_MUSICGEN_VERSION: &'static str =
        "7be0f12c54a8d033a0fbd14418c9af98962da9a86f5ff7811f9b3423a1f0b7d7";
    pub const DEFAULT_SONG_MODEL: &'static str = "minimax/music-1.5";

    pub fn new(
        api_token: impl Into<String>,
        base_url: impl Into<String>,
        musicgen_version: impl Into<String>,
        song_model: impl Into<String>,
        poll_interval: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| anyhow::anyhow!("build replicate http client: {e}"))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token: api_token.into(),
            musicgen_version: musicgen_version.into(),
            song_model: song_model.into(),
            poll_interval,
        })
    }

    async fn send_json(&self, req: reqwest::RequestBuilder) -> Result<Prediction> {
        let response = req
            .header(AUTHORIZATION, format!("Bearer {}", self.api_token))
            .send()
            .await
            .map_err(|e| RemixError::Synthesis(format!("replicate request: {e}")))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RemixError::Synthesis(format!("replicate read: {e}")))?;
        if !status.is_success() {
            return Err(status_error("replicate", status, &text));
        }
        serde_json::from_str(&text)
            .map_err(|e| RemixError::Synthesis(format!("replicate response: {e}")))
    }

    /// Create a prediction, wait for it, and download its output.
    async fn run(&self, url: String, body: Value) -> Result<Vec<u8>> {
        let mut prediction = self
            .send_json(self.client.post(url).header("Prefer", "wait").json(&body))
            .await?;
        info!(id = %prediction.id, status = %prediction.status, "replicate prediction created");

        while !prediction.is_terminal() {
            tokio::time::sleep(self.poll_interval).await;
            let poll_url = format!("{}/v1/predictions/{}", self.base_url, prediction.id);
            prediction = self.send_json(self.client.get(poll_url)).await?;
            debug!(id = %prediction.id, status = %prediction.status, "replicate poll");
        }

        let url = output_url(&prediction)?;
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RemixError::Synthesis(format!("download output: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error("replicate download", status, ""));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RemixError::Synthesis(format!("download output: {e}")))?;
        Ok(bytes.to_vec())
    }
}

/// First output URL of a finished prediction.
fn output_url(prediction: &Prediction) -> Result<String> {
    if prediction.status != "succeeded" {
        let reason = prediction
            .error
            .as_ref()
            .map(|e| e.as_str().map(str::to_string).unwrap_or_else(|| e.to_string()))
            .unwrap_or_else(|| prediction.status.clone());
        return Err(RemixError::Synthesis(format!("replicate prediction failed: {reason}")));
    }
    let url = match &prediction.output {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Array(items)) => items.iter().find_map(|v| v.as_str().map(str::to_string)),
        Some(Value::Object(map)) => map
            .get("audio")
            .or_else(|| map.get("url"))
            .and_then(|v| v.as_str())
            .map(str::to_string),
        _ => None,
    };
    url.ok_or_else(|| RemixError::Synthesis("replicate prediction had no output url".to_string()))
}

#[async_trait]
impl MusicProvider for ReplicateClient {
    fn name(&self) -> &str {
        "replicate"
    }

    async fn instrumental(&self, prompt: &str, duration_secs: u32) -> Result<Vec<u8>> {
        debug!(%prompt, duration_secs, "musicgen request");
        let body = json!({
            "version": self.musicgen_version,
            "input": {
                "prompt": prompt,
                "duration": duration_secs,
                "model_version": "stereo-melody-large",
                "output_format": "wav",
                "normalization_strategy": "peak"
            }
        });
        self.run(format!("{}/v1/predictions", self.base_url), body).await
    }

    async fn song(&self, prompt: &str, lyrics: &str) -> Result<Vec<u8>> {
        debug!(%prompt, chars = lyrics.len(), model = %self.song_model, "song request");
        let body = json!({
            "input": {
                "prompt": prompt,
                "lyrics": lyrics,
                "audio_format": "mp3"
            }
        });
        self.run(
            format!("{}/v1/models/{}/predictions", self.base_url, self.song_model),
            body,
        )
        .await
    }
}
