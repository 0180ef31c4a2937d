//! HTTP text-to-speech client.
//!
//! Speaks to any endpoint that accepts
//! `{"input", "voice", "rate", "pitch", "response_format"}` and answers with
//! encoded audio bytes (edge-tts style voice names, OpenAI-style body).

use super::SpeechProvider;
use crate::error::{RemixError, Result};
use crate::voice::VoiceProfile;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    input: &'a str,
    voice: &'a str,
    rate: String,
    pitch: String,
    response_format: &'a str,
}

#[derive(Debug, Clone)]
pub struct HttpSpeechClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpSpeechClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("build tts http client: {e}"))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }
}

fn synthesis_error(context: &str, e: reqwest::Error) -> RemixError {
    if e.is_timeout() {
        RemixError::Synthesis(format!("{context}: timed out"))
    } else {
        RemixError::Synthesis(format!("{context}: {e}"))
    }
}

/// Map a non-success provider status to a user-facing synthesis error.
pub(crate) fn status_error(provider: &str, status: StatusCode, body: &str) -> RemixError {
    let detail = match status {
        StatusCode::PAYMENT_REQUIRED => "quota exceeded".to_string(),
        StatusCode::TOO_MANY_REQUESTS => "rate limited".to_string(),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => "credentials rejected".to_string(),
        _ => {
            let snippet: String = body.chars().take(200).collect();
            format!("error {status}: {snippet}")
        }
    };
    RemixError::Synthesis(format!("{provider} {detail}"))
}

#[async_trait]
impl SpeechProvider for HttpSpeechClient {
    fn name(&self) -> &str {
        "http-tts"
    }

    async fn speak(&self, text: &str, voice: &VoiceProfile) -> Result<Vec<u8>> {
        let body = SpeechRequest {
            input: text,
            voice: &voice.voice_id,
            rate: voice.rate_arg(),
            pitch: voice.pitch_arg(),
            response_format: "wav",
        };
        debug!(voice = %voice.voice_id, chars = text.len(), "tts request");

        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let response = req.send().await.map_err(|e| synthesis_error("tts request", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error("tts", status, &text));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| synthesis_error("tts read", e))?;
        if bytes.is_empty() {
            return Err(RemixError::Synthesis("tts returned no audio".to_string()));
        }
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let voice = VoiceProfile {
            voice_id: "en-US-GuyNeural".to_string(),
            rate: 5,
            pitch: -2,
        };
        let body = SpeechRequest {
            input: "la la",
            voice: &voice.voice_id,
            rate: voice.rate_arg(),
            pitch: voice.pitch_arg(),
            response_format: "wav",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "input": "la la",
                "voice": "en-US-GuyNeural",
                "rate": "+5%",
                "pitch": "-2Hz",
                "response_format": "wav"
            })
        );
    }

    #[test]
    fn test_status_errors() {
        let e = status_error("tts", StatusCode::PAYMENT_REQUIRED, "");
        assert_eq!(e.to_string(), "synthesis failed: tts quota exceeded");
        let e = status_error("replicate", StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert_eq!(
            e.to_string(),
            "synthesis failed: replicate error 500 Internal Server Error: boom"
        );
    }
}
