//! Genius API client
//!
//! The search API returns song metadata and a page URL but never the lyric
//! body, so lyrics always come from scraping the song page.
//! API Documentation: https://docs.genius.com

use super::{LyricsProvider, TrackRef, scrape};
use crate::error::{RemixError, Result, fetch_error};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT_LANGUAGE, AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    response: SearchResponse,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    result: SongResult,
}

#[derive(Debug, Deserialize)]
struct SongResult {
    id: u64,
    title: String,
    url: String,
    primary_artist: ArtistResult,
}

#[derive(Debug, Deserialize)]
struct ArtistResult {
    name: String,
}

/// Genius API client
#[derive(Debug, Clone)]
pub struct GeniusClient {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
    max_attempts: u32,
}

impl GeniusClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.genius.com";
    const BROWSER_AGENT: &'static str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const RETRY_PAUSE: Duration = Duration::from_millis(500);

    pub fn new(
        access_token: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
        max_attempts: u32,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("build genius http client: {e}"))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            max_attempts: max_attempts.max(1),
        })
    }

    /// Fetch a song page, retrying a fixed number of times on non-200.
    /// Only a 404 means "no page"; anything else that outlasts the retries
    /// is a fetch error.
    async fn fetch_page(&self, url: &str) -> Result<Option<String>> {
        let mut last_status = None;
        for attempt in 1..=self.max_attempts {
            let response = self
                .client
                .get(url)
                .header(USER_AGENT, Self::BROWSER_AGENT)
                .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
                .send()
                .await
                .map_err(|e| fetch_error("fetch lyrics page", e))?;

            let status = response.status();
            if status.is_success() {
                let body = response
                    .text()
                    .await
                    .map_err(|e| fetch_error("read lyrics page", e))?;
                return Ok(Some(body));
            }
            if status == StatusCode::NOT_FOUND {
                return Ok(None);
            }

            debug!(%url, %status, attempt, "lyrics page fetch failed");
            last_status = Some(status);
            if attempt < self.max_attempts {
                tokio::time::sleep(Self::RETRY_PAUSE).await;
            }
        }

        match last_status {
            Some(StatusCode::TOO_MANY_REQUESTS) => Err(RemixError::rate_limited(format!(
                "rate limited fetching {url}"
            ))),
            Some(status) => Err(RemixError::Fetch {
                message: format!(
                    "lyrics page {url}: {status} after {} attempts",
                    self.max_attempts
                ),
                retryable: status.is_server_error(),
            }),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl LyricsProvider for GeniusClient {
    fn name(&self) -> &str {
        "genius"
    }

    async fn search(&self, title: &str, artist: &str, limit: usize) -> Result<Vec<TrackRef>> {
        let query = format!("{title} {artist}");
        let url = format!(
            "{}/search?q={}&per_page={}",
            self.base_url,
            urlencoding::encode(&query),
            limit
        );
        debug!(%query, "genius search");

        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.access_token))
            .send()
            .await
            .map_err(|e| fetch_error("genius search", e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(RemixError::rate_limited("genius search rate limited"));
        }
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(RemixError::fetch(format!("genius search error: {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| fetch_error("read genius search", e))?;
        parse_search(&body)
    }

    async fn fetch_lyrics(&self, track: &TrackRef) -> Result<Option<String>> {
        if let Some(body) = &track.lyrics {
            return Ok(Some(body.clone()));
        }
        let Some(html) = self.fetch_page(&track.url).await? else {
            return Ok(None);
        };
        Ok(scrape::extract_lyrics(&html))
    }
}

fn parse_search(body: &str) -> Result<Vec<TrackRef>> {
    let envelope: SearchEnvelope = serde_json::from_str(body)
        .map_err(|e| RemixError::fetch(format!("parse genius search json: {e}")))?;
    Ok(envelope
        .response
        .hits
        .into_iter()
        .filter(|h| h.kind.as_deref().is_none_or(|k| k == "song"))
        .map(|h| TrackRef {
            id: h.result.id.to_string(),
            title: h.result.title,
            artist: h.result.primary_artist.name,
            url: h.result.url,
            lyrics: None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// One-status HTTP server on a loopback port; counts requests.
    async fn stub_server(status: u16, body: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = requests.clone();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match sock.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }
                let response = format!(
                    "HTTP/1.1 {status} Stub\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = sock.write_all(response.as_bytes()).await;
                let _ = sock.shutdown().await;
            }
        });
        (format!("http://{addr}"), requests)
    }

    fn client(base: &str) -> GeniusClient {
        GeniusClient::new("token", base, Duration::from_secs(5), 3).unwrap()
    }

    fn page(base: &str) -> TrackRef {
        TrackRef {
            id: "78".to_string(),
            title: "Hello".to_string(),
            artist: "Adele".to_string(),
            url: format!("{base}/Adele-hello-lyrics"),
            lyrics: None,
        }
    }

    #[tokio::test]
    async fn test_page_rate_limit_exhausts_attempts() {
        let (base, requests) = stub_server(429, "").await;
        let err = client(&base).fetch_lyrics(&page(&base)).await.unwrap_err();
        assert!(matches!(err, RemixError::Fetch { retryable: true, .. }));
        assert_eq!(requests.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_page_server_error_is_fetch_not_missing() {
        let (base, requests) = stub_server(503, "down").await;
        let err = client(&base).fetch_lyrics(&page(&base)).await.unwrap_err();
        assert!(matches!(err, RemixError::Fetch { retryable: true, .. }));
        assert_eq!(err.stage(), crate::error::Stage::Lyrics);
        assert_eq!(requests.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_missing_page_is_none_without_retry() {
        let (base, requests) = stub_server(404, "").await;
        let found = client(&base).fetch_lyrics(&page(&base)).await.unwrap();
        assert!(found.is_none());
        assert_eq!(requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_search_rate_limit_is_retryable() {
        let (base, requests) = stub_server(429, "").await;
        let err = client(&base).search("Hello", "Adele", 10).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(requests.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parse_search_hits() {
        let body = r#"{
          "meta": {"status": 200},
          "response": {"hits": [
            {"type": "song", "result": {"id": 78, "title": "Hello", "url": "https://genius.com/Adele-hello-lyrics",
              "primary_artist": {"id": 2300, "name": "Adele"}}},
            {"type": "album", "result": {"id": 9, "title": "25", "url": "https://genius.com/albums/Adele/25",
              "primary_artist": {"id": 2300, "name": "Adele"}}}
          ]}
        }"#;
        let tracks = parse_search(body).unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].id, "78");
        assert_eq!(tracks[0].title, "Hello");
        assert_eq!(tracks[0].artist, "Adele");
        assert!(tracks[0].lyrics.is_none());
    }

    #[test]
    fn test_parse_search_empty_and_malformed() {
        assert!(parse_search(r#"{"response": {"hits": []}}"#).unwrap().is_empty());
        let err = parse_search("<html>").unwrap_err();
        assert!(matches!(err, RemixError::Fetch { retryable: false, .. }));
    }
}
