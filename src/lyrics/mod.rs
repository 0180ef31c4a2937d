//! Lyrics retrieval.
//!
//! This module provides:
//! - the `LyricsProvider` capability and its Genius implementation
//! - HTML extraction for song pages whose API result has no lyric body
//! - `LyricsRetriever`, which tries artist-name variants and picks the best hit

pub mod genius;
pub mod scrape;

pub use genius::GeniusClient;

use crate::error::{RemixError, Result};
use crate::input::{Scope, TrackRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const SONG_SEARCH_LIMIT: usize = 10;
const ALBUM_SEARCH_LIMIT: usize = 20;
const ALBUM_MAX_TRACKS: usize = 12;
const ALBUM_PAGE_PAUSE: Duration = Duration::from_millis(300);

/// A search hit from the lyrics provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRef {
    pub id: String,
    pub title: String,
    pub artist: String,
    /// Page to scrape when `lyrics` is absent.
    pub url: String,
    /// Lyric body when the API returned one.
    pub lyrics: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LyricsSource {
    Api,
    Scrape,
}

impl LyricsSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LyricsSource::Api => "api",
            LyricsSource::Scrape => "scrape",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LyricsBundle {
    pub title: String,
    pub artist: String,
    pub raw_lyrics: String,
    pub source: LyricsSource,
    /// Titles the lyrics were collected from (one per song).
    pub track_titles: Vec<String>,
}

#[async_trait]
pub trait LyricsProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, title: &str, artist: &str, limit: usize) -> Result<Vec<TrackRef>>;

    /// Lyric text for a hit; `Ok(None)` when the page has none.
    async fn fetch_lyrics(&self, track: &TrackRef) -> Result<Option<String>>;
}

#[derive(Clone)]
pub struct LyricsRetriever {
    provider: Arc<dyn LyricsProvider>,
}

impl LyricsRetriever {
    pub fn new(provider: Arc<dyn LyricsProvider>) -> Self {
        Self { provider }
    }

    pub async fn retrieve(&self, request: &TrackRequest) -> Result<LyricsBundle> {
        for artist in artist_variants(&request.artist) {
            debug!(provider = self.provider.name(), %artist, "lyrics lookup");
            let found = match request.scope {
                Scope::Song => self.retrieve_song(&request.title, &artist).await?,
                Scope::Album => self.retrieve_album(&request.title, &artist).await?,
            };
            if let Some(bundle) = found {
                info!(
                    title = %bundle.title,
                    artist = %bundle.artist,
                    source = bundle.source.as_str(),
                    tracks = bundle.track_titles.len(),
                    "lyrics retrieved"
                );
                return Ok(bundle);
            }
        }
        Err(RemixError::NotFound(format!(
            "'{}' by '{}'",
            request.title, request.artist
        )))
    }

    async fn retrieve_song(&self, title: &str, artist: &str) -> Result<Option<LyricsBundle>> {
        let hits = self.provider.search(title, artist, SONG_SEARCH_LIMIT).await?;
        let Some(hit) = best_match(&hits, title, artist) else {
            return Ok(None);
        };
        let Some((lyrics, source)) = self.lyrics_for(hit).await? else {
            return Ok(None);
        };
        Ok(Some(LyricsBundle {
            title: hit.title.clone(),
            artist: hit.artist.clone(),
            raw_lyrics: lyrics,
            source,
            track_titles: vec![hit.title.clone()],
        }))
    }

    async fn retrieve_album(&self, album: &str, artist: &str) -> Result<Option<LyricsBundle>> {
        let hits = self.provider.search(album, artist, ALBUM_SEARCH_LIMIT).await?;
        let by_artist: Vec<&TrackRef> = hits
            .iter()
            .filter(|h| contains_normalized(&h.artist, artist))
            .take(ALBUM_MAX_TRACKS)
            .collect();

        let mut parts = Vec::new();
        let mut titles = Vec::new();
        let mut scraped = false;
        for (i, hit) in by_artist.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(ALBUM_PAGE_PAUSE).await;
            }
            if let Some((lyrics, source)) = self.lyrics_for(hit).await? {
                scraped |= source == LyricsSource::Scrape;
                parts.push(lyrics);
                titles.push(hit.title.clone());
            }
        }

        let Some(first) = by_artist.first() else {
            return Ok(None);
        };
        if parts.is_empty() {
            return Ok(None);
        }
        Ok(Some(LyricsBundle {
            title: album.to_string(),
            artist: first.artist.clone(),
            raw_lyrics: parts.join("\n\n"),
            source: if scraped {
                LyricsSource::Scrape
            } else {
                LyricsSource::Api
            },
            track_titles: titles,
        }))
    }

    /// Lyrics for one hit, preferring the API body. Partial pages are kept.
    async fn lyrics_for(&self, hit: &TrackRef) -> Result<Option<(String, LyricsSource)>> {
        let (raw, source) = match hit.lyrics.as_deref().filter(|b| !b.trim().is_empty()) {
            Some(body) => (Some(body.to_string()), LyricsSource::Api),
            None => {
                info!(url = %hit.url, "no lyrics body from api, scraping page");
                (self.provider.fetch_lyrics(hit).await?, LyricsSource::Scrape)
            }
        };
        Ok(raw
            .map(|r| scrape::clean_lyrics(&r))
            .filter(|l| !l.is_empty())
            .map(|l| (l, source)))
    }
}

/// Artist spellings to try, in order: as given, without a leading "The",
/// without a featuring/"&" tail.
pub fn artist_variants(artist: &str) -> Vec<String> {
    let base = artist.trim().to_string();
    let mut out = vec![base.clone()];

    let lowered = base.to_ascii_lowercase();
    if lowered.starts_with("the ") {
        out.push(base[4..].trim().to_string());
    }
    for sep in [" feat. ", " feat ", " featuring ", " ft. ", " & ", " and ", " x "] {
        if let Some(idx) = lowered.find(sep) {
            let head = base[..idx].trim().to_string();
            if !head.is_empty() {
                out.push(head);
            }
            break;
        }
    }

    let mut seen = std::collections::HashSet::new();
    out.retain(|a| !a.is_empty() && seen.insert(a.to_ascii_lowercase()));
    out
}

fn normalize(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn contains_normalized(haystack: &str, needle: &str) -> bool {
    let n = normalize(needle);
    !n.is_empty() && normalize(haystack).contains(&n)
}

fn titles_match(a: &str, b: &str) -> bool {
    contains_normalized(a, b) || contains_normalized(b, a)
}

/// Artist and title match, else first hit by the artist, else first hit with
/// a matching title. No fallback to an unrelated first result.
pub fn best_match<'a>(hits: &'a [TrackRef], title: &str, artist: &str) -> Option<&'a TrackRef> {
    hits.iter()
        .find(|h| contains_normalized(&h.artist, artist) && titles_match(&h.title, title))
        .or_else(|| hits.iter().find(|h| contains_normalized(&h.artist, artist)))
        .or_else(|| hits.iter().find(|h| titles_match(&h.title, title)))
}
