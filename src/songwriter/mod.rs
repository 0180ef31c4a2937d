//! Original-lyrics generation from a theme profile.

pub mod llm;
pub mod parser;

pub use llm::{AnthropicProvider, LlmError, LlmProvider};

use crate::error::{RemixError, Result};
use crate::lyrics::LyricsBundle;
use crate::themes::{Mood, ThemeProfile};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const FALLBACK_TITLE: &str = "Untitled Remix";
const PROMPT_THEMES: usize = 20;
const PROMPT_VOCABULARY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionLabel {
    Verse,
    Chorus,
    Bridge,
}

impl SectionLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionLabel::Verse => "verse",
            SectionLabel::Chorus => "chorus",
            SectionLabel::Bridge => "bridge",
        }
    }
}

impl fmt::Display for SectionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub label: SectionLabel,
    pub text: String,
}

/// Generated song. Always holds at least one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongDraft {
    pub title: String,
    pub mood: Mood,
    pub sections: Vec<Section>,
}

impl SongDraft {
    /// Lyric text with `[Verse]`-style labels, for providers that sing
    /// structured lyrics.
    pub fn labeled_text(&self) -> String {
        self.sections
            .iter()
            .map(|s| {
                let label = match s.label {
                    SectionLabel::Verse => "[Verse]",
                    SectionLabel::Chorus => "[Chorus]",
                    SectionLabel::Bridge => "[Bridge]",
                };
                format!("{label}\n{}", s.text)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

pub struct Songwriter {
    llm: Arc<dyn LlmProvider>,
    max_tokens: u32,
    timeout: Duration,
}

impl Songwriter {
    pub fn new(llm: Arc<dyn LlmProvider>, max_tokens: u32, timeout: Duration) -> Self {
        Self {
            llm,
            max_tokens,
            timeout,
        }
    }

    pub async fn write(
        &self,
        bundle: &LyricsBundle,
        profile: &ThemeProfile,
        style_hint: Option<&str>,
    ) -> Result<SongDraft> {
        let prompt = build_prompt(bundle, profile, style_hint);
        info!(provider = self.llm.name(), themes = profile.themes.len(), "writing lyrics");

        let reply = tokio::time::timeout(self.timeout, self.llm.complete(&prompt, self.max_tokens))
            .await
            .map_err(|_| {
                RemixError::Generation(format!("timed out after {}s", self.timeout.as_secs()))
            })??;

        if reply.trim().is_empty() {
            return Err(RemixError::Generation("empty reply".to_string()));
        }

        let parsed = parser::parse_song(&reply);
        if parsed.sections.is_empty() {
            return Err(RemixError::Generation("reply had no lyric text".to_string()));
        }
        if parsed.title.is_none() {
            warn!("reply had no TITLE header, using fallback title");
        }

        let mood = parsed
            .mood
            .or_else(|| style_hint.and_then(Mood::from_hint))
            .unwrap_or(profile.mood);

        let draft = SongDraft {
            title: parsed.title.unwrap_or_else(|| FALLBACK_TITLE.to_string()),
            mood,
            sections: parsed.sections,
        };
        info!(
            title = %draft.title,
            mood = %draft.mood,
            sections = draft.sections.len(),
            "lyrics written"
        );
        Ok(draft)
    }
}

pub fn build_prompt(
    bundle: &LyricsBundle,
    profile: &ThemeProfile,
    style_hint: Option<&str>,
) -> String {
    let themes = profile
        .themes
        .iter()
        .take(PROMPT_THEMES)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    let vocabulary = profile
        .vocabulary
        .iter()
        .take(PROMPT_VOCABULARY)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    let style = style_hint
        .filter(|s| !s.trim().is_empty())
        .map(|s| format!("\nStyle hint: {s}"))
        .unwrap_or_default();

    format!(
        r#"You are a creative songwriter. Create an ORIGINAL song inspired by the vocabulary and themes from "{title}" by {artist}.

Key themes: {themes}
Sample vocabulary: {vocabulary}
Original track titles: {tracks}
{style}

IMPORTANT:
- Create completely ORIGINAL lyrics - do not copy existing lyrics
- Use themes and vocabulary as INSPIRATION only
- Include clear verse/chorus structure
- Make it emotional and singable

Format your response EXACTLY as:
TITLE: [Your song title]
MOOD: [One word: energetic/melancholic/dreamy/intense/hopeful/nostalgic]

[Your original lyrics with verse/chorus labels]
"#,
        title = bundle.title,
        artist = bundle.artist,
        tracks = bundle.track_titles.join(", "),
    )
}
