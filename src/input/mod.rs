//! User input parsing.
//!
//! Turns free text such as `Hello by Adele (acoustic, female)` into a
//! [`TrackRequest`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Neutral,
}

impl Gender {
    /// Normalize a single free-text token ("woman", "Male", "androgynous").
    pub fn from_word(word: &str) -> Option<Self> {
        let token: String = word
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_ascii_lowercase();
        match token.as_str() {
            "female" | "woman" | "girl" => Some(Gender::Female),
            "male" | "man" | "boy" => Some(Gender::Male),
            "neutral" | "androgynous" => Some(Gender::Neutral),
            _ => None,
        }
    }

    /// Scan a style hint for gender keywords. Female wins over male when both
    /// appear, matching how hints like "female, man-made beats" read.
    pub fn from_hint(hint: &str) -> Option<Self> {
        let lowered = hint.to_lowercase();
        if FEMALE_RE.is_match(&lowered) {
            Some(Gender::Female)
        } else if MALE_RE.is_match(&lowered) {
            Some(Gender::Male)
        } else if NEUTRAL_RE.is_match(&lowered) {
            Some(Gender::Neutral)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Neutral => "neutral",
        }
    }
}

/// Whether lyrics come from one song or a whole album.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    #[default]
    Song,
    Album,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Song => "song",
            Scope::Album => "album",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRequest {
    /// Song title, or album title when `scope` is [`Scope::Album`].
    pub title: String,
    pub artist: String,
    pub style_hint: Option<String>,
    pub gender_hint: Option<Gender>,
    pub scope: Scope,
}

impl TrackRequest {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            style_hint: None,
            gender_hint: None,
            scope: Scope::Song,
        }
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style_hint = Some(style.into());
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }
}

static FEMALE_RE: Lazy<Regex> = Lazy::new(|| word_regex("female|woman|girl"));
static MALE_RE: Lazy<Regex> = Lazy::new(|| word_regex("male|man|boy"));
static NEUTRAL_RE: Lazy<Regex> = Lazy::new(|| word_regex("neutral|androgynous"));

fn word_regex(alternatives: &str) -> Regex {
    Regex::new(&format!(r"\b(?:{alternatives})\b")).expect("valid gender regex")
}

/// Parse `Song by Artist`, `Song - Artist` or `Artist: Song`, each with an
/// optional trailing `(style hints)`.
pub fn parse_request(raw: &str) -> anyhow::Result<TrackRequest> {
    let mut rest = raw.trim();
    let mut style_hint = None;
    let mut gender_hint = None;

    if rest.ends_with(')')
        && let Some(open) = rest.rfind('(')
    {
        let hint = rest[open + 1..rest.len() - 1].trim();
        rest = rest[..open].trim();
        if !hint.is_empty() {
            gender_hint = Gender::from_hint(hint);
            let cleaned = strip_gender_words(hint);
            if !cleaned.is_empty() {
                style_hint = Some(cleaned);
            }
        }
    }

    let lowered = rest.to_ascii_lowercase();
    let (title, artist) = if let Some(idx) = lowered.find(" by ") {
        (&rest[..idx], &rest[idx + 4..])
    } else if let Some((title, artist)) = rest.split_once(" - ") {
        (title, artist)
    } else if let Some((artist, title)) = rest.split_once(": ") {
        (title, artist)
    } else {
        anyhow::bail!(
            "use the format 'Song by Artist' or 'Song - Artist' (e.g. 'Billie Jean by Michael Jackson')"
        );
    };

    let title = title.trim();
    let artist = artist.trim();
    if title.is_empty() || artist.is_empty() {
        anyhow::bail!("both a title and an artist are required");
    }

    Ok(TrackRequest {
        title: title.to_string(),
        artist: artist.to_string(),
        style_hint,
        gender_hint,
        scope: Scope::Song,
    })
}

/// Remove gender keywords from a comma-separated hint, keeping the rest.
fn strip_gender_words(hint: &str) -> String {
    hint.split(',')
        .map(|part| {
            part.split_whitespace()
                .filter(|w| Gender::from_word(w).is_none())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_by_with_hints() {
        let req = parse_request("Hello by Adele (acoustic, melancholic, female)").unwrap();
        assert_eq!(req.title, "Hello");
        assert_eq!(req.artist, "Adele");
        assert_eq!(req.style_hint.as_deref(), Some("acoustic, melancholic"));
        assert_eq!(req.gender_hint, Some(Gender::Female));
    }

    #[test]
    fn test_parse_dash_and_colon() {
        let req = parse_request("Billie Jean - Michael Jackson").unwrap();
        assert_eq!(req.title, "Billie Jean");
        assert_eq!(req.artist, "Michael Jackson");
        assert!(req.style_hint.is_none());

        let req = parse_request("Radiohead: OK Computer").unwrap();
        assert_eq!(req.title, "OK Computer");
        assert_eq!(req.artist, "Radiohead");
    }

    #[test]
    fn test_parse_by_is_case_insensitive() {
        let req = parse_request("Rolling in the Deep BY Adele").unwrap();
        assert_eq!(req.title, "Rolling in the Deep");
        assert_eq!(req.artist, "Adele");
    }

    #[test]
    fn test_gender_only_hint_leaves_no_style() {
        let req = parse_request("Hello by Adele (male)").unwrap();
        assert_eq!(req.gender_hint, Some(Gender::Male));
        assert!(req.style_hint.is_none());
    }

    #[test]
    fn test_female_not_matched_as_male() {
        assert_eq!(Gender::from_hint("soft female vocals"), Some(Gender::Female));
        assert_eq!(Gender::from_hint("boy band energy"), Some(Gender::Male));
        assert_eq!(Gender::from_hint("lofi, chill"), None);
    }

    #[test]
    fn test_parse_rejects_missing_separator() {
        assert!(parse_request("just some words").is_err());
        assert!(parse_request(" by Adele").is_err());
    }
}
