//! Theme and vocabulary extraction over raw lyrics.
//!
//! Pure and deterministic: word frequency with alphabetical tie-breaks, plus
//! keyword lexicons for a coarse mood label.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

const MAX_THEMES: usize = 20;
const MAX_VOCABULARY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Dreamy,
    Energetic,
    Melancholic,
    Aggressive,
    Hopeful,
    Nostalgic,
    #[default]
    Neutral,
}

impl Mood {
    /// Tie-break order when two lexicons score the same.
    const PRIORITY: [Mood; 6] = [
        Mood::Melancholic,
        Mood::Energetic,
        Mood::Dreamy,
        Mood::Aggressive,
        Mood::Nostalgic,
        Mood::Hopeful,
    ];

    /// Lenient parse of a free-text mood word ("Intense", "sad", "upbeat").
    pub fn parse(label: &str) -> Option<Self> {
        let word: String = label
            .trim()
            .split(|c: char| !c.is_ascii_alphabetic())
            .find(|w| !w.is_empty())?
            .to_ascii_lowercase();
        let mood = match word.as_str() {
            "dreamy" | "ethereal" | "hazy" | "ambient" | "chill" => Mood::Dreamy,
            "energetic" | "upbeat" | "danceable" | "dance" | "party" => Mood::Energetic,
            "melancholic" | "melancholy" | "sad" | "somber" | "sombre" | "blue" => {
                Mood::Melancholic
            }
            "aggressive" | "intense" | "angry" | "dark" | "heavy" => Mood::Aggressive,
            "hopeful" | "happy" | "uplifting" | "bright" | "joyful" => Mood::Hopeful,
            "nostalgic" | "wistful" | "retro" => Mood::Nostalgic,
            "neutral" => Mood::Neutral,
            _ => return None,
        };
        Some(mood)
    }

    /// First mood word found anywhere in a free-text hint.
    pub fn from_hint(hint: &str) -> Option<Self> {
        hint.split(|c: char| !c.is_ascii_alphabetic())
            .filter(|w| !w.is_empty())
            .find_map(Mood::parse)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Dreamy => "dreamy",
            Mood::Energetic => "energetic",
            Mood::Melancholic => "melancholic",
            Mood::Aggressive => "aggressive",
            Mood::Hopeful => "hopeful",
            Mood::Nostalgic => "nostalgic",
            Mood::Neutral => "neutral",
        }
    }

    fn lexicon(&self) -> &'static [&'static str] {
        match self {
            Mood::Melancholic => &[
                "cry", "crying", "cried", "tears", "alone", "lonely", "goodbye", "lost",
                "sorry", "pain", "broken", "cold", "gone", "miss", "heartbreak", "sad",
                "hurt", "regret", "empty", "rain",
            ],
            Mood::Energetic => &[
                "dance", "dancing", "party", "jump", "run", "running", "fire", "wild",
                "alive", "tonight", "move", "shake", "loud", "faster", "beat",
            ],
            Mood::Dreamy => &[
                "dream", "dreams", "dreaming", "sky", "stars", "moon", "float", "clouds",
                "sleep", "heaven", "ocean", "drift", "glow",
            ],
            Mood::Aggressive => &[
                "fight", "hate", "kill", "blood", "war", "rage", "enemy", "burn", "scream",
                "gun", "destroy", "anger",
            ],
            Mood::Nostalgic => &[
                "remember", "memories", "memory", "yesterday", "used", "young", "back",
                "old", "childhood", "summer", "photograph",
            ],
            Mood::Hopeful => &[
                "hope", "light", "rise", "sun", "sunshine", "tomorrow", "believe", "free",
                "smile", "shine", "love", "together",
            ],
            Mood::Neutral => &[],
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ThemeProfile {
    /// Most frequent meaningful terms, highest first.
    pub themes: Vec<String>,
    pub vocabulary: BTreeSet<String>,
    pub mood: Mood,
}

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z]+").expect("valid word regex"));

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has",
        "had", "do", "does", "did", "will", "would", "could", "should", "may", "might", "must",
        "shall", "i", "you", "he", "she", "it", "we", "they", "me", "him", "her", "us", "them",
        "my", "your", "his", "its", "our", "their", "this", "that", "these", "those", "and",
        "but", "or", "so", "if", "then", "than", "when", "where", "what", "who", "which",
        "how", "why", "all", "each", "every", "both", "few", "more", "most", "other", "some",
        "such", "no", "not", "only", "own", "same", "just", "can", "now", "to", "of", "in",
        "for", "on", "with", "at", "by", "from", "up", "about", "into", "over", "after",
        "like", "get", "got", "go", "going", "gone", "come", "came", "know", "see", "want",
        "dont", "don", "im", "ive", "youre", "re", "ll", "ve", "oh", "yeah", "ya", "na", "la",
        "da", "uh", "ah", "ooh", "hey", "gonna", "wanna", "cause", "let", "there", "here",
        "out", "down", "cant", "won", "ain",
    ]
    .into_iter()
    .collect()
});

/// Lowercased alphabetic tokens of length > 1, in order of appearance.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    WORD_RE
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|w| w.len() > 1)
        .map(str::to_string)
        .collect()
}

pub fn extract(raw_lyrics: &str) -> ThemeProfile {
    let tokens = tokenize(raw_lyrics);
    if tokens.is_empty() {
        return ThemeProfile::default();
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for t in &tokens {
        *counts.entry(t.as_str()).or_default() += 1;
    }

    let mut ranked: Vec<(&str, usize)> = counts
        .iter()
        .filter(|(w, _)| w.len() > 2 && !STOPWORDS.contains(*w))
        .map(|(w, c)| (*w, *c))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let themes = ranked
        .iter()
        .take(MAX_THEMES)
        .map(|(w, _)| w.to_string())
        .collect();
    let vocabulary = ranked
        .iter()
        .take(MAX_VOCABULARY)
        .map(|(w, _)| w.to_string())
        .collect();

    ThemeProfile {
        themes,
        vocabulary,
        mood: detect_mood(&counts),
    }
}

fn detect_mood(counts: &HashMap<&str, usize>) -> Mood {
    let mut best = Mood::Neutral;
    let mut best_score = 0;
    for mood in Mood::PRIORITY {
        let score: usize = mood
            .lexicon()
            .iter()
            .map(|w| counts.get(w).copied().unwrap_or(0))
            .sum();
        if score > best_score {
            best = mood;
            best_score = score;
        }
    }
    best
}
