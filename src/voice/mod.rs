//! Voice selection: (mood, gender) to a TTS voice with rate and pitch offsets.

use crate::input::{Gender, TrackRequest};
use crate::themes::Mood;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub const DEFAULT_VOICE: &str = "en-US-AriaNeural";

const FEMALE_VOICES: [&str; 3] = ["en-US-AriaNeural", "en-US-JennyNeural", "en-GB-SoniaNeural"];
const MALE_VOICES: [&str; 3] = ["en-US-GuyNeural", "en-GB-RyanNeural", "en-US-DavisNeural"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub voice_id: String,
    /// Speaking-rate offset in percent.
    pub rate: i32,
    /// Pitch offset in Hz.
    pub pitch: i32,
}

impl VoiceProfile {
    /// `+10%` / `-15%`
    pub fn rate_arg(&self) -> String {
        format!("{:+}%", self.rate)
    }

    /// `+0Hz` / `-4Hz`
    pub fn pitch_arg(&self) -> String {
        format!("{:+}Hz", self.pitch)
    }
}

struct MoodVoice {
    voice: &'static str,
    rate: i32,
    pitch: i32,
}

fn mood_voice(mood: Mood) -> MoodVoice {
    let (voice, rate, pitch) = match mood {
        Mood::Energetic => ("en-US-AriaNeural", 10, 2),
        Mood::Melancholic => ("en-US-JennyNeural", -15, -4),
        Mood::Dreamy => ("en-GB-SoniaNeural", -10, -2),
        Mood::Aggressive => ("en-US-GuyNeural", 5, -2),
        Mood::Hopeful => ("en-US-AriaNeural", 0, 2),
        Mood::Nostalgic => ("en-GB-RyanNeural", -5, -2),
        Mood::Neutral => (DEFAULT_VOICE, 0, 0),
    };
    MoodVoice { voice, rate, pitch }
}

/// Deterministic voice choice. The gender pool wins over the mood's preferred
/// voice unless that voice is in the pool.
pub fn select_voice(mood: Mood, gender: Gender) -> VoiceProfile {
    let base = mood_voice(mood);
    let pool: &[&str] = match gender {
        Gender::Female => &FEMALE_VOICES,
        Gender::Male => &MALE_VOICES,
        Gender::Neutral => &[],
    };

    let voice_id = if pool.is_empty() || pool.contains(&base.voice) {
        base.voice
    } else {
        pool.first().copied().unwrap_or(DEFAULT_VOICE)
    };

    VoiceProfile {
        voice_id: voice_id.to_string(),
        rate: base.rate,
        pitch: base.pitch,
    }
}

static FEMALE_FIRST_NAMES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "adele", "alicia", "amy", "anna", "ariana", "beyonce", "billie", "carly", "celine",
        "christina", "dua", "ellie", "fiona", "gwen", "halsey", "janet", "jessie", "joan", "joni",
        "katy", "kelly", "lady", "lana", "laura", "lorde", "madonna", "mariah", "norah", "olivia",
        "pink", "rihanna", "selena", "sia", "stevie", "sza", "taylor", "whitney", "zara",
    ]
    .into_iter()
    .collect()
});

static MALE_FIRST_NAMES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "bruno", "chris", "drake", "ed", "elton", "eminem", "frank", "harry", "jack", "james",
        "jason", "jay", "john", "justin", "kanye", "kendrick", "kurt", "lil", "michael", "nick",
        "paul", "post", "sam", "tyler", "weeknd", "zayn",
    ]
    .into_iter()
    .collect()
});

static GROUP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:and|feat|featuring|ft)\b|&").expect("valid group regex"));

/// `"The Weeknd!"` -> `"the weeknd"`
pub fn normalize_artist(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '&')
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Best-effort vocal gender, most explicit source first: configured override,
/// request hint, style-hint keywords, configured artist map, first-name lists.
pub fn resolve_gender(
    request: &TrackRequest,
    gender_override: Option<Gender>,
    artist_genders: &HashMap<String, Gender>,
) -> Gender {
    if let Some(g) = gender_override.or(request.gender_hint) {
        return g;
    }
    if let Some(g) = request.style_hint.as_deref().and_then(Gender::from_hint) {
        return g;
    }

    let artist = normalize_artist(&request.artist);
    if let Some(g) = artist_genders
        .iter()
        .find(|(name, _)| normalize_artist(name) == artist)
        .map(|(_, g)| *g)
    {
        return g;
    }

    if GROUP_RE.is_match(&artist) {
        return Gender::Neutral;
    }
    let first = artist.split(' ').next().unwrap_or_default();
    if FEMALE_FIRST_NAMES.contains(first) {
        Gender::Female
    } else if MALE_FIRST_NAMES.contains(first) {
        Gender::Male
    } else {
        Gender::Neutral
    }
}
