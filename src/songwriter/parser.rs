//! Lenient parsing of the songwriter reply.
//!
//! The model is asked for `TITLE:`/`MOOD:` headers followed by labeled
//! sections, but replies drift: bold markers, bracketed or colon-suffixed
//! labels, preambles, or no labels at all. Anything that is not a header or a
//! marker is lyric text. A reply without markers is one verse.

use super::{Section, SectionLabel};
use crate::themes::Mood;
use once_cell::sync::Lazy;
use regex::Regex;

/// Headers and sections recovered from a reply.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedSong {
    pub title: Option<String>,
    pub mood: Option<Mood>,
    pub sections: Vec<Section>,
}

static MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(pre-?chorus|verse|chorus|bridge|hook|refrain|intro|outro)(?:\s*\d+)?(?:\s*\([^)]*\))?$",
    )
    .expect("valid marker regex")
});

static KEYWORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(pre-?chorus|verse|chorus|bridge|hook|refrain|intro|outro)\b")
        .expect("valid keyword regex")
});

pub fn parse_song(reply: &str) -> ParsedSong {
    let mut parsed = ParsedSong::default();
    let mut current: Option<(SectionLabel, Vec<&str>)> = None;
    let mut done: Vec<(SectionLabel, Vec<&str>)> = Vec::new();

    for line in reply.lines() {
        if let Some(title) = header_value(line, "title") {
            if parsed.title.is_none() && !title.is_empty() {
                parsed.title = Some(title.to_string());
            }
            continue;
        }
        if let Some(mood) = header_value(line, "mood") {
            if parsed.mood.is_none() {
                parsed.mood = Mood::parse(mood);
            }
            continue;
        }
        if let Some(label) = section_marker(line) {
            if let Some(section) = current.take() {
                done.push(section);
            }
            current = Some((label, Vec::new()));
            continue;
        }

        match current.as_mut() {
            Some((_, lines)) => lines.push(line),
            None if line.trim().is_empty() => {}
            None => current = Some((SectionLabel::Verse, vec![line])),
        }
    }
    if let Some(section) = current.take() {
        done.push(section);
    }

    parsed.sections = done
        .into_iter()
        .filter_map(|(label, lines)| {
            let text = lines
                .iter()
                .map(|l| l.trim_end())
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string();
            (!text.is_empty()).then_some(Section { label, text })
        })
        .collect();
    parsed
}

/// Value of a `KEY: value` header line, tolerating markdown bold.
fn header_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let l = line.trim().trim_start_matches(['*', '#']).trim_start();
    let head = l.get(..key.len())?;
    if !head.eq_ignore_ascii_case(key) {
        return None;
    }
    let rest = l[key.len()..].trim_start().strip_prefix(':')?;
    Some(rest.trim_matches(|c: char| c == '*' || c == '"' || c.is_whitespace()))
}

/// Bracketed or parenthesized whole lines are always markers and never sung;
/// bare lines must look like `Chorus 2` or `Verse (x2)`.
fn section_marker(line: &str) -> Option<SectionLabel> {
    let core = line
        .trim()
        .trim_matches(|c: char| c == '*' || c == '#' || c == '_')
        .trim()
        .trim_end_matches(':')
        .trim_end();

    let wrapped = core
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .or_else(|| core.strip_prefix('(').and_then(|s| s.strip_suffix(')')));
    if let Some(inner) = wrapped {
        let label = KEYWORD_RE
            .captures(inner)
            .and_then(|caps| caps.get(1))
            .map_or(SectionLabel::Verse, |m| label_for(m.as_str()));
        return Some(label);
    }

    let caps = MARKER_RE.captures(core)?;
    Some(label_for(caps.get(1)?.as_str()))
}

fn label_for(word: &str) -> SectionLabel {
    match word.to_ascii_lowercase().as_str() {
        "chorus" | "hook" | "refrain" => SectionLabel::Chorus,
        "bridge" => SectionLabel::Bridge,
        _ => SectionLabel::Verse,
    }
}
