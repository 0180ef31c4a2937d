//! Lyrics extraction from Genius song pages.
//!
//! Genius renders lyrics into one or more
//! `<div data-lyrics-container="true">` blocks, with `<br>` line breaks and
//! nested `data-exclude-from-selection` blocks for headers and ads. Older
//! layouts use `div.lyrics` / `div.lyrics-root`.

use once_cell::sync::Lazy;
use regex::Regex;

static CONTAINER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<div\b[^>]*data-lyrics-container="true"[^>]*>"#).expect("valid regex")
});
static LEGACY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<div\b[^>]*class="(?:lyrics|lyrics-root)"[^>]*>"#).expect("valid regex")
});
static EXCLUDE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<div\b[^>]*data-exclude-from-selection="true"[^>]*>"#).expect("valid regex")
});
static BR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").expect("valid regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static DIV_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<(/?)div\b").expect("valid regex"));

static SECTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]*\]").expect("valid regex"));
static EMBED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d*Embed\s*$").expect("valid regex"));
static BLANKS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Extract plain lyric text from a song page, or `None` when the page has no
/// recognizable lyrics block.
pub fn extract_lyrics(html: &str) -> Option<String> {
    let mut blocks = div_blocks(html, &CONTAINER_RE);
    if blocks.is_empty() {
        blocks = div_blocks(html, &LEGACY_RE);
    }
    if blocks.is_empty() {
        return None;
    }

    let parts: Vec<String> = blocks.into_iter().map(block_text).collect();
    let text = parts.join("\n");
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Inner HTML of every `<div>` whose opening tag matches `open`, with nested
/// divs balanced.
fn div_blocks<'a>(html: &'a str, open: &Regex) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut pos = 0;
    while let Some(m) = open.find_at(html, pos) {
        let inner_start = m.end();
        let inner_end = matching_close(html, inner_start).unwrap_or(html.len());
        out.push(&html[inner_start..inner_end]);
        pos = inner_end;
    }
    out
}

/// Byte offset of the `</div>` closing a div whose body starts at `start`.
fn matching_close(html: &str, start: usize) -> Option<usize> {
    let mut depth = 1usize;
    for cap in DIV_TAG_RE.captures_iter(&html[start..]) {
        let m = cap.get(0)?;
        if cap.get(1).is_some_and(|c| c.as_str() == "/") {
            depth -= 1;
            if depth == 0 {
                return Some(start + m.start());
            }
        } else {
            depth += 1;
        }
    }
    None
}

fn block_text(inner: &str) -> String {
    let mut cleaned = String::with_capacity(inner.len());
    let mut pos = 0;
    while let Some(m) = EXCLUDE_RE.find_at(inner, pos) {
        cleaned.push_str(&inner[pos..m.start()]);
        let end = matching_close(inner, m.end()).unwrap_or(inner.len());
        // Skip past the closing `</div>` of the excluded block.
        pos = inner[end..]
            .find('>')
            .map(|i| end + i + 1)
            .unwrap_or(inner.len());
    }
    cleaned.push_str(&inner[pos..]);

    let with_breaks = BR_RE.replace_all(&cleaned, "\n");
    let stripped = TAG_RE.replace_all(&with_breaks, "");
    decode_entities(&stripped)
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Normalize scraped or API lyrics for analysis and prompting.
pub fn clean_lyrics(lyrics: &str) -> String {
    let without_sections = SECTION_RE.replace_all(lyrics, "");
    let kept: Vec<&str> = without_sections
        .lines()
        .filter(|l| !is_page_header(l))
        .collect();
    let joined = kept.join("\n").replace("You might also like", "");
    let without_embed = EMBED_RE.replace(joined.trim_end(), "");
    BLANKS_RE
        .replace_all(&without_embed, "\n\n")
        .trim()
        .to_string()
}

// "123 ContributorsTranslations…Hello Lyrics"
fn is_page_header(line: &str) -> bool {
    let l = line.trim();
    l.contains("Contributor") && l.ends_with("Lyrics")
}
