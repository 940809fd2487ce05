use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Episode {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) topic: String,
    pub(crate) target_words: Vec<String>,
    pub(crate) transcript: Transcript,
    pub(crate) audio_url: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
}

impl Episode {
    pub(crate) fn is_playable(&self) -> bool {
        self.audio_url.is_some()
    }
}

/// One line of transcript aligned to `[start, end]` seconds of playback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct TranscriptSegment {
    pub(crate) start: f64,
    pub(crate) end: f64,
    pub(crate) text: String,
}

impl TranscriptSegment {
    pub(crate) fn new(start: f64, end: f64, text: &str) -> Self {
        Self {
            start,
            end,
            text: text.to_string(),
        }
    }

    pub(crate) fn contains(&self, position: f64) -> bool {
        self.start <= position && position <= self.end
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Transcript {
    Plain(String),
    Segments(Vec<TranscriptSegment>),
    /// Stored value that is neither text nor a valid segment list; kept verbatim.
    Malformed(String),
}

impl Transcript {
    /// Shape decides the variant: a JSON string is plain text, an array must be
    /// a list of `{start, end, text}` objects with `start <= end`.
    pub(crate) fn from_value(value: &Value) -> Self {
        match value {
            Value::String(text) => Self::Plain(text.clone()),
            Value::Array(items) => match parse_segments(items) {
                Some(segments) => Self::Segments(segments),
                None => Self::Malformed(value.to_string()),
            },
            other => Self::Malformed(other.to_string()),
        }
    }

    pub(crate) fn from_stored(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Self::from_value(&value),
            Err(_) => Self::Malformed(raw.to_string()),
        }
    }

    pub(crate) fn to_stored(&self) -> String {
        match self {
            Self::Plain(text) => Value::String(text.clone()).to_string(),
            Self::Segments(segments) => {
                serde_json::to_string(segments).unwrap_or_else(|_| "[]".to_string())
            }
            Self::Malformed(raw) => raw.clone(),
        }
    }

    pub(crate) fn segments(&self) -> Option<&[TranscriptSegment]> {
        match self {
            Self::Segments(segments) => Some(segments.as_slice()),
            Self::Plain(_) | Self::Malformed(_) => None,
        }
    }
}

fn parse_segments(items: &[Value]) -> Option<Vec<TranscriptSegment>> {
    let mut segments = Vec::with_capacity(items.len());
    for item in items {
        let start = item.get("start")?.as_f64()?;
        let end = item.get("end")?.as_f64()?;
        let text = item.get("text")?.as_str()?;
        if !start.is_finite() || !end.is_finite() || start > end {
            return None;
        }
        segments.push(TranscriptSegment::new(start, end, text));
    }
    segments.sort_by(|left, right| left.start.total_cmp(&right.start));
    Some(segments)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WordToken<'a> {
    pub(crate) text: &'a str,
    pub(crate) is_target: bool,
}

/// Letters only, lowercased: `"**Meticulous**,"` becomes `"meticulous"`.
pub(crate) fn normalize_word(word: &str) -> String {
    word.chars()
        .filter(|ch| ch.is_alphabetic())
        .flat_map(char::to_lowercase)
        .collect()
}

pub(crate) fn highlight_tokens<'a>(line: &'a str, target_words: &[String]) -> Vec<WordToken<'a>> {
    let targets: Vec<String> = target_words.iter().map(|w| normalize_word(w)).collect();
    line.split(' ')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let clean = normalize_word(word);
            WordToken {
                text: word,
                is_target: !clean.is_empty() && targets.contains(&clean),
            }
        })
        .collect()
}

/// Tag-input semantics: trims, ignores empties and duplicates.
pub(crate) fn push_target_word(words: &mut Vec<String>, raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() || words.iter().any(|word| word == trimmed) {
        return false;
    }
    words.push(trimmed.to_string());
    true
}

pub(crate) fn word_preview(words: &[String], shown: usize) -> String {
    let mut out = words
        .iter()
        .take(shown)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    if words.len() > shown {
        out.push_str(&format!(" +{}", words.len() - shown));
    }
    out
}

pub(crate) fn format_clock(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    let mut out = s.to_string();
    if out.chars().count() > max {
        out = out.chars().take(max.saturating_sub(3)).collect::<String>() + "...";
    }
    out
}

pub(crate) fn format_created_display(created_at: &DateTime<Utc>) -> String {
    created_at
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}
