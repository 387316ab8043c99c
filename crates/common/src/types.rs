use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Maximum outbound text length accepted by the chat transport, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Suffix appended to text cut down to [`MAX_MESSAGE_CHARS`].
pub const TRUNCATION_MARKER: &str = "\n… [truncated]";

/// Telegram chat identifier. Negative for groups and channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChatId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(ChatId)
    }
}

/// Logical message type. Used for observability only, never for ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Notification,
    MetricsReport,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageKind::Notification => write!(f, "notification"),
            MessageKind::MetricsReport => write!(f, "metrics_report"),
        }
    }
}

/// Markup mode applied by the transport when rendering text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseMode {
    #[serde(rename = "HTML")]
    Html,
    MarkdownV2,
}

impl std::fmt::Display for ParseMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseMode::Html => write!(f, "HTML"),
            ParseMode::MarkdownV2 => write!(f, "MarkdownV2"),
        }
    }
}

/// Destination-agnostic outbound content. Recipients are resolved at dispatch time.
///
/// Only constructible through [`MessagePayload::new`] and its shorthands, so every
/// payload respects [`MAX_MESSAGE_CHARS`] and stays parseable in its markup mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessagePayload {
    text: String,
    pub parse_mode: Option<ParseMode>,
    pub disable_preview: bool,
}

impl MessagePayload {
    /// Payload in `parse_mode`, truncated to the transport limit.
    ///
    /// HTML is cut on a markup boundary with open tags closed. Oversized
    /// MarkdownV2 is sent as plain text, since the marker itself is not valid
    /// MarkdownV2.
    pub fn new(text: impl Into<String>, parse_mode: Option<ParseMode>) -> Self {
        let text = text.into();
        let oversized = text.chars().count() > MAX_MESSAGE_CHARS;

        let (text, parse_mode) = match parse_mode {
            Some(ParseMode::Html) => (truncate_html(text), parse_mode),
            Some(ParseMode::MarkdownV2) if oversized => (truncate_text(text), None),
            _ => (truncate_text(text), parse_mode),
        };

        Self {
            text,
            parse_mode,
            disable_preview: true,
        }
    }

    /// Plain text payload.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(text, None)
    }

    /// HTML payload.
    pub fn html(text: impl Into<String>) -> Self {
        Self::new(text, Some(ParseMode::Html))
    }

    pub fn with_preview(mut self, enabled: bool) -> Self {
        self.disable_preview = !enabled;
        self
    }

    pub fn body(&self) -> &str {
        &self.text
    }
}

/// Cut `text` to at most [`MAX_MESSAGE_CHARS`] characters.
///
/// Oversized text comes back exactly [`MAX_MESSAGE_CHARS`] long and ends with
/// [`TRUNCATION_MARKER`]. Shorter text is returned untouched.
pub fn truncate_text(text: String) -> String {
    if text.chars().count() <= MAX_MESSAGE_CHARS {
        return text;
    }

    let keep = MAX_MESSAGE_CHARS - TRUNCATION_MARKER.chars().count();
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

/// [`truncate_text`] for HTML bodies.
///
/// Never cuts inside a tag or an `&...;` entity, and closes every tag left open
/// before appending [`TRUNCATION_MARKER`]. The result may be a few characters
/// shorter than [`MAX_MESSAGE_CHARS`].
pub fn truncate_html(text: String) -> String {
    if text.chars().count() <= MAX_MESSAGE_CHARS {
        return text;
    }

    let budget = MAX_MESSAGE_CHARS - TRUNCATION_MARKER.chars().count();
    let mut keep = budget;
    loop {
        let end = text
            .char_indices()
            .nth(keep)
            .map(|(i, _)| i)
            .unwrap_or(text.len());
        let head = markup_boundary(&text[..end]);
        let closing = closing_tags(head);

        let used = head.chars().count() + closing.chars().count();
        if used <= budget {
            let mut out = String::with_capacity(head.len() + closing.len() + TRUNCATION_MARKER.len());
            out.push_str(head);
            out.push_str(&closing);
            out.push_str(TRUNCATION_MARKER);
            return out;
        }
        // Strictly shrinks: `used > budget` and `head` is at most `keep` chars.
        keep = head.chars().count().saturating_sub(used - budget);
    }
}

/// Drop a trailing unterminated tag or entity.
fn markup_boundary(text: &str) -> &str {
    let mut text = text;
    if let Some(open) = text.rfind('<')
        && !text[open..].contains('>')
    {
        text = &text[..open];
    }
    if let Some(amp) = text.rfind('&')
        && !text[amp..].contains(';')
    {
        text = &text[..amp];
    }
    text
}

/// Closing tags for every element still open at the end of `html`, innermost first.
fn closing_tags(html: &str) -> String {
    let mut open: Vec<String> = Vec::new();
    let mut rest = html;

    while let Some(start) = rest.find('<') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('>') else {
            break;
        };
        let tag = &after[..end];
        rest = &after[end + 1..];

        if let Some(name) = tag.strip_prefix('/') {
            let name = name.trim().to_ascii_lowercase();
            if let Some(pos) = open.iter().rposition(|t| *t == name) {
                open.truncate(pos);
            }
        } else if !tag.ends_with('/')
            && let Some(name) = tag.split_whitespace().next()
        {
            open.push(name.to_ascii_lowercase());
        }
    }

    open.iter().rev().map(|t| format!("</{}>", t)).collect()
}

/// Escape user-provided content for Telegram's HTML parse mode.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
