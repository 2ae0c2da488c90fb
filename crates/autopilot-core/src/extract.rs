//! Email content extraction
//!
//! Turns a Gmail message payload into plain, readable text plus the
//! Subject/From/Date headers:
//!
//! 1. pick one body (direct body, else first `text/plain` part, else first
//!    `text/html` part)
//! 2. base64url-decode it, falling back to the raw string when it was never
//!    encoded or does not decode to UTF-8
//! 3. reduce HTML to text
//! 4. reject results that are too short or mostly unprintable

use std::sync::LazyLock;

use base64::{engine::general_purpose::URL_SAFE, Engine};
use regex::Regex;

use crate::models::{
    EmailHeaders, ExtractedEmail, Extraction, ExtractionFailure, Message, MessagePayload,
};

/// Bodies shorter than this (in characters) are rejected
pub const MIN_TEXT_LEN: usize = 10;

/// Printable share a body must exceed to count as text
pub const MIN_PRINTABLE_RATIO: f64 = 0.70;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static LEGACY_ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(amp|lt|gt|quot|nbsp|copy|reg)\b;?").unwrap());
static BRACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{[^}]*\}").unwrap());
static LONG_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\S{30,}").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// The body chosen for a message, with the MIME type it was found under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectedBody<'a> {
    pub data: &'a str,
    pub mime_type: &'a str,
}

impl SelectedBody<'_> {
    pub fn is_html(&self) -> bool {
        self.mime_type.eq_ignore_ascii_case("text/html")
    }
}

/// Choose at most one textual body from the payload
pub fn select_body(payload: &MessagePayload) -> Option<SelectedBody<'_>> {
    if let Some(data) = payload.data() {
        return Some(SelectedBody {
            data,
            mime_type: &payload.mime_type,
        });
    }

    let mut html = None;
    for part in &payload.parts {
        let Some(data) = part.data() else {
            continue;
        };
        match part.mime_type.as_str() {
            "text/plain" => {
                return Some(SelectedBody {
                    data,
                    mime_type: "text/plain",
                })
            }
            "text/html" if html.is_none() => {
                html = Some(SelectedBody {
                    data,
                    mime_type: "text/html",
                })
            }
            _ => {}
        }
    }
    html
}

/// Decode a base64url body, or return it unchanged if it is not encoded.
///
/// Output that is not valid UTF-8 counts as a failed decode: a body in a
/// legacy charset is returned as the raw base64 string rather than lossily
/// converted.
pub fn decode_body(data: &str) -> String {
    if let Some(text) = try_decode(data) {
        return text;
    }

    let missing = data.len() % 4;
    if missing != 0 {
        let mut padded = String::with_capacity(data.len() + 4 - missing);
        padded.push_str(data);
        padded.extend(std::iter::repeat('=').take(4 - missing));
        if let Some(text) = try_decode(&padded) {
            return text;
        }
    }

    data.to_string()
}

fn try_decode(data: &str) -> Option<String> {
    let bytes = URL_SAFE.decode(data).ok()?;
    String::from_utf8(bytes).ok()
}

/// Reduce an HTML document to a single line of readable text
pub fn html_to_text(html: &str) -> String {
    let text = TAG_RE.replace_all(html, "");
    let text = decode_entities(&text);
    // Stylesheet leftovers
    let text = BRACE_RE.replace_all(&text, "");
    // Tracking pixels, encoded blobs, long URLs
    let text = LONG_TOKEN_RE.replace_all(&text, "");
    let text = WHITESPACE_RE.replace_all(&text, " ");
    text.trim().to_string()
}

/// Decode numeric and named HTML entities; unknown names are kept.
///
/// Common legacy entities written without the trailing `;` are decoded too.
pub fn decode_entities(text: &str) -> String {
    let text = LEGACY_ENTITY_RE.replace_all(text, "&$1;");
    html_escape::decode_html_entities(&text).into_owned()
}

/// Control and invisible format characters are not printable
fn is_printable(c: char) -> bool {
    !c.is_control()
        && !matches!(
            c,
            '\u{ad}'
                | '\u{200b}'..='\u{200f}'
                | '\u{2028}'..='\u{202e}'
                | '\u{2060}'..='\u{2064}'
                | '\u{feff}'
        )
}

/// Check that `text` is long enough and mostly printable
pub fn is_readable_text(text: &str) -> bool {
    let total = text.chars().count();
    if total < MIN_TEXT_LEN {
        return false;
    }

    let printable = text
        .chars()
        .filter(|&c| is_printable(c) || c.is_whitespace())
        .count();
    (printable as f64 / total as f64) > MIN_PRINTABLE_RATIO
}

/// Run the full pipeline over a payload
pub fn extract(payload: &MessagePayload) -> Extraction {
    let Some(selected) = select_body(payload) else {
        return Extraction::Failed(ExtractionFailure::NoBody);
    };

    let mut body = decode_body(selected.data);
    if selected.is_html() {
        body = html_to_text(&body);
    }

    if !is_readable_text(&body) {
        return Extraction::Failed(ExtractionFailure::NonText);
    }

    Extraction::Content(ExtractedEmail {
        headers: EmailHeaders::from_headers(&payload.headers),
        body,
    })
}

/// Run the full pipeline over a fetched message
pub fn extract_message(message: &Message) -> Extraction {
    extract(&message.payload)
}
