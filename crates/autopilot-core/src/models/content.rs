//! Extracted email content

use serde::{Deserialize, Serialize};

use super::MessageHeader;

/// Subject, sender and date of a message.
///
/// `None` means the header is absent; a present but empty header is
/// `Some("")`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailHeaders {
    pub subject: Option<String>,
    pub from: Option<String>,
    pub date: Option<String>,
}

impl EmailHeaders {
    /// Build the record in one pass, keeping the first value of each field
    pub fn from_headers(headers: &[MessageHeader]) -> Self {
        let mut record = Self::default();
        for header in headers {
            let slot = match header.name.as_str() {
                "Subject" => &mut record.subject,
                "From" => &mut record.from,
                "Date" => &mut record.date,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(header.value.clone());
            }
        }
        record
    }

    /// True when subject, sender and date are all present and non-empty
    pub fn is_complete(&self) -> bool {
        [&self.subject, &self.from, &self.date]
            .iter()
            .all(|f| f.as_deref().is_some_and(|v| !v.is_empty()))
    }
}

/// Render an optional header for prompts and logs (`None` when absent)
pub fn display_header(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("None")
}

/// Readable content of one message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedEmail {
    #[serde(flatten)]
    pub headers: EmailHeaders,
    pub body: String,
}

/// Why a message could not be turned into readable text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionFailure {
    /// Neither a direct body nor a text part carried data
    NoBody,
    /// The decoded body failed the readable-text check
    NonText,
}

impl ExtractionFailure {
    /// Sentinel text passed on in place of a body
    pub fn message(&self) -> &'static str {
        match self {
            ExtractionFailure::NoBody => "Could not extract email body content.",
            ExtractionFailure::NonText => "Email contains non-text content.",
        }
    }
}

impl std::fmt::Display for ExtractionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Result of running the content extractor over a payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Content(ExtractedEmail),
    Failed(ExtractionFailure),
}

impl Extraction {
    /// Headers of the message; all missing when extraction failed
    pub fn headers(&self) -> EmailHeaders {
        match self {
            Extraction::Content(email) => email.headers.clone(),
            Extraction::Failed(_) => EmailHeaders::default(),
        }
    }

    /// Body text, or the sentinel text on failure
    pub fn body_text(&self) -> &str {
        match self {
            Extraction::Content(email) => &email.body,
            Extraction::Failed(failure) => failure.message(),
        }
    }
}
