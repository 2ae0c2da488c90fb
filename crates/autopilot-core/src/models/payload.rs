//! Gmail API message structures

use serde::{Deserialize, Serialize};

/// Opaque provider-assigned message identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageRef(String);

impl MessageRef {
    /// Wrap an ID as returned by the provider, dropping any angle brackets
    pub fn from_provider(raw: &str) -> Self {
        Self(raw.replace(['<', '>'], ""))
    }

    /// Normalize caller input: trim, drop angle brackets, lowercase
    pub fn normalize(raw: &str) -> Self {
        Self(raw.trim().replace(['<', '>'], "").trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for MessageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Entry of `users.messages.list`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageStub {
    pub id: String,
    #[serde(rename = "threadId", default)]
    pub thread_id: Option<String>,
}

/// Response of `users.messages.list`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListMessagesResponse {
    #[serde(default)]
    pub messages: Option<Vec<MessageStub>>,
    #[serde(rename = "nextPageToken", default)]
    pub next_page_token: Option<String>,
    #[serde(rename = "resultSizeEstimate", default)]
    pub result_size_estimate: Option<u64>,
}

/// Response of `users.messages.get` with `format=full`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "threadId", default)]
    pub thread_id: Option<String>,
    #[serde(rename = "labelIds", default)]
    pub label_ids: Vec<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub payload: MessagePayload,
}

/// Header name/value pair; names are not unique within a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

impl MessageHeader {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Body of a payload or part. `data` is base64url when present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessagePartBody {
    #[serde(rename = "attachmentId", default, skip_serializing_if = "Option::is_none")]
    pub attachment_id: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl MessagePartBody {
    pub fn with_data(data: impl Into<String>) -> Self {
        let data = data.into();
        Self {
            attachment_id: None,
            size: data.len() as u64,
            data: Some(data),
        }
    }

    fn non_empty_data(&self) -> Option<&str> {
        self.data.as_deref().filter(|d| !d.is_empty())
    }
}

/// One MIME part of a multipart message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePart {
    #[serde(rename = "partId", default, skip_serializing_if = "Option::is_none")]
    pub part_id: Option<String>,
    #[serde(rename = "mimeType", default)]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<MessagePartBody>,
}

impl MessagePart {
    pub fn new(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            part_id: None,
            mime_type: mime_type.into(),
            body: Some(MessagePartBody::with_data(data)),
        }
    }

    /// Body data, if the part carries any. Empty data counts as none.
    pub fn data(&self) -> Option<&str> {
        self.body.as_ref().and_then(MessagePartBody::non_empty_data)
    }
}

/// Top-level message tree
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessagePayload {
    #[serde(rename = "mimeType", default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Vec<MessageHeader>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<MessagePartBody>,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

impl MessagePayload {
    /// Directly attached body data, if any. Empty data counts as none.
    pub fn data(&self) -> Option<&str> {
        self.body.as_ref().and_then(MessagePartBody::non_empty_data)
    }
}
