//! Mail tools exposed to the agent, the REST server and the CLI

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::MailConfig;
use crate::error::{Error, Result};
use crate::extract;
use crate::gmail::MailClient;
use crate::llm::CompletionService;
use crate::models::{display_header, EmailHeaders, Extraction, MessageRef, ToolCall};

/// Log target for the unread preview lines
pub const PREVIEW_TARGET: &str = "autopilot::preview";

/// Text returned when no unread message matches
pub const NO_UNREAD_MESSAGES: &str = "You have no unread messages.";

/// Tool definition advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// The closed set of tools
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    ListUnread,
    Summarize,
}

impl ToolKind {
    pub const ALL: [ToolKind; 2] = [ToolKind::ListUnread, ToolKind::Summarize];

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::ListUnread => "list_unread_emails",
            ToolKind::Summarize => "summarize_email",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn descriptor(&self) -> ToolDescriptor {
        match self {
            ToolKind::ListUnread => ToolDescriptor {
                name: self.name().to_string(),
                description: "List the unread emails in the inbox and return their message IDs."
                    .to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "limit": {
                            "type": "integer",
                            "default": 10,
                            "description": "Maximum number of message IDs to return"
                        }
                    }
                }),
            },
            ToolKind::Summarize => ToolDescriptor {
                name: self.name().to_string(),
                description: "Summarize a single email by its message ID. The email_id must be \
                              a string like '19a8f479946bf71e' as returned by list_unread_emails."
                    .to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "email_id": {
                            "type": "string",
                            "description": "Message ID of the email to summarize"
                        }
                    },
                    "required": ["email_id"]
                }),
            },
        }
    }
}

/// Descriptors of every tool, in declaration order
pub fn descriptors() -> Vec<ToolDescriptor> {
    ToolKind::ALL.iter().map(ToolKind::descriptor).collect()
}

fn default_limit() -> u32 {
    10
}

/// Models sometimes send numbers as strings or null
fn lenient_limit<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;

    match Value::deserialize(deserializer)? {
        Value::Null => Ok(default_limit()),
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| D::Error::custom(format!("invalid limit: {}", n))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("invalid limit: {:?}", s))),
        other => Err(D::Error::custom(format!("invalid limit: {}", other))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ListUnreadArgs {
    #[serde(default = "default_limit", deserialize_with = "lenient_limit")]
    pub limit: u32,
}

impl Default for ListUnreadArgs {
    fn default() -> Self {
        Self {
            limit: default_limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SummarizeArgs {
    pub email_id: String,
}

/// A parsed tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tool {
    ListUnread(ListUnreadArgs),
    Summarize(SummarizeArgs),
}

impl Tool {
    /// Parse a model tool call into a typed invocation
    pub fn from_call(call: &ToolCall) -> Result<Self> {
        let kind =
            ToolKind::from_name(&call.name).ok_or_else(|| Error::ToolNotFound(call.name.clone()))?;

        // Arguments may arrive JSON-encoded in a string
        let arguments = match &call.arguments {
            Value::Null => Value::Object(Default::default()),
            Value::String(s) => serde_json::from_str(s).map_err(|e| {
                Error::InvalidRequest(format!("{}: malformed arguments: {}", call.name, e))
            })?,
            other => other.clone(),
        };

        let invalid = |e: serde_json::Error| Error::InvalidRequest(format!("{}: {}", call.name, e));
        Ok(match kind {
            ToolKind::ListUnread => Tool::ListUnread(serde_json::from_value(arguments).map_err(invalid)?),
            ToolKind::Summarize => Tool::Summarize(serde_json::from_value(arguments).map_err(invalid)?),
        })
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            Tool::ListUnread(_) => ToolKind::ListUnread,
            Tool::Summarize(_) => ToolKind::Summarize,
        }
    }
}

/// Result of [`MailTools::list_unread`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnreadListing {
    Messages(Vec<MessageRef>),
    /// Nothing matched the unread query
    Empty,
}

impl UnreadListing {
    pub fn is_empty(&self) -> bool {
        match self {
            UnreadListing::Messages(ids) => ids.is_empty(),
            UnreadListing::Empty => true,
        }
    }

    /// Text handed back to the model
    pub fn to_tool_output(&self) -> Result<String> {
        match self {
            UnreadListing::Messages(ids) => Ok(serde_json::to_string(ids)?),
            UnreadListing::Empty => Ok(NO_UNREAD_MESSAGES.to_string()),
        }
    }
}

/// Serializes as an array of IDs, or as the "no messages" string
impl Serialize for UnreadListing {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            UnreadListing::Messages(ids) => ids.serialize(serializer),
            UnreadListing::Empty => serializer.serialize_str(NO_UNREAD_MESSAGES),
        }
    }
}

/// Prompt used by [`MailTools::summarize`]
pub fn summarize_prompt(extraction: &Extraction) -> String {
    let headers = extraction.headers();
    format!(
        "Summarize the following e-mail concisely:\n\n\
         Subject: {}\n\
         Sender: {}\n\
         Date: {}\n\n\
         Body: {}\n",
        display_header(&headers.subject),
        display_header(&headers.from),
        display_header(&headers.date),
        extraction.body_text()
    )
}

/// One preview line for the unread listing
fn preview_line(id: &MessageRef, headers: Option<&EmailHeaders>) -> String {
    match headers.filter(|h| h.is_complete()) {
        Some(EmailHeaders {
            subject: Some(subject),
            from: Some(from),
            date: Some(date),
        }) => {
            let date: String = date.chars().take(25).collect();
            format!(
                "**ID:** {} | **Subject:** {} | **Date:** {} | **From:** {}",
                id, subject, date, from
            )
        }
        _ => format!("**ID:** {} | Not Enough Info", id),
    }
}

/// Implementation of the mail tools
pub struct MailTools {
    mail: Arc<dyn MailClient>,
    completion: Arc<dyn CompletionService>,
    config: MailConfig,
}

impl MailTools {
    pub fn new(
        mail: Arc<dyn MailClient>,
        completion: Arc<dyn CompletionService>,
        config: MailConfig,
    ) -> Self {
        Self {
            mail,
            completion,
            config,
        }
    }

    /// Limit used when a caller does not supply one
    pub fn default_limit(&self) -> u32 {
        self.config.default_limit
    }

    /// IDs of up to `limit` unread messages
    pub async fn list_unread(&self, limit: u32) -> Result<UnreadListing> {
        info!("Listing up to {} unread messages", limit);
        if limit == 0 {
            return Ok(UnreadListing::Messages(Vec::new()));
        }

        let mut ids = self
            .mail
            .list_message_ids(&self.config.unread_query, limit)
            .await?;
        if ids.is_empty() {
            return Ok(UnreadListing::Empty);
        }
        ids.truncate(limit as usize);

        for id in &ids {
            let headers = match self.mail.get_message(id).await {
                Ok(message) => match extract::extract_message(&message) {
                    Extraction::Content(email) => Some(email.headers),
                    Extraction::Failed(_) => None,
                },
                Err(e) => {
                    warn!("Could not fetch {} for preview: {}", id, e);
                    None
                }
            };
            info!(target: PREVIEW_TARGET, "{}", preview_line(id, headers.as_ref()));
        }

        Ok(UnreadListing::Messages(ids))
    }

    /// Summarize one message with the completion service
    pub async fn summarize(&self, email_id: &str) -> Result<String> {
        let id = MessageRef::normalize(email_id);
        if id.is_empty() {
            return Err(Error::InvalidRequest("email_id must not be empty".to_string()));
        }
        info!("Summarizing message {}", id);

        let message = self.mail.get_message(&id).await?;
        let extraction = extract::extract_message(&message);
        if let Extraction::Failed(failure) = &extraction {
            debug!("Message {} has no usable body: {}", id, failure);
        }

        let prompt = summarize_prompt(&extraction);
        debug!(target: PREVIEW_TARGET, "{}", prompt);

        self.completion.complete(&prompt).await
    }

    /// Run a parsed tool and render its output as text
    pub async fn execute(&self, tool: Tool) -> Result<String> {
        debug!("Executing tool: {:?}", tool);
        match tool {
            Tool::ListUnread(args) => self.list_unread(args.limit).await?.to_tool_output(),
            Tool::Summarize(args) => self.summarize(&args.email_id).await,
        }
    }

    /// Parse and run a model tool call
    pub async fn execute_call(&self, call: &ToolCall) -> Result<String> {
        let tool = Tool::from_call(call)?;
        self.execute(tool).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{
        ChatMessage, Message, MessageHeader, MessagePart, MessagePayload,
    };
    use async_trait::async_trait;
    use base64::{engine::general_purpose::URL_SAFE, Engine};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::HashMap;

    /// In-memory mailbox
    #[derive(Default)]
    pub(crate) struct FakeMail {
        pub unread: Vec<String>,
        pub messages: HashMap<String, Message>,
        pub list_calls: Mutex<Vec<(String, u32)>>,
        pub fetched: Mutex<Vec<String>>,
    }

    impl FakeMail {
        pub fn with_message(mut self, id: &str, subject: &str, body: &str) -> Self {
            let payload = MessagePayload {
                mime_type: "multipart/alternative".to_string(),
                headers: vec![
                    MessageHeader::new("Subject", subject),
                    MessageHeader::new("From", "Bob <bob@example.com>"),
                    MessageHeader::new("Date", "Tue, 14 Oct 2025 08:30:00 +0000 (UTC)"),
                ],
                body: None,
                parts: vec![MessagePart::new("text/plain", URL_SAFE.encode(body))],
            };
            self.messages.insert(
                id.to_string(),
                Message {
                    id: id.to_string(),
                    thread_id: None,
                    label_ids: vec!["UNREAD".to_string()],
                    snippet: None,
                    payload,
                },
            );
            self
        }
    }

    #[async_trait]
    impl MailClient for FakeMail {
        async fn list_message_ids(&self, query: &str, limit: u32) -> Result<Vec<MessageRef>> {
            self.list_calls.lock().push((query.to_string(), limit));
            Ok(self.unread.iter().map(|id| MessageRef::from_provider(id)).collect())
        }

        async fn get_message(&self, id: &MessageRef) -> Result<Message> {
            self.fetched.lock().push(id.to_string());
            self.messages
                .get(id.as_str())
                .cloned()
                .ok_or_else(|| Error::NotFound(id.to_string()))
        }
    }

    /// Completion service that records prompts and answers with a fixed text
    pub(crate) struct FakeCompletion {
        pub answer: String,
        pub prompts: Mutex<Vec<String>>,
    }

    impl FakeCompletion {
        pub fn new(answer: &str) -> Self {
            Self {
                answer: answer.to_string(),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionService for FakeCompletion {
        async fn invoke(
            &self,
            messages: &[ChatMessage],
            _tools: &[ToolDescriptor],
        ) -> Result<ChatMessage> {
            let prompt = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            self.prompts.lock().push(prompt);
            Ok(ChatMessage::assistant(self.answer.clone()))
        }
    }

    fn tools(mail: FakeMail) -> (MailTools, Arc<FakeMail>, Arc<FakeCompletion>) {
        let mail = Arc::new(mail);
        let completion = Arc::new(FakeCompletion::new("A short summary."));
        let tools = MailTools::new(mail.clone(), completion.clone(), MailConfig::default());
        (tools, mail, completion)
    }

    #[tokio::test]
    async fn test_zero_limit_skips_provider() {
        let (tools, mail, _) = tools(FakeMail {
            unread: vec!["a".to_string()],
            ..FakeMail::default()
        });

        let listing = tools.list_unread(0).await.unwrap();
        assert_eq!(listing, UnreadListing::Messages(vec![]));
        assert!(mail.list_calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_empty_mailbox() {
        let (tools, mail, _) = tools(FakeMail::default());

        let listing = tools.list_unread(10).await.unwrap();
        assert_eq!(listing, UnreadListing::Empty);
        assert_eq!(listing.to_tool_output().unwrap(), NO_UNREAD_MESSAGES);
        assert_eq!(
            mail.list_calls.lock().as_slice(),
            &[("is:unread".to_string(), 10)]
        );
    }

    #[tokio::test]
    async fn test_listing_strips_brackets_and_truncates() {
        let mail = FakeMail {
            unread: vec!["<m1>".to_string(), "m2".to_string(), "m3".to_string()],
            ..FakeMail::default()
        }
        .with_message("m1", "Lunch", "Are we still on for lunch tomorrow?");
        let (tools, mail, _) = tools(mail);

        // m2 is missing from the mailbox; the preview degrades but the listing survives
        let listing = tools.list_unread(2).await.unwrap();
        assert_eq!(
            listing,
            UnreadListing::Messages(vec![
                MessageRef::from_provider("m1"),
                MessageRef::from_provider("m2"),
            ])
        );
        assert_eq!(listing.to_tool_output().unwrap(), r#"["m1","m2"]"#);
        assert_eq!(mail.fetched.lock().as_slice(), &["m1", "m2"]);
    }

    #[test]
    fn test_preview_line() {
        let id = MessageRef::from_provider("m1");
        let headers = EmailHeaders {
            subject: Some("Lunch".to_string()),
            from: Some("Bob".to_string()),
            date: Some("Tue, 14 Oct 2025 08:30:00 +0000 (UTC)".to_string()),
        };
        assert_eq!(
            preview_line(&id, Some(&headers)),
            "**ID:** m1 | **Subject:** Lunch | **Date:** Tue, 14 Oct 2025 08:30:00 | **From:** Bob"
        );

        let partial = EmailHeaders {
            date: None,
            ..headers
        };
        assert_eq!(preview_line(&id, Some(&partial)), "**ID:** m1 | Not Enough Info");
        assert_eq!(preview_line(&id, None), "**ID:** m1 | Not Enough Info");
    }

    #[tokio::test]
    async fn test_summarize_normalizes_id_and_builds_prompt() {
        let mail = FakeMail::default().with_message(
            "abc123",
            "Invoice",
            "Your invoice for October is attached.",
        );
        let (tools, mail, completion) = tools(mail);

        let summary = tools.summarize("  <ABC123> ").await.unwrap();
        assert_eq!(summary, "A short summary.");
        assert_eq!(mail.fetched.lock().as_slice(), &["abc123"]);
        assert_eq!(
            completion.prompts.lock()[0],
            "Summarize the following e-mail concisely:\n\n\
             Subject: Invoice\n\
             Sender: Bob <bob@example.com>\n\
             Date: Tue, 14 Oct 2025 08:30:00 +0000 (UTC)\n\n\
             Body: Your invoice for October is attached.\n"
        );
    }

    #[tokio::test]
    async fn test_summarize_non_text_uses_sentinel() {
        let mail = FakeMail::default().with_message("short", "Hi", "hi!!");
        let (tools, _, completion) = tools(mail);

        tools.summarize("short").await.unwrap();
        let prompt = completion.prompts.lock()[0].clone();
        assert!(prompt.contains("Subject: None\nSender: None\nDate: None\n"));
        assert!(prompt.ends_with("Body: Email contains non-text content.\n"));
    }

    #[tokio::test]
    async fn test_summarize_missing_message() {
        let (tools, _, completion) = tools(FakeMail::default());

        let err = tools.summarize("nope").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(completion.prompts.lock().is_empty());

        assert!(matches!(
            tools.summarize(" <> ").await,
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_tool_from_call() {
        let call = |name: &str, arguments: Value| ToolCall {
            id: "call_0".to_string(),
            name: name.to_string(),
            arguments,
        };

        assert_eq!(
            Tool::from_call(&call("list_unread_emails", json!({}))).unwrap(),
            Tool::ListUnread(ListUnreadArgs { limit: 10 })
        );
        assert_eq!(
            Tool::from_call(&call("list_unread_emails", json!({"limit": "3"}))).unwrap(),
            Tool::ListUnread(ListUnreadArgs { limit: 3 })
        );
        assert_eq!(
            Tool::from_call(&call("summarize_email", json!("{\"email_id\": \"abc\"}")))
                .unwrap()
                .kind(),
            ToolKind::Summarize
        );
        assert!(matches!(
            Tool::from_call(&call("delete_email", json!({}))),
            Err(Error::ToolNotFound(_))
        ));
        assert!(matches!(
            Tool::from_call(&call("summarize_email", json!({}))),
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            Tool::from_call(&call("list_unread_emails", json!({"limit": -1}))),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_descriptors() {
        let all = descriptors();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "list_unread_emails");
        assert_eq!(all[1].input_schema["required"], json!(["email_id"]));
        assert_eq!(ToolKind::from_name("summarize_email"), Some(ToolKind::Summarize));
    }

    #[test]
    fn test_listing_serialization() {
        let listing = UnreadListing::Messages(vec![MessageRef::from_provider("<a>")]);
        assert_eq!(serde_json::to_value(&listing).unwrap(), json!(["a"]));
        assert_eq!(
            serde_json::to_value(UnreadListing::Empty).unwrap(),
            json!(NO_UNREAD_MESSAGES)
        );
    }
}
