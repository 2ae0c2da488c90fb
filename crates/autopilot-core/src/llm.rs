//! Completion service backed by a local Ollama server

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::config::ModelConfig;
use crate::error::{Error, Result};
use crate::models::{ChatMessage, Role, ToolCall};
use crate::tools::ToolDescriptor;

/// Chat model that can answer directly or request tool calls
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Send the conversation with the available tools and return the
    /// assistant's reply
    async fn invoke(&self, messages: &[ChatMessage], tools: &[ToolDescriptor])
        -> Result<ChatMessage>;

    /// One-shot completion of a plain prompt
    async fn complete(&self, prompt: &str) -> Result<String> {
        let reply = self.invoke(&[ChatMessage::user(prompt)], &[]).await?;
        Ok(reply.content)
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OllamaTool<'a>>,
}

#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: Role,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OllamaToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

impl From<&ChatMessage> for OllamaMessage {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
            tool_calls: message
                .tool_calls
                .iter()
                .map(|call| OllamaToolCall {
                    id: Some(call.id.clone()),
                    function: OllamaFunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                })
                .collect(),
            tool_name: message.tool_name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: OllamaToolFunction<'a>,
}

#[derive(Debug, Serialize)]
struct OllamaToolFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

impl<'a> From<&'a ToolDescriptor> for OllamaTool<'a> {
    fn from(tool: &'a ToolDescriptor) -> Self {
        Self {
            tool_type: "function",
            function: OllamaToolFunction {
                name: &tool.name,
                description: &tool.description,
                parameters: &tool.input_schema,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    function: OllamaFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaFunctionCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Option<Vec<OllamaToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OllamaErrorResponse {
    error: String,
}

/// Ollama `/api/chat` client
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    endpoint: String,
    model: String,
}

impl OllamaClient {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if config.request_timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.request_timeout_secs));
        }
        let client = builder
            .build()
            .map_err(|e| Error::Completion(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/chat", config.base_url.trim_end_matches('/')),
            model: config.name.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Convert the response message, numbering calls that arrive without an ID
fn into_chat_message(message: OllamaResponseMessage) -> ChatMessage {
    let tool_calls: Vec<ToolCall> = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(idx, call)| ToolCall {
            id: call.id.unwrap_or_else(|| format!("call_{}", idx)),
            name: call.function.name,
            arguments: call.function.arguments,
        })
        .collect();

    if tool_calls.is_empty() {
        ChatMessage::assistant(message.content)
    } else {
        ChatMessage::assistant_with_tools(message.content, tool_calls)
    }
}

#[async_trait]
impl CompletionService for OllamaClient {
    async fn invoke(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDescriptor],
    ) -> Result<ChatMessage> {
        let request = OllamaChatRequest {
            model: &self.model,
            messages: messages.iter().map(OllamaMessage::from).collect(),
            stream: false,
            tools: tools.iter().map(OllamaTool::from).collect(),
        };

        debug!(
            "Sending {} messages and {} tools to {}",
            request.messages.len(),
            request.tools.len(),
            self.model
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Completion(format!("Ollama request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Ollama returned {}: {}", status, body);
            if let Ok(error_response) = serde_json::from_str::<OllamaErrorResponse>(&body) {
                return Err(Error::Completion(error_response.error));
            }
            return Err(Error::Completion(format!("{} - {}", status, body)));
        }

        let data: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Completion(format!("Failed to parse Ollama response: {}", e)))?;

        let reply = into_chat_message(data.message);
        debug!("Model replied with {} tool calls", reply.tool_calls.len());
        Ok(reply)
    }
}
