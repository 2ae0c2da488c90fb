//! Conversational router
//!
//! A run alternates between two nodes. The LLM node sends the conversation to
//! the completion service; when the reply requests tools, the tools node
//! executes them and appends one tool message per call. By default the run
//! ends right after the tools node, so tool output is the final answer.
//! With `agent.chain_tool_calls` the results go back to the model instead,
//! until it answers without tools or `agent.max_steps` is reached.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::error::Result;
use crate::llm::CompletionService;
use crate::models::{ChatMessage, Conversation};
use crate::tools::{descriptors, MailTools, ToolDescriptor};

/// Router state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Llm,
    Tools,
    End,
}

/// Transition out of the LLM node
pub fn next_after_llm(reply: &ChatMessage) -> Node {
    if reply.has_pending_tool_calls() {
        Node::Tools
    } else {
        Node::End
    }
}

pub struct Agent {
    completion: Arc<dyn CompletionService>,
    tools: Arc<MailTools>,
    descriptors: Vec<ToolDescriptor>,
    config: AgentConfig,
}

impl Agent {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        tools: Arc<MailTools>,
        config: AgentConfig,
    ) -> Self {
        Self {
            completion,
            tools,
            descriptors: descriptors(),
            config,
        }
    }

    /// Transition out of the tools node after `steps` node executions
    fn next_after_tools(&self, steps: usize) -> Node {
        if self.config.chain_tool_calls && steps < self.config.max_steps {
            Node::Llm
        } else {
            Node::End
        }
    }

    /// Run one cycle on `conversation`, appending every message produced
    pub async fn run(&self, conversation: &mut Conversation) -> Result<()> {
        let mut node = Node::Llm;
        let mut steps = 0;

        loop {
            debug!("Agent step {}: {:?}", steps, node);
            node = match node {
                Node::Llm => {
                    steps += 1;
                    let reply = self
                        .completion
                        .invoke(conversation.messages(), &self.descriptors)
                        .await?;
                    let next = next_after_llm(&reply);
                    conversation.push(reply);
                    next
                }
                Node::Tools => {
                    steps += 1;
                    self.run_tools(conversation).await;
                    self.next_after_tools(steps)
                }
                Node::End => break,
            };
        }

        info!("Agent finished after {} steps", steps);
        Ok(())
    }

    /// Execute the pending calls of the last message, in order
    async fn run_tools(&self, conversation: &mut Conversation) {
        let calls = match conversation.last() {
            Some(message) if message.has_pending_tool_calls() => message.tool_calls.clone(),
            _ => return,
        };

        for call in &calls {
            info!("Tool called: {}", call.name);
            let content = match self.tools.execute_call(call).await {
                Ok(output) => output,
                Err(e) => {
                    warn!("Tool {} failed: {}", call.name, e);
                    format!("Error: {}", e)
                }
            };
            conversation.push(ChatMessage::tool_result(call, content));
        }
    }

    /// Answer a single instruction in a fresh conversation
    pub async fn prompt(&self, message: &str) -> Result<String> {
        let mut conversation = Conversation::from_user(message);
        self.run(&mut conversation).await?;
        Ok(conversation
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default())
    }
}
