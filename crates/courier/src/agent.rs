use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;

use crate::backend::Backend;
use crate::errors::{AgentError, AgentResult};
use crate::events::{AgentEvent, AgentEventStream};
use crate::models::message::{Message, ToolRequest};
use crate::models::tool::{Tool, ToolCall};
use crate::providers::base::{CompletionEvent, Provider};
use crate::toolkits::Toolkit;

/// Upper bound on provider round-trips within a single reply
const MAX_TOOL_ROUNDS: usize = 25;

/// Agent drives a chat-model provider and the local toolkits, reducing the
/// run to normalized events
pub struct Agent {
    toolkits: Vec<Box<dyn Toolkit>>,
    provider: Box<dyn Provider + Send + Sync>,
    model: String,
}

impl Agent {
    /// Create a new Agent with the specified provider
    pub fn new(provider: Box<dyn Provider + Send + Sync>, model: impl Into<String>) -> Self {
        Self {
            toolkits: Vec::new(),
            provider,
            model: model.into(),
        }
    }

    /// Add a toolkit to the agent
    pub fn add_toolkit(&mut self, toolkit: Box<dyn Toolkit>) {
        self.toolkits.push(toolkit);
    }

    /// Get all tools from all toolkits with proper toolkit prefixing
    fn get_prefixed_tools(&self) -> Vec<Tool> {
        let mut tools = Vec::new();
        for toolkit in &self.toolkits {
            for tool in toolkit.tools() {
                tools.push(Tool::new(
                    format!("{}__{}", toolkit.name(), tool.name),
                    &tool.description,
                    tool.parameters.clone(),
                ));
            }
        }
        tools
    }

    /// Find the appropriate toolkit for a tool call based on the prefixed name
    fn get_toolkit_for_tool(&self, prefixed_name: &str) -> Option<&dyn Toolkit> {
        let parts: Vec<&str> = prefixed_name.split("__").collect();
        if parts.len() != 2 {
            return None;
        }
        let toolkit_name = parts[0];
        self.toolkits
            .iter()
            .find(|toolkit| toolkit.name() == toolkit_name)
            .map(|v| &**v)
    }

    /// Dispatch a single tool call to the appropriate toolkit
    async fn dispatch_tool_call(&self, tool_call: AgentResult<ToolCall>) -> AgentResult<String> {
        let call = tool_call?;
        let toolkit = self
            .get_toolkit_for_tool(&call.name)
            .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;

        let tool_name = call
            .name
            .split("__")
            .nth(1)
            .ok_or_else(|| AgentError::InvalidParameters(call.name.clone()))?;
        let toolkit_tool_call = ToolCall::new(tool_name, call.arguments);

        toolkit.call(toolkit_tool_call).await
    }

    fn get_system_prompt(&self) -> String {
        let mut prompt =
            String::from("You are a helpful assistant answering on behalf of an orchestrated agent.");
        for toolkit in &self.toolkits {
            prompt.push_str(&format!(
                "\n\nYou can use the {} tools: {}. {}",
                toolkit.name(),
                toolkit.description(),
                toolkit.instructions()
            ));
        }
        prompt
    }

    fn tool_requests(response: &Message) -> Vec<ToolRequest> {
        response
            .content
            .iter()
            .filter_map(|content| content.as_tool_request())
            .cloned()
            .collect()
    }

    /// Create a stream of normalized events as the agent works through the
    /// conversation: text deltas while the model streams, then a tool call
    /// and its result for every dispatched tool, until the model answers
    /// without requesting tools.
    pub async fn reply(&self, messages: &[Message]) -> Result<AgentEventStream<'_>> {
        let mut messages = messages.to_vec();
        let tools = self.get_prefixed_tools();
        let system_prompt = self.get_system_prompt();

        Ok(Box::pin(async_stream::try_stream! {
            let mut rounds = 0;
            loop {
                rounds += 1;
                if rounds > MAX_TOOL_ROUNDS {
                    Err::<(), anyhow::Error>(anyhow!(
                        "Agent exceeded {} tool rounds",
                        MAX_TOOL_ROUNDS
                    ))?;
                }

                let mut completion = self
                    .provider
                    .complete_stream(&system_prompt, &messages, &tools)
                    .await?;

                let mut response = None;
                while let Some(event) = completion.next().await {
                    match event? {
                        CompletionEvent::Delta(delta) => {
                            yield AgentEvent::MessageDelta(delta);
                        }
                        CompletionEvent::Completed { message, .. } => {
                            response = Some(message);
                        }
                    }
                }
                let response = response
                    .ok_or_else(|| anyhow!("Provider stream ended without a completed message"))?;

                let tool_requests = Self::tool_requests(&response);
                if tool_requests.is_empty() {
                    yield AgentEvent::FinalMessage(response.text());
                    break;
                }

                messages.push(response.clone());

                let mut tool_responses = Message::tool();
                for request in tool_requests {
                    let (name, args) = match &request.tool_call {
                        Ok(call) => (call.name.clone(), call.arguments.clone()),
                        // an invalid call still gets announced so its error
                        // response can be matched up by the client
                        Err(_) => ("invalid name".to_string(), json!({})),
                    };

                    yield AgentEvent::ToolCallStart {
                        id: request.id.clone(),
                        name: name.clone(),
                        args,
                    };

                    let output = self.dispatch_tool_call(request.tool_call.clone()).await;
                    let content = match &output {
                        Ok(text) => text.clone(),
                        Err(e) => format!("Error: {}", e),
                    };

                    yield AgentEvent::ToolResult {
                        tool_call_id: request.id.clone(),
                        name: name.clone(),
                        content,
                    };

                    tool_responses =
                        tool_responses.with_tool_response(request.id, Some(name), output);
                }
                messages.push(tool_responses);
            }
        }))
    }

    /// Run the same loop without streaming and return the final assistant message
    pub async fn reply_sync(&self, messages: &[Message]) -> Result<Message> {
        let mut messages = messages.to_vec();
        let tools = self.get_prefixed_tools();
        let system_prompt = self.get_system_prompt();

        let mut rounds = 0;
        loop {
            rounds += 1;
            if rounds > MAX_TOOL_ROUNDS {
                return Err(anyhow!("Agent exceeded {} tool rounds", MAX_TOOL_ROUNDS));
            }

            let (response, _) = self
                .provider
                .complete(&system_prompt, &messages, &tools)
                .await?;

            let tool_requests = Self::tool_requests(&response);
            if tool_requests.is_empty() {
                return Ok(response);
            }

            messages.push(response.clone());

            let mut tool_responses = Message::tool();
            for request in tool_requests {
                let name = request
                    .tool_call
                    .as_ref()
                    .ok()
                    .map(|call| call.name.clone());
                let output = self.dispatch_tool_call(request.tool_call.clone()).await;
                tool_responses = tool_responses.with_tool_response(request.id, name, output);
            }
            messages.push(tool_responses);
        }
    }
}

#[async_trait]
impl Backend for Agent {
    fn model(&self) -> &str {
        &self.model
    }

    async fn reply_sync(&self, messages: &[Message]) -> Result<Message> {
        Agent::reply_sync(self, messages).await
    }

    async fn reply_stream<'a>(&'a self, messages: &[Message]) -> Result<AgentEventStream<'a>> {
        self.reply(messages).await
    }
}
