//! The inbound chat-completions wire format.
//!
//! Requests arrive in an openai-compatible shape with an optional
//! `extra_body.thread_id` correlation field. Incoming messages are
//! converted into the internal model immediately; responses for the
//! non-streaming path are built here as well.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::message::Message;
use crate::models::tool::ToolCall;

/// Longest message content accepted before truncation
pub const MAX_CONTENT_CHARS: usize = 50_000;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub context: Option<Value>,
    pub messages: Vec<WireMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub extra_body: Option<ExtraBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtraBody {
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireToolCall {
    pub id: String,
    pub function: WireFunction,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFunction {
    pub name: String,
    pub arguments: Value,
}

/// Convert incoming wire messages to the internal Message type
pub fn to_messages(incoming: &[WireMessage]) -> Vec<Message> {
    let mut messages = Vec::new();

    for msg in incoming {
        let content = truncate(msg.content.as_deref().unwrap_or(""));
        match msg.role.to_lowercase().as_str() {
            "user" | "human" => {
                messages.push(Message::user().with_text(content));
            }
            "system" => {
                messages.push(Message::system().with_text(content));
            }
            "assistant" => {
                let mut message = Message::assistant();
                if !content.is_empty() {
                    message = message.with_text(content);
                }
                if let Some(tool_calls) = &msg.tool_calls {
                    for call in tool_calls {
                        message = message.with_tool_request(
                            call.id.clone(),
                            Ok(ToolCall::new(
                                &call.function.name,
                                call.function.arguments.clone(),
                            )),
                        );
                    }
                }
                messages.push(message);
            }
            "tool" => {
                let id = msg.tool_call_id.clone().unwrap_or_default();
                messages.push(Message::tool().with_tool_response(
                    id,
                    msg.name.clone(),
                    Ok(content),
                ));
            }
            other => {
                tracing::warn!("Unknown role: {}", other);
            }
        }
    }

    repair_history(&mut messages);
    messages
}

/// Append placeholder responses for assistant tool calls that never got one,
/// so the upstream model is not handed a dangling request.
fn repair_history(messages: &mut Vec<Message>) {
    let mut pending: Vec<String> = Vec::new();

    for message in messages.iter() {
        for content in &message.content {
            if let Some(request) = content.as_tool_request() {
                pending.push(request.id.clone());
            }
        }
    }

    for message in messages.iter() {
        for content in &message.content {
            if let Some(response) = content.as_tool_response() {
                pending.retain(|id| id != &response.id);
            }
        }
    }

    for id in pending {
        tracing::info!("Fixing input that had no tool response for tool_call_id {}", id);
        messages.push(Message::tool().with_tool_response(
            id,
            None,
            Ok("Tool call failed or no response received.".to_string()),
        ));
    }
}

fn truncate(content: &str) -> String {
    if content.chars().count() <= MAX_CONTENT_CHARS {
        return content.to_string();
    }
    content.chars().take(MAX_CONTENT_CHARS).collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Choice {
    pub index: u32,
    pub message: MessageResponse,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub role: String,
    pub content: String,
}

impl ChatCompletionResponse {
    /// Final answer for the non-streaming path
    pub fn completion(model: &str, content: &str) -> Self {
        ChatCompletionResponse {
            id: Uuid::new_v4().to_string(),
            object: "chat.completion".to_string(),
            created: Utc::now().timestamp(),
            model: model.to_string(),
            choices: vec![Choice {
                index: 0,
                message: MessageResponse {
                    role: "assistant".to_string(),
                    content: content.to_string(),
                },
                finish_reason: Some("stop".to_string()),
            }],
        }
    }
}
