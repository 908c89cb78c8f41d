//! The outbound SSE protocol.
//!
//! Every frame carries the same envelope fields regardless of which
//! upstream runtime produced the event: a fresh `id` per frame, an
//! `object` discriminator, the caller-supplied `thread_id`, the upstream
//! `model` identifier, a `created` timestamp and a single choice delta.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::events::AgentEvent;

pub const OBJECT_MESSAGE_DELTA: &str = "thread.message.delta";
pub const OBJECT_RUN_STEP_DELTA: &str = "thread.run.step.delta";

#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub thread_id: String,
    pub model: String,
    pub choices: Vec<ChoiceDelta>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChoiceDelta {
    pub delta: Delta,
}

#[derive(Debug, Clone, Serialize)]
pub struct Delta {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_details: Option<StepDetails>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepDetails {
    ToolCalls { tool_calls: Vec<ToolCallSpec> },
    ToolResponse {
        name: String,
        tool_call_id: String,
        content: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolCallSpec {
    pub id: String,
    pub name: String,
    pub args: Value,
}

impl Envelope {
    fn new(object: &str, thread_id: &str, model: &str, delta: Delta) -> Self {
        Envelope {
            id: Uuid::new_v4().to_string(),
            object: object.to_string(),
            created: Utc::now().timestamp(),
            thread_id: thread_id.to_string(),
            model: model.to_string(),
            choices: vec![ChoiceDelta { delta }],
        }
    }

    /// Frame for an incremental fragment of assistant text
    pub fn message_delta(thread_id: &str, model: &str, content: &str) -> Self {
        Envelope::new(
            OBJECT_MESSAGE_DELTA,
            thread_id,
            model,
            Delta {
                role: "assistant".to_string(),
                content: Some(content.to_string()),
                step_details: None,
            },
        )
    }

    /// Frame announcing one or more tool invocations
    pub fn tool_calls(thread_id: &str, model: &str, tool_calls: Vec<ToolCallSpec>) -> Self {
        Envelope::new(
            OBJECT_RUN_STEP_DELTA,
            thread_id,
            model,
            Delta {
                role: "assistant".to_string(),
                content: None,
                step_details: Some(StepDetails::ToolCalls { tool_calls }),
            },
        )
    }

    /// Frame carrying the output of a finished tool invocation
    pub fn tool_response(
        thread_id: &str,
        model: &str,
        name: &str,
        tool_call_id: &str,
        content: &str,
    ) -> Self {
        Envelope::new(
            OBJECT_RUN_STEP_DELTA,
            thread_id,
            model,
            Delta {
                role: "assistant".to_string(),
                content: None,
                step_details: Some(StepDetails::ToolResponse {
                    name: name.to_string(),
                    tool_call_id: tool_call_id.to_string(),
                    content: content.to_string(),
                }),
            },
        )
    }

    /// Translate one upstream event into its frame, if the protocol has one.
    ///
    /// Final messages produce no frame; they only feed the synchronous path.
    pub fn from_event(event: AgentEvent, thread_id: &str, model: &str) -> Option<Self> {
        match event {
            AgentEvent::MessageDelta(content) => {
                Some(Envelope::message_delta(thread_id, model, &content))
            }
            AgentEvent::ToolCallStart { id, name, args } => Some(Envelope::tool_calls(
                thread_id,
                model,
                vec![ToolCallSpec { id, name, args }],
            )),
            AgentEvent::ToolResult {
                tool_call_id,
                name,
                content,
            } => Some(Envelope::tool_response(
                thread_id,
                model,
                &name,
                &tool_call_id,
                &content,
            )),
            AgentEvent::FinalMessage(_) => None,
        }
    }

    /// Encode as a single SSE frame
    pub fn encode(&self) -> String {
        let body = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("data: {}\n\n", body)
    }
}
