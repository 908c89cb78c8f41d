use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::models::message::Message;
use crate::models::tool::Tool;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

/// One step of a live completion: text deltas while the model writes, then
/// the assembled message once the turn is finished.
#[derive(Debug, Clone)]
pub enum CompletionEvent {
    Delta(String),
    Completed { message: Message, usage: Usage },
}

pub type CompletionStream = BoxStream<'static, Result<CompletionEvent>>;

/// Base trait for chat-model providers driven by the agent loop
#[async_trait]
pub trait Provider: Send + Sync {
    /// Generate the next message for the conversation
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage)>;

    /// Stream the next message, yielding text deltas as the model produces
    /// them and ending with the fully assembled message
    async fn complete_stream(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<CompletionStream>;
}
