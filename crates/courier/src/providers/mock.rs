use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::base::{CompletionEvent, CompletionStream, Provider, Usage};
use crate::models::message::Message;
use crate::models::tool::Tool;

/// A mock provider that returns scripted responses, for testing the agent loop.
///
/// In streaming mode each text content block of the scripted message is
/// yielded as one delta before the assembled message, so tests can assert
/// on token-level behavior.
pub struct MockProvider {
    responses: Mutex<VecDeque<Message>>,
}

impl MockProvider {
    pub fn new(responses: Vec<Message>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }

    fn next_response(&self) -> Result<Message> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("No more scripted responses"))
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(
        &self,
        _system: &str,
        _messages: &[Message],
        _tools: &[Tool],
    ) -> Result<(Message, Usage)> {
        Ok((self.next_response()?, Usage::new(None, None, None)))
    }

    async fn complete_stream(
        &self,
        _system: &str,
        _messages: &[Message],
        _tools: &[Tool],
    ) -> Result<CompletionStream> {
        let message = self.next_response()?;

        let mut events: Vec<Result<CompletionEvent>> = message
            .content
            .iter()
            .filter_map(|content| content.as_text())
            .map(|text| Ok(CompletionEvent::Delta(text.to_string())))
            .collect();
        events.push(Ok(CompletionEvent::Completed {
            message,
            usage: Usage::new(None, None, None),
        }));

        Ok(Box::pin(stream::iter(events)))
    }
}
