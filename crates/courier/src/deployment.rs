//! Client for a hosted AI-service deployment that runs the agent remotely.
//!
//! The adapter forwards the conversation as-is and passes the deployment's
//! token stream through as message deltas. Tool execution happens inside
//! the deployment; chunks that are not assistant deltas are skipped.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::backend::Backend;
use crate::events::{AgentEvent, AgentEventStream};
use crate::models::message::Message;
use crate::models::role::Role;
use crate::providers::iam::TokenSource;

/// API version date sent with every request
pub const DEPLOYMENT_API_VERSION: &str = "2024-05-31";

#[derive(Debug, Clone)]
pub struct DeploymentConfig {
    pub url: String,
    pub deployment_id: String,
    pub api_key: String,
    pub token_url: String,
    /// Label reported in outbound frames; the deployment itself decides
    /// which model actually runs
    pub model: String,
}

pub struct DeploymentClient {
    client: Client,
    config: DeploymentConfig,
    tokens: TokenSource,
}

impl DeploymentClient {
    pub fn new(config: DeploymentConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;
        let tokens = TokenSource::new(config.token_url.clone());

        Ok(Self {
            client,
            config,
            tokens,
        })
    }

    fn service_url(&self, streaming: bool) -> String {
        let suffix = if streaming { "_stream" } else { "" };
        format!(
            "{}/ml/v4/deployments/{}/ai_service{}?version={}",
            self.config.url.trim_end_matches('/'),
            self.config.deployment_id,
            suffix,
            DEPLOYMENT_API_VERSION
        )
    }

    /// The deployment owns its own system prompt, so system messages are
    /// not forwarded
    fn build_payload(messages: &[Message]) -> Value {
        let wire: Vec<Value> = messages
            .iter()
            .filter(|message| message.role != Role::System)
            .map(|message| {
                json!({
                    "role": message.role,
                    "content": message.text(),
                })
            })
            .collect();
        json!({ "messages": wire })
    }

    async fn post(&self, streaming: bool, payload: &Value) -> Result<reqwest::Response> {
        let token = self.tokens.access_token(&self.config.api_key).await?;
        let response = self
            .client
            .post(self.service_url(streaming))
            .bearer_auth(token)
            .json(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("AI service request failed: {}", response.status()));
        }
        Ok(response)
    }
}

#[async_trait]
impl Backend for DeploymentClient {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn reply_sync(&self, messages: &[Message]) -> Result<Message> {
        let payload = Self::build_payload(messages);
        tracing::info!("AI service synchronous call");
        let response = self.post(false, &payload).await?;
        let body: Value = response.json().await?;

        if let Some(error) = body.get("error") {
            return Err(anyhow!("Got an error from the AI service: {}", error));
        }

        let content = body
            .get("choices")
            .and_then(|choices| choices.as_array())
            .and_then(|choices| choices.last())
            .and_then(|choice| choice["message"]["content"].as_str())
            .ok_or_else(|| anyhow!("No assistant message in AI service response"))?;

        Ok(Message::assistant().with_text(content))
    }

    async fn reply_stream<'a>(&'a self, messages: &[Message]) -> Result<AgentEventStream<'a>> {
        let payload = Self::build_payload(messages);
        tracing::info!("AI service streaming call");
        let response = self.post(true, &payload).await?;

        let mut events = response.bytes_stream().eventsource();

        Ok(Box::pin(async_stream::try_stream! {
            let mut full = String::new();

            while let Some(event) = events.next().await {
                let event = event.map_err(|e| anyhow!("Event stream error: {}", e))?;
                if event.data.is_empty() || event.data == "[DONE]" {
                    if event.data == "[DONE]" {
                        break;
                    }
                    continue;
                }

                let chunk: Value = serde_json::from_str(&event.data)?;
                let message = &chunk["choices"][0]["message"];

                // the stream interleaves tool traffic; only assistant deltas
                // are forwarded to the client
                if message.get("role").and_then(|v| v.as_str()) != Some("assistant") {
                    continue;
                }
                let delta = match message.get("delta").and_then(|v| v.as_str()) {
                    Some(delta) => delta,
                    None => continue,
                };

                full.push_str(delta);
                yield AgentEvent::MessageDelta(delta.to_string());
            }

            if !full.is_empty() {
                yield AgentEvent::FinalMessage(full);
            }
        }))
    }
}
