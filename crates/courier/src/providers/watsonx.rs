use anyhow::{anyhow, Result};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{CompletionEvent, CompletionStream, Provider, Usage};
use super::configs::WatsonxProviderConfig;
use super::iam::TokenSource;
use super::utils::{
    messages_to_openai_spec, openai_response_to_message, tools_to_openai_spec,
    usage_from_response, CompletionAccumulator,
};
use crate::models::message::Message;
use crate::models::tool::Tool;

/// API version date sent with every request
pub const WATSONX_API_VERSION: &str = "2024-05-31";

pub struct WatsonxProvider {
    client: Client,
    config: WatsonxProviderConfig,
    tokens: TokenSource,
}

impl WatsonxProvider {
    pub fn new(config: WatsonxProviderConfig) -> Result<Self> {
        if config.project_id.is_none() && config.space_id.is_none() {
            return Err(anyhow!(
                "You must set either a project_id or a space_id for watsonx"
            ));
        }

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

    fn chat_url(&self, streaming: bool) -> String {
        let endpoint = if streaming {
            "chat_stream"
        } else {
            "chat"
        };
        format!(
            "{}/ml/v1/text/{}?version={}",
            self.config.url.trim_end_matches('/'),
            endpoint,
            WATSONX_API_VERSION
        )
    }

    fn build_payload(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<Value> {
        let system_message = json!({
            "role": "system",
            "content": system
        });

        let mut messages_array = vec![system_message];
        messages_array.extend(messages_to_openai_spec(messages));

        let mut payload = json!({
            "model_id": self.config.model,
            "messages": messages_array
        });
        let body = payload.as_object_mut().unwrap();

        if let Some(project_id) = &self.config.project_id {
            body.insert("project_id".to_string(), json!(project_id));
        } else if let Some(space_id) = &self.config.space_id {
            body.insert("space_id".to_string(), json!(space_id));
        }

        if !tools.is_empty() {
            body.insert("tools".to_string(), json!(tools_to_openai_spec(tools)?));
        }
        if let Some(temp) = self.config.temperature {
            body.insert("temperature".to_string(), json!(temp));
        }
        if let Some(tokens) = self.config.max_tokens {
            body.insert("max_tokens".to_string(), json!(tokens));
        }

        Ok(payload)
    }

    async fn post(&self, url: String, payload: &Value) -> Result<reqwest::Response> {
        let token = self.tokens.access_token(&self.config.api_key).await?;
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Request failed: {}", response.status()));
        }
        Ok(response)
    }
}

#[async_trait]
impl Provider for WatsonxProvider {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage)> {
        let payload = self.build_payload(system, messages, tools)?;
        let response = self.post(self.chat_url(false), &payload).await?;
        let body: Value = response.json().await?;

        if let Some(errors) = body.get("errors") {
            return Err(anyhow!("watsonx API error: {}", errors));
        }

        let message = openai_response_to_message(body.clone())?;
        let usage = usage_from_response(&body);

        Ok((message, usage))
    }

    async fn complete_stream(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<CompletionStream> {
        let payload = self.build_payload(system, messages, tools)?;
        let response = self.post(self.chat_url(true), &payload).await?;

        let mut events = response.bytes_stream().eventsource();

        let stream = async_stream::try_stream! {
            let mut accumulator = CompletionAccumulator::new();
            let mut usage = Usage::new(None, None, None);

            while let Some(event) = events.next().await {
                let event = event.map_err(|e| anyhow!("Event stream error: {}", e))?;
                if event.data.is_empty() || event.data == "[DONE]" {
                    if event.data == "[DONE]" {
                        break;
                    }
                    continue;
                }
                let chunk: Value = serde_json::from_str(&event.data)?;
                if chunk.get("usage").is_some() {
                    usage = usage_from_response(&chunk);
                }
                if let Some(delta) = accumulator.push(&chunk) {
                    yield CompletionEvent::Delta(delta);
                }
            }

            yield CompletionEvent::Completed {
                message: accumulator.finish(),
                usage,
            };
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_token_endpoint(mock_server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/identity/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok-1"})),
            )
            .mount(mock_server)
            .await;
    }

    fn test_config(uri: String) -> WatsonxProviderConfig {
        WatsonxProviderConfig {
            url: uri.clone(),
            api_key: "test_api_key".to_string(),
            project_id: Some("project-1".to_string()),
            space_id: None,
            token_url: format!("{}/identity/token", uri),
            model: "mistralai/mistral-large".to_string(),
            temperature: Some(0.0),
            max_tokens: None,
        }
    }

    #[test]
    fn test_scope_is_required() {
        let mut config = test_config("http://localhost".to_string());
        config.project_id = None;
        config.space_id = None;

        let result = WatsonxProvider::new(config);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_complete_basic() -> Result<()> {
        let mock_server = MockServer::start().await;
        mock_token_endpoint(&mock_server).await;
        Mock::given(method("POST"))
            .and(path("/ml/v1/text/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "index": 0,
                    "message": {
                        "role": "assistant",
                        "content": "Hello from watsonx"
                    },
                    "finish_reason": "stop"
                }],
                "usage": {
                    "prompt_tokens": 5,
                    "completion_tokens": 4,
                    "total_tokens": 9
                }
            })))
            .mount(&mock_server)
            .await;

        let provider = WatsonxProvider::new(test_config(mock_server.uri()))?;
        let messages = vec![Message::user().with_text("Hello?")];
        let (message, usage) = provider
            .complete("You are a helpful assistant.", &messages, &[])
            .await?;

        assert_eq!(message.text(), "Hello from watsonx");
        assert_eq!(usage.total_tokens, Some(9));
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_surfaces_api_errors() -> Result<()> {
        let mock_server = MockServer::start().await;
        mock_token_endpoint(&mock_server).await;
        Mock::given(method("POST"))
            .and(path("/ml/v1/text/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": [{"code": "model_not_supported", "message": "no such model"}]
            })))
            .mount(&mock_server)
            .await;

        let provider = WatsonxProvider::new(test_config(mock_server.uri()))?;
        let messages = vec![Message::user().with_text("Hello?")];
        let result = provider
            .complete("You are a helpful assistant.", &messages, &[])
            .await;

        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("model_not_supported"));
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_stream_deltas() -> Result<()> {
        let sse_body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"Gran\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ite\"}}]}\n\n",
            "data: [DONE]\n\n",
        );

        let mock_server = MockServer::start().await;
        mock_token_endpoint(&mock_server).await;
        Mock::given(method("POST"))
            .and(path("/ml/v1/text/chat_stream"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body, "text/event-stream"))
            .mount(&mock_server)
            .await;

        let provider = WatsonxProvider::new(test_config(mock_server.uri()))?;
        let messages = vec![Message::user().with_text("Hello?")];
        let mut stream = provider
            .complete_stream("You are a helpful assistant.", &messages, &[])
            .await?;

        let mut deltas = Vec::new();
        let mut final_text = None;
        while let Some(event) = stream.next().await {
            match event? {
                CompletionEvent::Delta(delta) => deltas.push(delta),
                CompletionEvent::Completed { message, .. } => final_text = Some(message.text()),
            }
        }

        assert_eq!(deltas, vec!["Gran".to_string(), "ite".to_string()]);
        assert_eq!(final_text.as_deref(), Some("Granite"));
        Ok(())
    }
}
