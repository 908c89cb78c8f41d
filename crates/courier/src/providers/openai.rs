use anyhow::{anyhow, Result};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{CompletionEvent, CompletionStream, Provider, Usage};
use super::configs::OpenAiProviderConfig;
use super::utils::{
    check_context_length_error, messages_to_openai_spec, openai_response_to_message,
    tools_to_openai_spec, usage_from_response, CompletionAccumulator,
};
use crate::models::message::Message;
use crate::models::tool::Tool;

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
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

        let messages_spec = messages_to_openai_spec(messages);
        let tools_spec = if !tools.is_empty() {
            tools_to_openai_spec(tools)?
        } else {
            vec![]
        };

        // create messages array with system message first
        let mut messages_array = vec![system_message];
        messages_array.extend(messages_spec);

        let mut payload = json!({
            "model": self.config.model,
            "messages": messages_array
        });

        if !tools_spec.is_empty() {
            payload
                .as_object_mut()
                .unwrap()
                .insert("tools".to_string(), json!(tools_spec));
        }
        if let Some(temp) = self.config.temperature {
            payload
                .as_object_mut()
                .unwrap()
                .insert("temperature".to_string(), json!(temp));
        }
        if let Some(tokens) = self.config.max_tokens {
            payload
                .as_object_mut()
                .unwrap()
                .insert("max_tokens".to_string(), json!(tokens));
        }

        Ok(payload)
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        )
    }

    async fn post(&self, payload: Value) -> Result<Value> {
        let response = self
            .client
            .post(self.completions_url())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&payload)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                Err(anyhow!("Server error: {}", status))
            }
            _ => Err(anyhow!(
                "Request failed: {}\nPayload: {}",
                response.status(),
                payload
            )),
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage)> {
        let payload = self.build_payload(system, messages, tools)?;
        let response = self.post(payload).await?;

        // Raise specific error if context length is exceeded
        if let Some(error) = response.get("error") {
            if let Some(err) = check_context_length_error(error) {
                return Err(err.into());
            }
            return Err(anyhow!("API error: {}", error));
        }

        let message = openai_response_to_message(response.clone())?;
        let usage = usage_from_response(&response);

        Ok((message, usage))
    }

    async fn complete_stream(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<CompletionStream> {
        let mut payload = self.build_payload(system, messages, tools)?;
        payload
            .as_object_mut()
            .unwrap()
            .insert("stream".to_string(), json!(true));

        let response = self
            .client
            .post(self.completions_url())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Request failed: {}", response.status()));
        }

        let mut events = response.bytes_stream().eventsource();

        let stream = async_stream::try_stream! {
            let mut accumulator = CompletionAccumulator::new();
            let mut usage = Usage::new(None, None, None);

            while let Some(event) = events.next().await {
                let event = event.map_err(|e| anyhow!("Event stream error: {}", e))?;
                if event.data == "[DONE]" {
                    break;
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
    use crate::models::message::MessageContent;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(host: String) -> OpenAiProviderConfig {
        OpenAiProviderConfig {
            host,
            api_key: "test_api_key".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: Some(0.7),
            max_tokens: None,
        }
    }

    async fn setup_mock_server(response_body: Value) -> (MockServer, OpenAiProvider) {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(response_body))
            .mount(&mock_server)
            .await;

        let provider = OpenAiProvider::new(test_config(mock_server.uri())).unwrap();
        (mock_server, provider)
    }

    #[tokio::test]
    async fn test_complete_basic() -> Result<()> {
        let response_body = json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "Hello! How can I assist you today?",
                    "tool_calls": null
                },
                "finish_reason": "stop"
            }],
            "usage": {
                "prompt_tokens": 12,
                "completion_tokens": 15,
                "total_tokens": 27
            }
        });

        let (_, provider) = setup_mock_server(response_body).await;

        let messages = vec![Message::user().with_text("Hello?")];
        let (message, usage) = provider
            .complete("You are a helpful assistant.", &messages, &[])
            .await?;

        assert_eq!(message.text(), "Hello! How can I assist you today?");
        assert_eq!(usage.input_tokens, Some(12));
        assert_eq!(usage.output_tokens, Some(15));
        assert_eq!(usage.total_tokens, Some(27));

        Ok(())
    }

    #[tokio::test]
    async fn test_complete_tool_request() -> Result<()> {
        let response_body = json!({
            "id": "chatcmpl-tool",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_123",
                        "type": "function",
                        "function": {
                            "name": "web_search",
                            "arguments": "{\"search_phrase\":\"rust streams\"}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {
                "prompt_tokens": 20,
                "completion_tokens": 15,
                "total_tokens": 35
            }
        });

        let (_, provider) = setup_mock_server(response_body).await;

        let messages = vec![Message::user().with_text("Look up rust streams")];
        let tool = Tool::new(
            "web_search",
            "Search the web",
            json!({
                "type": "object",
                "properties": {
                    "search_phrase": {
                        "type": "string",
                        "description": "The phrase to search for"
                    }
                },
                "required": ["search_phrase"]
            }),
        );

        let (message, usage) = provider
            .complete("You are a helpful assistant.", &messages, &[tool])
            .await?;

        if let MessageContent::ToolRequest(tool_request) = &message.content[0] {
            let tool_call = tool_request.tool_call.as_ref().unwrap();
            assert_eq!(tool_call.name, "web_search");
            assert_eq!(tool_call.arguments, json!({"search_phrase": "rust streams"}));
        } else {
            panic!("Expected ToolRequest content");
        }

        assert_eq!(usage.total_tokens, Some(35));

        Ok(())
    }

    #[tokio::test]
    async fn test_server_error() -> Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let provider = OpenAiProvider::new(test_config(mock_server.uri()))?;
        let messages = vec![Message::user().with_text("Hello?")];
        let result = provider
            .complete("You are a helpful assistant.", &messages, &[])
            .await;

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Server error: 500"));

        Ok(())
    }

    #[tokio::test]
    async fn test_complete_stream_deltas_and_final_message() -> Result<()> {
        let sse_body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"Hello\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        );

        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body, "text/event-stream"))
            .mount(&mock_server)
            .await;

        let provider = OpenAiProvider::new(test_config(mock_server.uri()))?;
        let messages = vec![Message::user().with_text("Hello?")];
        let mut stream = provider
            .complete_stream("You are a helpful assistant.", &messages, &[])
            .await?;

        let mut deltas = Vec::new();
        let mut final_message = None;
        while let Some(event) = stream.next().await {
            match event? {
                CompletionEvent::Delta(delta) => deltas.push(delta),
                CompletionEvent::Completed { message, .. } => final_message = Some(message),
            }
        }

        assert_eq!(deltas, vec!["Hello".to_string(), " world".to_string()]);
        assert_eq!(final_message.unwrap().text(), "Hello world");

        Ok(())
    }

    #[tokio::test]
    async fn test_complete_stream_assembles_tool_calls() -> Result<()> {
        let sse_body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"function\":{\"name\":\"web_search\",\"arguments\":\"{\\\"search_\"}}]}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"phrase\\\": \\\"rust\\\"}\"}}]}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\n",
            "data: [DONE]\n\n",
        );

        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body, "text/event-stream"))
            .mount(&mock_server)
            .await;

        let provider = OpenAiProvider::new(test_config(mock_server.uri()))?;
        let messages = vec![Message::user().with_text("Look something up")];
        let mut stream = provider
            .complete_stream("You are a helpful assistant.", &messages, &[])
            .await?;

        let mut deltas = Vec::new();
        let mut final_message = None;
        while let Some(event) = stream.next().await {
            match event? {
                CompletionEvent::Delta(delta) => deltas.push(delta),
                CompletionEvent::Completed { message, .. } => final_message = Some(message),
            }
        }

        assert!(deltas.is_empty());
        let message = final_message.unwrap();
        let request = message.content[0].as_tool_request().unwrap();
        assert_eq!(request.id, "call_1");
        let call = request.tool_call.as_ref().unwrap();
        assert_eq!(call.name, "web_search");
        assert_eq!(call.arguments, json!({"search_phrase": "rust"}));

        Ok(())
    }
}
