//! Web and news search over the DuckDuckGo instant-answer API.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::Toolkit;
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Tool, ToolCall};

pub const SEARCH_API_URL: &str = "https://api.duckduckgo.com";

/// How many related results are included beyond the abstract
const MAX_RESULTS: usize = 5;

pub struct SearchToolkit {
    client: Client,
    base_url: String,
    tools: Vec<Tool>,
}

impl SearchToolkit {
    pub fn new() -> Self {
        Self::with_base_url(SEARCH_API_URL)
    }

    pub fn with_base_url<S: Into<String>>(base_url: S) -> Self {
        let search_schema = json!({
            "type": "object",
            "required": ["search_phrase"],
            "properties": {
                "search_phrase": {
                    "type": "string",
                    "description": "The phrase to search for."
                }
            }
        });

        let tools = vec![
            Tool::new("web_search", "Search the web.", search_schema.clone()),
            Tool::new("news_search", "Search recent news.", search_schema),
        ];

        Self {
            client: Client::new(),
            base_url: base_url.into(),
            tools,
        }
    }

    async fn search(&self, params: Value, news: bool) -> AgentResult<String> {
        let phrase = params
            .get("search_phrase")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AgentError::InvalidParameters("search_phrase is required".to_string())
            })?;

        let mut query = vec![
            ("q", phrase.to_string()),
            ("format", "json".to_string()),
            ("no_html", "1".to_string()),
        ];
        if news {
            // bias towards results from the last week
            query.push(("df", "w".to_string()));
        }

        let response = self
            .client
            .get(format!("{}/", self.base_url.trim_end_matches('/')))
            .query(&query)
            .send()
            .await
            .map_err(|e| AgentError::ExecutionError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AgentError::ExecutionError(format!(
                "Search request failed: {}",
                response.status()
            )));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| AgentError::ExecutionError(e.to_string()))?;

        Ok(render_results(&data))
    }
}

impl Default for SearchToolkit {
    fn default() -> Self {
        Self::new()
    }
}

fn render_results(data: &Value) -> String {
    let mut lines = Vec::new();

    if let Some(abstract_text) = data.get("AbstractText").and_then(|v| v.as_str()) {
        if !abstract_text.is_empty() {
            lines.push(abstract_text.to_string());
        }
    }

    if let Some(topics) = data.get("RelatedTopics").and_then(|v| v.as_array()) {
        for topic in topics.iter().take(MAX_RESULTS) {
            if let Some(text) = topic.get("Text").and_then(|v| v.as_str()) {
                lines.push(format!("- {}", text));
            }
        }
    }

    if lines.is_empty() {
        "No results found.".to_string()
    } else {
        lines.join("\n")
    }
}

#[async_trait]
impl Toolkit for SearchToolkit {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Web and news search"
    }

    fn instructions(&self) -> &str {
        "Use web_search for general queries and news_search for current events."
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<String> {
        match tool_call.name.as_str() {
            "web_search" => self.search(tool_call.arguments, false).await,
            "news_search" => self.search(tool_call.arguments, true).await,
            _ => Err(AgentError::ToolNotFound(tool_call.name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_web_search_renders_results() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(query_param("q", "rust language"))
            .and(query_param("format", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "AbstractText": "Rust is a systems programming language.",
                "RelatedTopics": [
                    {"Text": "Rust (programming language)"},
                    {"Text": "Cargo package manager"}
                ]
            })))
            .mount(&mock_server)
            .await;

        let toolkit = SearchToolkit::with_base_url(mock_server.uri());
        let result = toolkit
            .call(ToolCall::new(
                "web_search",
                json!({"search_phrase": "rust language"}),
            ))
            .await
            .unwrap();

        assert!(result.contains("Rust is a systems programming language."));
        assert!(result.contains("- Rust (programming language)"));
        assert!(result.contains("- Cargo package manager"));
    }

    #[tokio::test]
    async fn test_news_search_requests_recent_results() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(query_param("df", "w"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "AbstractText": "",
                "RelatedTopics": []
            })))
            .mount(&mock_server)
            .await;

        let toolkit = SearchToolkit::with_base_url(mock_server.uri());
        let result = toolkit
            .call(ToolCall::new(
                "news_search",
                json!({"search_phrase": "today"}),
            ))
            .await
            .unwrap();

        assert_eq!(result, "No results found.");
    }

    #[tokio::test]
    async fn test_missing_search_phrase() {
        let toolkit = SearchToolkit::with_base_url("http://localhost:1");
        let result = toolkit.call(ToolCall::new("web_search", json!({}))).await;

        assert!(matches!(result, Err(AgentError::InvalidParameters(_))));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let toolkit = SearchToolkit::with_base_url("http://localhost:1");
        let result = toolkit.call(ToolCall::new("image_search", json!({}))).await;

        assert!(matches!(result, Err(AgentError::ToolNotFound(_))));
    }

    #[tokio::test]
    async fn test_upstream_failure_is_an_execution_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let toolkit = SearchToolkit::with_base_url(mock_server.uri());
        let result = toolkit
            .call(ToolCall::new("web_search", json!({"search_phrase": "x"})))
            .await;

        assert!(matches!(result, Err(AgentError::ExecutionError(_))));
    }
}
