//! IAM access-token exchange for hosted watsonx runtimes.
//!
//! Tokens stay valid for an hour; they are cached on disk and reused while
//! fresh so repeated completions do not hit the identity endpoint.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde_json::Value;

pub const DEFAULT_TOKEN_URL: &str = "https://iam.cloud.ibm.com/identity/token";

const TOKEN_TTL: Duration = Duration::from_secs(3600);

pub struct TokenSource {
    client: Client,
    token_url: String,
    cache_path: PathBuf,
}

impl TokenSource {
    pub fn new<S: Into<String>>(token_url: S) -> Self {
        let cache_path = std::env::temp_dir().join("courier-iam-token");
        Self::with_cache_path(token_url, cache_path)
    }

    pub fn with_cache_path<S: Into<String>>(token_url: S, cache_path: PathBuf) -> Self {
        Self {
            client: Client::new(),
            token_url: token_url.into(),
            cache_path,
        }
    }

    /// Exchange the api key for a bearer token, reusing the cached one when fresh
    pub async fn access_token(&self, api_key: &str) -> Result<String> {
        if let Some(token) = self.cached() {
            tracing::debug!("Retrieved cached token");
            return Ok(token);
        }

        let response = self
            .client
            .post(&self.token_url)
            .header("accept", "application/json")
            .form(&[
                ("grant_type", "urn:ibm:params:oauth:grant-type:apikey"),
                ("apikey", api_key),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to get access token: {}", response.status()));
        }

        let data: Value = response.json().await?;
        let token = data
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("No access_token in token response"))?;

        if let Err(e) = std::fs::write(&self.cache_path, token) {
            tracing::debug!("Could not cache token: {}", e);
        }
        tracing::debug!("Retrieved new token");
        Ok(token.to_string())
    }

    fn cached(&self) -> Option<String> {
        let modified = std::fs::metadata(&self.cache_path).ok()?.modified().ok()?;
        let age = SystemTime::now().duration_since(modified).ok()?;
        if age < TOKEN_TTL {
            std::fs::read_to_string(&self.cache_path).ok()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_token_exchange() -> Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/identity/token"))
            .and(body_string_contains("apikey=secret"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok-1"})),
            )
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir()?;
        let source = TokenSource::with_cache_path(
            format!("{}/identity/token", mock_server.uri()),
            dir.path().join("token"),
        );

        let token = source.access_token("secret").await?;
        assert_eq!(token, "tok-1");
        Ok(())
    }

    #[tokio::test]
    async fn test_fresh_token_is_served_from_cache() -> Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/identity/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok-1"})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir()?;
        let source = TokenSource::with_cache_path(
            format!("{}/identity/token", mock_server.uri()),
            dir.path().join("token"),
        );

        let first = source.access_token("secret").await?;
        let second = source.access_token("secret").await?;
        assert_eq!(first, second);
        Ok(())
    }

    #[tokio::test]
    async fn test_token_endpoint_failure() -> Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/identity/token"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir()?;
        let source = TokenSource::with_cache_path(
            format!("{}/identity/token", mock_server.uri()),
            dir.path().join("token"),
        );

        let result = source.access_token("secret").await;
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to get access token"));
        Ok(())
    }
}
