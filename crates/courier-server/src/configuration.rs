use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment};
use courier::backend::BackendConfig;
use courier::deployment::DeploymentConfig;
use courier::providers::configs::{OpenAiProviderConfig, ProviderConfig, WatsonxProviderConfig};
use courier::providers::iam::DEFAULT_TOKEN_URL;
use serde::Deserialize;
use std::net::SocketAddr;

#[derive(Debug, Default, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerSettings {
    pub fn socket_addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .expect("Failed to parse socket address")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum BackendSettings {
    OpenAi {
        #[serde(default = "default_openai_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_openai_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
    Watsonx {
        #[serde(default = "default_watsonx_url")]
        url: String,
        api_key: String,
        #[serde(default)]
        project_id: Option<String>,
        #[serde(default)]
        space_id: Option<String>,
        #[serde(default = "default_token_url")]
        token_url: String,
        #[serde(default = "default_watsonx_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
    Deployment {
        #[serde(default = "default_watsonx_url")]
        url: String,
        deployment_id: String,
        api_key: String,
        #[serde(default = "default_token_url")]
        token_url: String,
        #[serde(default = "default_deployment_model")]
        model: String,
    },
}

impl BackendSettings {
    // Convert to the courier BackendConfig
    pub fn into_config(self) -> BackendConfig {
        match self {
            BackendSettings::OpenAi {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => BackendConfig::Provider(ProviderConfig::OpenAi(OpenAiProviderConfig {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            })),
            BackendSettings::Watsonx {
                url,
                api_key,
                project_id,
                space_id,
                token_url,
                model,
                temperature,
                max_tokens,
            } => BackendConfig::Provider(ProviderConfig::Watsonx(WatsonxProviderConfig {
                url,
                api_key,
                project_id,
                space_id,
                token_url,
                model,
                temperature,
                max_tokens,
            })),
            BackendSettings::Deployment {
                url,
                deployment_id,
                api_key,
                token_url,
                model,
            } => BackendConfig::Deployment(DeploymentConfig {
                url,
                deployment_id,
                api_key,
                token_url,
                model,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub backend: BackendSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        // Start with default configuration
        let config = Config::builder()
            // Server defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix("COURIER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        // Try to deserialize the configuration
        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        // Handle missing field errors specially
        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                // Handle both NotFound and missing field message variants
                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    // Extract field name from error message "missing field `type`"
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches("`");
                    let env_var = to_env_var(field);
                    Err(ConfigError::MissingEnvVar { env_var })
                } else if let config::ConfigError::NotFound(field) = &err {
                    let env_var = to_env_var(field);
                    Err(ConfigError::MissingEnvVar { env_var })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_openai_host() -> String {
    "https://api.openai.com".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_watsonx_url() -> String {
    "https://us-south.ml.cloud.ibm.com".to_string()
}

fn default_watsonx_model() -> String {
    "mistralai/mistral-large".to_string()
}

fn default_deployment_model() -> String {
    "ai-service".to_string()
}

fn default_token_url() -> String {
    DEFAULT_TOKEN_URL.to_string()
}
