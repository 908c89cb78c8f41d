use anyhow::Result;
use async_trait::async_trait;

use crate::agent::Agent;
use crate::deployment::{DeploymentClient, DeploymentConfig};
use crate::events::AgentEventStream;
use crate::models::message::Message;
use crate::providers::configs::ProviderConfig;
use crate::providers::factory;
use crate::toolkits::search::SearchToolkit;

/// An upstream runtime the adapter can forward a conversation to
#[async_trait]
pub trait Backend: Send + Sync {
    /// Model identifier reported in outbound frames
    fn model(&self) -> &str;

    /// Run the conversation to completion and return the final assistant message
    async fn reply_sync(&self, messages: &[Message]) -> Result<Message>;

    /// Run the conversation, yielding normalized events as they arrive
    async fn reply_stream<'a>(&'a self, messages: &[Message]) -> Result<AgentEventStream<'a>>;
}

/// Configuration for any supported backend
#[derive(Debug, Clone)]
pub enum BackendConfig {
    /// A chat model driven through the local tool loop
    Provider(ProviderConfig),
    /// A hosted deployment that runs the agent remotely
    Deployment(DeploymentConfig),
}

impl BackendConfig {
    /// Override the model identifier, e.g. from the incoming request
    pub fn with_model(mut self, model: &str) -> Self {
        match &mut self {
            BackendConfig::Provider(config) => config.set_model(model),
            BackendConfig::Deployment(config) => config.model = model.to_string(),
        }
        self
    }
}

pub fn get_backend(config: BackendConfig) -> Result<Box<dyn Backend>> {
    match config {
        BackendConfig::Provider(provider_config) => {
            let model = provider_config.model().to_string();
            let provider = factory::get_provider(provider_config)?;
            let mut agent = Agent::new(provider, model);
            agent.add_toolkit(Box::new(SearchToolkit::new()));
            Ok(Box::new(agent))
        }
        BackendConfig::Deployment(deployment_config) => {
            Ok(Box::new(DeploymentClient::new(deployment_config)?))
        }
    }
}
