/// Unified enum to wrap different provider configurations
#[derive(Debug, Clone)]
pub enum ProviderConfig {
    OpenAi(OpenAiProviderConfig),
    Watsonx(WatsonxProviderConfig),
}

impl ProviderConfig {
    pub fn model(&self) -> &str {
        match self {
            ProviderConfig::OpenAi(config) => &config.model,
            ProviderConfig::Watsonx(config) => &config.model,
        }
    }

    pub fn set_model(&mut self, model: &str) {
        match self {
            ProviderConfig::OpenAi(config) => config.model = model.to_string(),
            ProviderConfig::Watsonx(config) => config.model = model.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct WatsonxProviderConfig {
    pub url: String,
    pub api_key: String,
    /// Exactly one of project_id or space_id must be set
    pub project_id: Option<String>,
    pub space_id: Option<String>,
    pub token_url: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}
