use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    #[error(transparent)]
    Other(#[from] config::ConfigError),
}

/// Map a settings field to the environment variable that sets it.
/// Bare field names surface from deserializing the backend table.
pub fn to_env_var(field: &str) -> String {
    let path = if field == "backend" {
        // nothing configured at all; the discriminator comes first
        "backend.type".to_string()
    } else if field.contains('.') {
        field.to_string()
    } else {
        format!("backend.{}", field)
    };
    format!("COURIER_{}", path.replace('.', "__").to_uppercase())
}
