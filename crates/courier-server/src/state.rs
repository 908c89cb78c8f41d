use courier::backend::BackendConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub backend_config: BackendConfig,
}
