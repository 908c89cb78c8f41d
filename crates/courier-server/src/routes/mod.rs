// Export route modules
pub mod completions;

use crate::state::AppState;
use axum::Router;

// Function to configure all routes
pub fn configure(state: AppState) -> Router {
    Router::new().merge(completions::routes(state))
}
