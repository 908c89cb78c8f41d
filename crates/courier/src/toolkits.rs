pub mod search;

use async_trait::async_trait;

use crate::errors::AgentResult;
use crate::models::tool::{Tool, ToolCall};

/// Core trait for a set of tools the agent can run on behalf of the model
#[async_trait]
pub trait Toolkit: Send + Sync {
    /// Get the name of the toolkit
    fn name(&self) -> &str;

    /// Get the toolkit description
    fn description(&self) -> &str;

    /// Get toolkit instructions for the system prompt
    fn instructions(&self) -> &str;

    /// Get available tools
    fn tools(&self) -> &[Tool];

    /// Call a tool with the given parameters, returning its text output
    async fn call(&self, tool_call: ToolCall) -> AgentResult<String>;
}
