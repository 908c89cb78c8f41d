use anyhow::Result;
use futures::stream::BoxStream;
use serde_json::Value;

/// A single normalized event from an upstream agent runtime.
///
/// Every backend reduces its native stream to this vocabulary, so the
/// envelope layer can translate without knowing which runtime produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// An incremental fragment of assistant text
    MessageDelta(String),
    /// The model decided to invoke a tool
    ToolCallStart {
        id: String,
        name: String,
        args: Value,
    },
    /// A tool finished and produced output
    ToolResult {
        tool_call_id: String,
        name: String,
        content: String,
    },
    /// The complete assistant answer, emitted once at the end of a run
    FinalMessage(String),
}

/// Events in upstream arrival order. Streams yield one event at a time
/// with no reordering or buffering beyond the current item.
pub type AgentEventStream<'a> = BoxStream<'a, Result<AgentEvent>>;
